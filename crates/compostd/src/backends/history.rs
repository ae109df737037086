//! State-history backend (cats).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compost_shared::{CompostError, StateTransition, User};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use super::HttpBackend;

#[async_trait]
pub trait StateHistory: Send + Sync {
    async fn get_state_transitions(
        &self,
        user: &User,
        check_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateTransition>, CompostError>;
}

#[derive(Debug, Serialize)]
struct TransitionsQuery<'a> {
    customer_id: &'a str,
    absolute_start_time: String,
    absolute_end_time: String,
}

#[derive(Debug, Deserialize)]
struct TransitionsBody {
    #[serde(default)]
    transitions: Vec<StateTransition>,
}

pub struct HttpStateHistory {
    backend: HttpBackend,
}

impl HttpStateHistory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        Ok(Self {
            backend: HttpBackend::new("cats", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl StateHistory for HttpStateHistory {
    async fn get_state_transitions(
        &self,
        user: &User,
        check_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateTransition>, CompostError> {
        let query = TransitionsQuery {
            customer_id: &user.customer_id,
            absolute_start_time: start.to_rfc3339(),
            absolute_end_time: end.to_rfc3339(),
        };
        let body: TransitionsBody = self
            .backend
            .get_with_query(user, &format!("/checks/{}/state_transitions", check_id), &query)
            .await?;
        Ok(body.transitions)
    }
}

/// Returns stored transitions inside the requested window
#[derive(Default)]
pub struct FakeStateHistory {
    transitions: Mutex<Vec<StateTransition>>,
}

impl FakeStateHistory {
    pub fn with_transitions(transitions: Vec<StateTransition>) -> Self {
        Self {
            transitions: Mutex::new(transitions),
        }
    }
}

#[async_trait]
impl StateHistory for FakeStateHistory {
    async fn get_state_transitions(
        &self,
        user: &User,
        check_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateTransition>, CompostError> {
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.check_id == check_id
                    && t.customer_id == user.customer_id
                    && t.occurred_at >= start
                    && t.occurred_at <= end
            })
            .cloned()
            .collect())
    }
}
