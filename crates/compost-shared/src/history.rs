//! State transitions recorded by the state-history backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub check_id: String,
    #[serde(default)]
    pub customer_id: String,
    pub from: String,
    pub to: String,
    pub occurred_at: DateTime<Utc>,
}
