//! Check aggregation.
//!
//! Composes checks from the check-management backend, notifications from the
//! notification backend and results from the result store into one enriched
//! entity per check.
//!
//! Failure policy:
//! - check listing fails: the call fails
//! - notification listing fails: logged, checks come back without notifications
//! - result fetch fails for any check: the call fails, nothing partial returned

use chrono::{DateTime, Utc};
use compost_shared::{Check, CompostError, Notification, NotificationRequest, StateTransition, User};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backends::{CheckService, NotificationService, StateHistory};
use crate::results::ResultStore;
use crate::task::ScopedTask;

pub struct CheckAggregator {
    checks: Arc<dyn CheckService>,
    notifications: Arc<dyn NotificationService>,
    history: Arc<dyn StateHistory>,
    results: Arc<ResultStore>,
}

impl CheckAggregator {
    pub fn new(
        checks: Arc<dyn CheckService>,
        notifications: Arc<dyn NotificationService>,
        history: Arc<dyn StateHistory>,
        results: Arc<ResultStore>,
    ) -> Self {
        Self {
            checks,
            notifications,
            history,
            results,
        }
    }

    /// All of the customer's checks, or just `check_id`, with results and
    /// notifications attached. Order follows the check-management backend.
    pub async fn list_checks(&self, user: &User, check_id: Option<&str>) -> Result<Vec<Check>, CompostError> {
        let check_id = check_id.filter(|id| !id.is_empty());

        let notifications = Arc::clone(&self.notifications);
        let task_user = user.clone();
        let task_check_id = check_id.map(str::to_string);
        let notif_task = ScopedTask::spawn(async move {
            match task_check_id {
                Some(id) => notifications.list_notifications_for_check(&task_user, &id).await,
                None => notifications.list_notifications(&task_user).await,
            }
        });

        let fetched = match check_id {
            Some(id) => self.checks.get_check(user, id).await.map(|c| vec![c]),
            None => self.checks.list_checks(user).await,
        };
        let mut checks = match fetched {
            Ok(checks) => checks,
            Err(e) => {
                error!(customer_id = %user.customer_id, error = %e, "couldn't list checks from bartnet");
                notif_task.abort();
                return Err(e);
            }
        };

        let mut by_check = match notif_task.await {
            Ok(Ok(list)) => index_notifications(list),
            Ok(Err(e)) => {
                warn!(customer_id = %user.customer_id, error = %e, "error composting notifications, continuing without");
                HashMap::new()
            }
            Err(e) => {
                warn!(customer_id = %user.customer_id, error = %e, "notification task did not complete");
                HashMap::new()
            }
        };

        for check in checks.iter_mut() {
            check.notifications = by_check.remove(&check.id).unwrap_or_default();
            check.results = self.results.get_results(&user.customer_id, Some(check.id.as_str())).await?;
            check.resolve_spec().map_err(|e| {
                error!(check_id = %check.id, error = %e, "couldn't decode check spec");
                e
            })?;
        }

        Ok(checks)
    }

    /// Create checks without an id, update the rest, and register their
    /// notifications. Sequential; the first failure aborts and earlier
    /// items stay committed.
    pub async fn upsert_checks(&self, user: &User, inputs: Vec<serde_json::Value>) -> Result<Vec<Check>, CompostError> {
        let mut upserted = Vec::with_capacity(inputs.len());

        for input in inputs {
            let serde_json::Value::Object(mut fields) = input else {
                return Err(CompostError::InvalidInput("error decoding check input".to_string()));
            };
            let notification_input = fields.remove("notifications");
            let check: Check = serde_json::from_value(serde_json::Value::Object(fields))?;

            let mut saved = if check.id.is_empty() {
                self.checks.create_check(user, &check).await?
            } else {
                self.checks.update_check(user, &check).await?
            };

            if let Some(serde_json::Value::Array(list)) = notification_input {
                let notifications = decode_notifications(&saved.id, &list);
                let request = NotificationRequest {
                    check_id: saved.id.clone(),
                    notifications: notifications.clone(),
                };
                self.notifications
                    .create_notifications_batch(user, std::slice::from_ref(&request))
                    .await?;
                saved.notifications = notifications;
            }

            info!(customer_id = %user.customer_id, check_id = %saved.id, "upserted check");
            upserted.push(saved);
        }

        Ok(upserted)
    }

    /// Delete checks by id, in order, stopping at the first failure.
    pub async fn delete_checks(&self, user: &User, inputs: Vec<serde_json::Value>) -> Result<Vec<String>, CompostError> {
        let mut deleted = Vec::with_capacity(inputs.len());

        for input in inputs {
            let serde_json::Value::String(id) = input else {
                return Err(CompostError::InvalidInput("unable to decode check id".to_string()));
            };
            self.checks.delete_check(user, &id).await.map_err(|e| {
                warn!(customer_id = %user.customer_id, check_id = %id, deleted = deleted.len(), error = %e, "delete batch aborted");
                e
            })?;
            deleted.push(id);
        }

        Ok(deleted)
    }

    pub async fn check_state_transitions(
        &self,
        user: &User,
        check_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StateTransition>, CompostError> {
        if check_id.is_empty() {
            return Err(CompostError::InvalidInput("missing check id".to_string()));
        }
        self.history.get_state_transitions(user, check_id, start, end).await
    }
}

fn index_notifications(list: Vec<Notification>) -> HashMap<String, Vec<Notification>> {
    let mut by_check: HashMap<String, Vec<Notification>> = HashMap::new();
    for notification in list {
        by_check
            .entry(notification.check_id.clone())
            .or_default()
            .push(notification);
    }
    by_check
}

/// Notifications need both a type and a value; anything else is dropped.
fn decode_notifications(check_id: &str, list: &[serde_json::Value]) -> Vec<Notification> {
    list.iter()
        .filter_map(|n| {
            let kind = n.get("type")?.as_str()?;
            let value = n.get("value")?.as_str()?;
            (!kind.is_empty() && !value.is_empty()).then(|| Notification::new(check_id, kind, value))
        })
        .collect()
}
