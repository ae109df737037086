//! Notifications joined to checks by check id.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub check_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Notification {
    pub fn new(check_id: &str, kind: &str, value: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }
}

/// Bulk create request for one check's notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub check_id: String,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}
