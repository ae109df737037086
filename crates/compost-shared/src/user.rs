//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i32,
    pub customer_id: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            ..Default::default()
        }
    }
}
