//! Envelopes exchanged with on-demand check workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::Check;
use crate::result::CheckResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCheckRequest {
    /// Absolute time by which the worker must stop running the check
    pub deadline: DateTime<Utc>,
    pub check: Check,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCheckResponse {
    #[serde(default)]
    pub responses: Vec<CheckResponse>,
}
