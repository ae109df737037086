//! Check results and the responses captured from their targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::check::Target;
use crate::codec::TypedPayload;
use crate::error::CompostError;

pub const HTTP_RESPONSE_TYPE: &str = "HttpResponse";
pub const CLOUDWATCH_RESPONSE_TYPE: &str = "CloudWatchResponse";

/// One execution outcome of a check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    #[serde(default)]
    pub customer_id: String,
    pub result_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passing: bool,
    #[serde(default)]
    pub bastion_id: String,
    #[serde(default)]
    pub version: i32,
    /// Same length and order as the stored response id list
    #[serde(default)]
    pub responses: Vec<CheckResponse>,
}

/// The raw reply captured from a single target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub response_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TypedPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<CheckReply>,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub passing: bool,
}

impl CheckResponse {
    /// Fill `reply` from the tagged `response` payload. Unknown tags are a no-op.
    pub fn resolve_reply(&mut self) -> Result<(), CompostError> {
        if self.reply.is_some() {
            return Ok(());
        }
        let Some(payload) = &self.response else {
            return Ok(());
        };
        self.reply = match payload.type_name() {
            HTTP_RESPONSE_TYPE => Some(CheckReply::Http(payload.decode()?)),
            CLOUDWATCH_RESPONSE_TYPE => Some(CheckReply::CloudWatch(payload.decode()?)),
            _ => None,
        };
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckReply {
    #[serde(rename = "http_response")]
    Http(HttpResponse),
    #[serde(rename = "cloudwatch_response")]
    CloudWatch(CloudWatchResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: Vec<crate::check::Header>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudWatchResponse {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub statistic: String,
    #[serde(default)]
    pub unit: String,
}
