//! Check model as owned by the check-management backend.

use serde::{Deserialize, Serialize};

use crate::codec::TypedPayload;
use crate::error::CompostError;
use crate::notification::Notification;
use crate::result::CheckResult;

/// Type tags for the serialized spec form
pub const HTTP_CHECK_TYPE: &str = "HttpCheck";
pub const CLOUDWATCH_CHECK_TYPE: &str = "CloudWatchCheck";

/// Target kind that routes to the shared worker pool
pub const EXTERNAL_HOST_TARGET: &str = "external_host";

/// A user-defined monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Check {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default)]
    pub interval: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<CheckSpec>,
    /// Serialized spec for producers that predate `spec`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_spec: Option<TypedPayload>,
    #[serde(default)]
    pub results: Vec<CheckResult>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Check {
    /// Fill `spec` from `check_spec` when only the serialized form is present.
    ///
    /// Unknown tags leave `spec` unset. A known tag with a body that does not
    /// decode is an error.
    pub fn resolve_spec(&mut self) -> Result<(), CompostError> {
        if self.spec.is_some() {
            return Ok(());
        }
        if let Some(payload) = &self.check_spec {
            self.spec = CheckSpec::from_payload(payload)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Closed set of check variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckSpec {
    #[serde(rename = "http_check")]
    Http(HttpCheck),
    #[serde(rename = "cloudwatch_check")]
    CloudWatch(CloudWatchCheck),
}

impl CheckSpec {
    pub fn from_payload(payload: &TypedPayload) -> Result<Option<Self>, CompostError> {
        match payload.type_name() {
            HTTP_CHECK_TYPE => Ok(Some(CheckSpec::Http(payload.decode()?))),
            CLOUDWATCH_CHECK_TYPE => Ok(Some(CheckSpec::CloudWatch(payload.decode()?))),
            _ => Ok(None),
        }
    }

    pub fn to_payload(&self) -> Result<TypedPayload, CompostError> {
        match self {
            CheckSpec::Http(spec) => TypedPayload::encode(HTTP_CHECK_TYPE, spec),
            CheckSpec::CloudWatch(spec) => TypedPayload::encode(CLOUDWATCH_CHECK_TYPE, spec),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpCheck {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub verb: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudWatchCheck {
    #[serde(default)]
    pub metrics: Vec<CloudWatchMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudWatchMetric {
    pub namespace: String,
    pub name: String,
}
