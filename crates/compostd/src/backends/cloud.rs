//! Cloud provider gateway: instance inventory and metric statistics.
//!
//! The gateway holds customer credentials; we forward the caller identity and
//! the region/vpc scope taken from the request context.

use async_trait::async_trait;
use compost_shared::{CompostError, Datapoint, Instance, InstanceKind, MetricStatisticsInput, User};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::HttpBackend;

/// Hard stop on provider pagination
const MAX_PAGES: usize = 100;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// All instances of `kind` in the vpc, following provider pagination
    async fn list_instances(
        &self,
        user: &User,
        region: &str,
        vpc: &str,
        kind: InstanceKind,
        instance_id: Option<&str>,
    ) -> Result<Vec<Instance>, CompostError>;

    async fn metric_statistics(
        &self,
        user: &User,
        region: &str,
        input: &MetricStatisticsInput,
    ) -> Result<Vec<Datapoint>, CompostError>;
}

#[derive(Debug, Serialize)]
struct InstancesRequest<'a> {
    region: &'a str,
    vpc: &'a str,
    kind: InstanceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InstancesPage {
    #[serde(default)]
    instances: Vec<Instance>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct MetricsRequest<'a> {
    region: &'a str,
    input: &'a MetricStatisticsInput,
}

#[derive(Debug, Deserialize)]
struct MetricsBody {
    #[serde(default)]
    datapoints: Vec<Datapoint>,
}

pub struct HttpCloudProvider {
    backend: HttpBackend,
}

impl HttpCloudProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        Ok(Self {
            backend: HttpBackend::new("provider", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl CloudProvider for HttpCloudProvider {
    async fn list_instances(
        &self,
        user: &User,
        region: &str,
        vpc: &str,
        kind: InstanceKind,
        instance_id: Option<&str>,
    ) -> Result<Vec<Instance>, CompostError> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let req = InstancesRequest {
                region,
                vpc,
                kind,
                instance_id,
                next_token: next_token.as_deref(),
            };
            let body: InstancesPage = self
                .backend
                .send(Method::POST, user, "/instances", &req)
                .await?;
            debug!(page, count = body.instances.len(), kind = kind.as_str(), "instances page");
            instances.extend(body.instances);

            match body.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => return Ok(instances),
            }
        }

        Err(CompostError::backend(
            "provider",
            format!("instance listing exceeded {} pages", MAX_PAGES),
        ))
    }

    async fn metric_statistics(
        &self,
        user: &User,
        region: &str,
        input: &MetricStatisticsInput,
    ) -> Result<Vec<Datapoint>, CompostError> {
        let body: MetricsBody = self
            .backend
            .send(Method::POST, user, "/metric_statistics", &MetricsRequest { region, input })
            .await?;
        Ok(body.datapoints)
    }
}

// ============================================================================
// Fake (testing)
// ============================================================================

/// What the fake saw on each listing call
#[derive(Debug, Clone, PartialEq)]
pub struct ListingCall {
    pub region: String,
    pub vpc: String,
    pub kind: InstanceKind,
    pub instance_id: Option<String>,
}

#[derive(Default)]
pub struct FakeCloudProvider {
    instances: Vec<Instance>,
    /// metric name -> datapoints
    metrics: HashMap<String, Vec<Datapoint>>,
    calls: Mutex<Vec<ListingCall>>,
}

impl FakeCloudProvider {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances,
            ..Default::default()
        }
    }

    pub fn with_metric(mut self, name: &str, points: Vec<Datapoint>) -> Self {
        self.metrics.insert(name.to_string(), points);
        self
    }

    pub fn listing_calls(&self) -> Vec<ListingCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudProvider for FakeCloudProvider {
    async fn list_instances(
        &self,
        _user: &User,
        region: &str,
        vpc: &str,
        kind: InstanceKind,
        instance_id: Option<&str>,
    ) -> Result<Vec<Instance>, CompostError> {
        self.calls.lock().unwrap().push(ListingCall {
            region: region.to_string(),
            vpc: vpc.to_string(),
            kind,
            instance_id: instance_id.map(str::to_string),
        });
        Ok(self
            .instances
            .iter()
            .filter(|i| i.kind == kind)
            .filter(|i| instance_id.map_or(true, |id| i.id == id))
            .cloned()
            .collect())
    }

    async fn metric_statistics(
        &self,
        _user: &User,
        _region: &str,
        input: &MetricStatisticsInput,
    ) -> Result<Vec<Datapoint>, CompostError> {
        Ok(self.metrics.get(&input.metric_name).cloned().unwrap_or_default())
    }
}
