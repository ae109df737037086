//! Query and mutation execution.
//!
//! Each top-level field resolves on its own; a failing field is left null and
//! reported as a `FieldError` while its siblings still resolve. Nested fields
//! under `region` share a fresh `RequestContext` per query.

use chrono::{DateTime, Utc};
use compost_shared::cloud::is_known_metric;
use compost_shared::{
    Check, CompostError, Datapoint, Instance, InstanceKind, MetricStatisticsInput, StateTransition,
    TestCheckResponse, User,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregator::CheckAggregator;
use crate::backends::CloudProvider;
use crate::context::RequestContext;
use crate::dispatcher::TestDispatcher;

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub checks: Option<ChecksArgs>,
    #[serde(default)]
    pub region: Option<RegionArgs>,
    #[serde(default)]
    pub test_check: Option<serde_json::Value>,
    #[serde(default)]
    pub check_state_transitions: Option<TransitionsArgs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChecksArgs {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionArgs {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub vpc: Option<VpcArgs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VpcArgs {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub instances: Option<InstancesArgs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InstancesArgs {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionsArgs {
    pub check_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MutationRequest {
    #[serde(default)]
    pub upsert_checks: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub delete_checks: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<Check>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_check: Option<TestCheckResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_state_transitions: Option<Vec<StateTransition>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Default, Serialize)]
pub struct MutationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert_checks: Option<Vec<Check>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_checks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
pub struct RegionData {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc: Option<VpcData>,
}

#[derive(Debug, Serialize)]
pub struct VpcData {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<InstanceData>>,
}

#[derive(Debug, Serialize)]
pub struct InstanceData {
    #[serde(flatten)]
    pub instance: Instance,
    /// metric name -> datapoints, oldest first
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Vec<Datapoint>>,
}

pub struct QueryExecutor {
    aggregator: Arc<CheckAggregator>,
    dispatcher: Arc<TestDispatcher>,
    cloud: Arc<dyn CloudProvider>,
}

impl QueryExecutor {
    pub fn new(aggregator: Arc<CheckAggregator>, dispatcher: Arc<TestDispatcher>, cloud: Arc<dyn CloudProvider>) -> Self {
        Self {
            aggregator,
            dispatcher,
            cloud,
        }
    }

    pub async fn query(&self, user: &User, request: QueryRequest) -> QueryResponse {
        let mut response = QueryResponse::default();
        let mut ctx = RequestContext::new();

        if let Some(args) = request.checks {
            response.checks = record(
                &mut response.errors,
                "checks",
                self.aggregator.list_checks(user, args.id.as_deref()).await,
            );
        }

        if let Some(args) = request.region {
            response.region = self.resolve_region(user, &mut ctx, args, &mut response.errors).await;
        }

        if let Some(input) = request.test_check {
            response.test_check = record(
                &mut response.errors,
                "test_check",
                self.dispatcher.test_check(user, input).await,
            );
        }

        if let Some(args) = request.check_state_transitions {
            let result = if args.start > args.end {
                Err(CompostError::InvalidInput("start is after end".to_string()))
            } else {
                self.aggregator
                    .check_state_transitions(user, &args.check_id, args.start, args.end)
                    .await
            };
            response.check_state_transitions = record(&mut response.errors, "check_state_transitions", result);
        }

        response
    }

    pub async fn mutate(&self, user: &User, request: MutationRequest) -> MutationResponse {
        let mut response = MutationResponse::default();

        if let Some(inputs) = request.upsert_checks {
            response.upsert_checks = record(
                &mut response.errors,
                "upsert_checks",
                self.aggregator.upsert_checks(user, inputs).await,
            );
        }

        if let Some(inputs) = request.delete_checks {
            response.delete_checks = record(
                &mut response.errors,
                "delete_checks",
                self.aggregator.delete_checks(user, inputs).await,
            );
        }

        response
    }

    async fn resolve_region(
        &self,
        user: &User,
        ctx: &mut RequestContext,
        args: RegionArgs,
        errors: &mut Vec<FieldError>,
    ) -> Option<RegionData> {
        record(errors, "region", ctx.set_region(&args.id))?;
        let mut region = RegionData { id: args.id, vpc: None };

        if let Some(vpc_args) = args.vpc {
            if record(errors, "region.vpc", ctx.set_vpc(&vpc_args.id)).is_some() {
                let mut vpc = VpcData {
                    id: vpc_args.id,
                    instances: None,
                };
                if let Some(instance_args) = vpc_args.instances {
                    vpc.instances = record(
                        errors,
                        "region.vpc.instances",
                        self.resolve_instances(user, ctx, instance_args).await,
                    );
                }
                region.vpc = Some(vpc);
            }
        }

        Some(region)
    }

    async fn resolve_instances(
        &self,
        user: &User,
        ctx: &RequestContext,
        args: InstancesArgs,
    ) -> Result<Vec<InstanceData>, CompostError> {
        let region = ctx.region()?;
        let vpc = ctx.vpc()?;
        let kind = InstanceKind::parse(&args.kind)?;
        if let Some(unknown) = args.metrics.iter().find(|m| !is_known_metric(m)) {
            return Err(CompostError::UnknownMetric(unknown.clone()));
        }

        let instance_id = args.id.as_deref().filter(|id| !id.is_empty());
        let instances = self
            .cloud
            .list_instances(user, region, vpc, kind, instance_id)
            .await?;
        debug!(customer_id = %user.customer_id, region, vpc, kind = kind.as_str(), count = instances.len(), "listed instances");

        let now = Utc::now();
        let mut resolved = Vec::with_capacity(instances.len());
        for instance in instances {
            let mut metrics = BTreeMap::new();
            for name in &args.metrics {
                let input = MetricStatisticsInput::for_instance(&instance, name, now);
                let points = self.cloud.metric_statistics(user, region, &input).await?;
                metrics.insert(name.clone(), points);
            }
            resolved.push(InstanceData { instance, metrics });
        }

        Ok(resolved)
    }
}

fn record<T>(errors: &mut Vec<FieldError>, path: &str, result: Result<T, CompostError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path, kind = ?e.kind(), error = %e, "field failed");
            errors.push(FieldError {
                path: path.to_string(),
                message: e.to_string(),
            });
            None
        }
    }
}
