//! Provider inventory and metric statistics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CompostError;

/// Metric window ending this far in the past; newer points are not published yet
pub const METRIC_LAG_SECS: i64 = 60;
pub const METRIC_WINDOW_SECS: i64 = 3600;
pub const METRIC_PERIOD_SECS: i64 = 60;
pub const METRIC_STATISTIC: &str = "Average";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Ec2,
    Rds,
}

impl InstanceKind {
    pub fn parse(s: &str) -> Result<Self, CompostError> {
        match s {
            "" => Err(CompostError::MissingInstanceType),
            "ec2" => Ok(InstanceKind::Ec2),
            "rds" => Ok(InstanceKind::Rds),
            other => Err(CompostError::UnknownInstanceType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceKind::Ec2 => "ec2",
            InstanceKind::Rds => "rds",
        }
    }

    pub fn metric_namespace(&self) -> &'static str {
        match self {
            InstanceKind::Ec2 => "AWS/EC2",
            InstanceKind::Rds => "AWS/RDS",
        }
    }

    pub fn dimension_name(&self) -> &'static str {
        match self {
            InstanceKind::Ec2 => "InstanceId",
            InstanceKind::Rds => "DBInstanceIdentifier",
        }
    }
}

/// A compute or database instance as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub kind: InstanceKind,
    pub id: String,
    /// Provider attributes passed through untouched
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatisticsInput {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub period: i64,
    pub statistics: Vec<String>,
}

impl MetricStatisticsInput {
    /// Standard one-hour window for an instance metric, anchored at `now`.
    pub fn for_instance(instance: &Instance, metric_name: &str, now: DateTime<Utc>) -> Self {
        let end_time = now - Duration::seconds(METRIC_LAG_SECS);
        Self {
            namespace: instance.kind.metric_namespace().to_string(),
            metric_name: metric_name.to_string(),
            dimensions: vec![Dimension {
                name: instance.kind.dimension_name().to_string(),
                value: instance.id.clone(),
            }],
            start_time: end_time - Duration::seconds(METRIC_WINDOW_SECS),
            end_time,
            period: METRIC_PERIOD_SECS,
            statistics: vec![METRIC_STATISTIC.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

/// Metric names exposed on instances
pub const KNOWN_METRICS: &[&str] = &[
    "ApproximateNumberOfMessagesDelayed",
    "ApproximateNumberOfMessagesNotVisible",
    "ApproximateNumberOfMessagesVisible",
    "BackendConnectionErrors",
    "BinLogDiskUsage",
    "BucketSizeBytes",
    "BytesReadIntoMemcached",
    "BytesUsedForCacheItems",
    "BytesUsedForHash",
    "BytesWrittenOutFromMemcached",
    "CPUCreditBalance",
    "CPUCreditUsage",
    "CPUReservation",
    "CPUUtilization",
    "CasBadval",
    "CasHits",
    "CasMisses",
    "CmdConfigGet",
    "CmdConfigSet",
    "CmdFlush",
    "CmdGet",
    "CmdSet",
    "CmdTouch",
    "CurrConfig",
    "CurrConnections",
    "CurrItems",
    "DatabaseConnections",
    "DecrHits",
    "DecrMisses",
    "DeleteHits",
    "DeleteMisses",
    "DiskQueueDepth",
    "DiskReadBytes",
    "DiskReadOps",
    "DiskWriteBytes",
    "DiskWriteOps",
    "Duration",
    "Errors",
    "EvictedUnfetched",
    "Evictions",
    "ExpiredUnfetched",
    "FreeStorageSpace",
    "FreeableMemory",
    "GetHits",
    "GetMisses",
    "HTTPCode_Backend_2XX",
    "HTTPCode_Backend_3XX",
    "HTTPCode_Backend_4XX",
    "HTTPCode_Backend_5XX",
    "HTTPCode_ELB_5XX",
    "HealthyHostCount",
    "IncomingBytes",
    "IncomingLogEvents",
    "IncrHits",
    "IncrMisses",
    "Invocations",
    "Latency",
    "MatchedEvents",
    "MemoryReservation",
    "MemoryUtilization",
    "NetworkBytesIn",
    "NetworkBytesOut",
    "NetworkIn",
    "NetworkOut",
    "NetworkPacketsIn",
    "NetworkPacketsOut",
    "NetworkReceiveThroughput",
    "NetworkTransmitThroughput",
    "NewConnections",
    "NewItems",
    "NumberOfEmptyReceives",
    "NumberOfMessagesDeleted",
    "NumberOfMessagesPublished",
    "NumberOfMessagesReceived",
    "NumberOfMessagesSent",
    "NumberOfNotificationsDelivered",
    "NumberOfNotificationsFailed",
    "NumberOfObjects",
    "OldestReplicationSlotLag",
    "PublishSize",
    "ReadIOPS",
    "ReadLatency",
    "ReadThroughput",
    "Reclaimed",
    "ReplicaLag",
    "RequestCount",
    "SentMessageSize",
    "StatusCheckFailed",
    "StatusCheckFailed_Instance",
    "StatusCheckFailed_System",
    "SurgeQueueLength",
    "SwapUsage",
    "Throttles",
    "TouchHits",
    "TouchMisses",
    "TransactionLogsDiskUsage",
    "TriggeredRules",
    "UnHealthyHostCount",
    "UnusedMemory",
    "VolumeIdleTime",
    "VolumeQueueLength",
    "VolumeReadBytes",
    "VolumeReadOps",
    "VolumeTotalReadTime",
    "VolumeTotalWriteTime",
    "VolumeWriteBytes",
    "VolumeWriteOps",
    "WriteIOPS",
    "WriteLatency",
    "WriteThroughput",
];

pub fn is_known_metric(name: &str) -> bool {
    KNOWN_METRICS.binary_search(&name).is_ok()
}
