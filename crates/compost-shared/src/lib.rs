//! Shared types for compost components.
//!
//! Everything that crosses a process boundary lives here: the check model
//! owned by the check-management backend, results read back from the result
//! store, notifications, worker test-check envelopes and provider inventory.

pub mod check;
pub mod cloud;
pub mod codec;
pub mod error;
pub mod history;
pub mod notification;
pub mod result;
pub mod user;
pub mod worker;

pub use check::{
    CheckSpec, CloudWatchCheck, CloudWatchMetric, Check, Header, HttpCheck, Target, EXTERNAL_HOST_TARGET,
};
pub use cloud::{Datapoint, Dimension, Instance, InstanceKind, MetricStatisticsInput};
pub use codec::TypedPayload;
pub use error::{CompostError, ErrorKind};
pub use history::StateTransition;
pub use notification::{Notification, NotificationRequest};
pub use result::{CheckReply, CheckResponse, CheckResult, CloudWatchResponse, HttpResponse, Metric};
pub use user::User;
pub use worker::{TestCheckRequest, TestCheckResponse};

/// Version of the compost crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
