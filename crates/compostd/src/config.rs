//! Configuration management for compostd.
//!
//! Loads settings from `$COMPOST_CONFIG`, then /etc/compost/config.toml, or
//! uses defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/compost/config.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "COMPOST_CONFIG";

/// Inbound HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Upper bound on a whole inbound request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9096".to_string()
}

fn default_request_timeout() -> u64 {
    90
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Base URLs of the independently-owned HTTP backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Check management
    #[serde(default = "default_bartnet_url")]
    pub bartnet_url: String,

    /// Notifications
    #[serde(default = "default_hugs_url")]
    pub hugs_url: String,

    /// State history
    #[serde(default = "default_cats_url")]
    pub cats_url: String,

    /// Cloud provider gateway (holds customer credentials)
    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    /// Per-request timeout for backend calls in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_bartnet_url() -> String {
    "http://bartnet.in.opsee.com".to_string()
}

fn default_hugs_url() -> String {
    "http://hugs.in.opsee.com".to_string()
}

fn default_cats_url() -> String {
    "http://cats.in.opsee.com".to_string()
}

fn default_provider_url() -> String {
    "http://spanx.in.opsee.com".to_string()
}

fn default_backend_timeout() -> u64 {
    15
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            bartnet_url: default_bartnet_url(),
            hugs_url: default_hugs_url(),
            cats_url: default_cats_url(),
            provider_url: default_provider_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

/// Result store tables, indexes and attribute names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_result_table")]
    pub result_table: String,

    #[serde(default = "default_check_id_index")]
    pub check_id_index: String,

    #[serde(default = "default_customer_id_index")]
    pub customer_id_index: String,

    #[serde(default = "default_response_table")]
    pub response_table: String,

    /// Attribute on response items holding the serialized response
    #[serde(default = "default_payload_attribute")]
    pub payload_attribute: String,

    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_store_endpoint() -> String {
    "http://dynamodb.us-west-2.amazonaws.com".to_string()
}

fn default_result_table() -> String {
    "check_results".to_string()
}

fn default_check_id_index() -> String {
    "check_id-index".to_string()
}

fn default_customer_id_index() -> String {
    "customer_id-index".to_string()
}

fn default_response_table() -> String {
    "check_responses".to_string()
}

fn default_payload_attribute() -> String {
    "response_protobuf".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            result_table: default_result_table(),
            check_id_index: default_check_id_index(),
            customer_id_index: default_customer_id_index(),
            response_table: default_response_table(),
            payload_attribute: default_payload_attribute(),
            timeout_secs: default_store_timeout(),
        }
    }
}

/// Worker service directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_etcd_url")]
    pub etcd_url: String,

    /// Namespace under which workers register, one child per routing key
    #[serde(default = "default_routes_path")]
    pub routes_path: String,

    /// Routing key of the shared pool serving external hosts
    #[serde(default = "default_shared_execution_group")]
    pub shared_execution_group: String,

    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

fn default_etcd_url() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_routes_path() -> String {
    "/opsee.co/routes".to_string()
}

fn default_shared_execution_group() -> String {
    "127a7354-290e-11e6-b178-2bc1f6aefc14".to_string()
}

fn default_directory_timeout() -> u64 {
    5
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            etcd_url: default_etcd_url(),
            routes_path: default_routes_path(),
            shared_execution_group: default_shared_execution_group(),
            timeout_secs: default_directory_timeout(),
        }
    }
}

/// On-demand test dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Entry in a worker's address map that serves test checks
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Interval pinned onto ephemeral test checks
    #[serde(default = "default_test_interval")]
    pub test_interval_secs: i32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Horizon of the deadline handed to the worker
    #[serde(default = "default_check_deadline")]
    pub check_deadline_secs: u64,

    /// How long we wait for the worker; kept above `check_deadline_secs`
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_service_name() -> String {
    "checker".to_string()
}

fn default_test_interval() -> i32 {
    30
}

fn default_connect_timeout() -> u64 {
    3_000
}

fn default_check_deadline() -> u64 {
    55
}

fn default_call_timeout() -> u64 {
    60
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            test_interval_secs: default_test_interval(),
            connect_timeout_ms: default_connect_timeout(),
            check_deadline_secs: default_check_deadline(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl DispatcherConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn check_deadline(&self) -> Duration {
        Duration::from_secs(self.check_deadline_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl Config {
    /// Load config from `$COMPOST_CONFIG` or the default path, or return defaults
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_from_path(&path).unwrap_or_else(|e| {
            warn!("Config not loaded from {}, using defaults: {}", path, e);
            Config::default()
        })
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dispatcher.check_deadline_secs >= self.dispatcher.call_timeout_secs {
            anyhow::bail!(
                "dispatcher.check_deadline_secs ({}) must be below dispatcher.call_timeout_secs ({})",
                self.dispatcher.check_deadline_secs,
                self.dispatcher.call_timeout_secs
            );
        }
        if self.server.request_timeout_secs <= self.dispatcher.call_timeout_secs {
            anyhow::bail!(
                "server.request_timeout_secs ({}) must exceed dispatcher.call_timeout_secs ({})",
                self.server.request_timeout_secs,
                self.dispatcher.call_timeout_secs
            );
        }
        Ok(())
    }
}
