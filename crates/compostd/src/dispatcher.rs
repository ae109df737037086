//! On-demand test dispatch to a check worker.
//!
//! The worker is found through the service directory, dialled over a single
//! unpooled HTTP/1 connection and given one test request. The call races the
//! caller deadline; a worker that fails or runs out of time yields an empty
//! response rather than an error.

use async_trait::async_trait;
use chrono::Utc;
use compost_shared::{Check, CompostError, TestCheckRequest, TestCheckResponse, User, EXTERNAL_HOST_TARGET};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DirectoryConfig, DispatcherConfig};
use crate::directory::ServiceDirectory;
use crate::task::ScopedTask;

const TEST_CHECK_PATH: &str = "/test_check";

/// One test request against one worker address
#[async_trait]
pub trait WorkerConnector: Send + Sync {
    async fn test_check(&self, addr: &str, request: &TestCheckRequest) -> Result<TestCheckResponse, CompostError>;
}

/// Dials a fresh connection per call; the connection lives exactly as long
/// as the call.
pub struct HttpWorkerConnector {
    connect_timeout: Duration,
}

impl HttpWorkerConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(&self, addr: &str) -> Result<WorkerConnection, CompostError> {
        let dial = async {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| CompostError::Worker(format!("connect to {}: {}", addr, e)))?;
            http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| CompostError::Worker(format!("handshake with {}: {}", addr, e)))
        };

        let (sender, conn) = tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| CompostError::Worker(format!("connect to {} timed out", addr)))??;

        let conn_addr = addr.to_string();
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(addr = %conn_addr, error = %e, "worker connection closed");
            }
        });

        Ok(WorkerConnection {
            addr: addr.to_string(),
            sender,
            driver,
        })
    }
}

struct WorkerConnection {
    addr: String,
    sender: http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl WorkerConnection {
    async fn post(&mut self, request: &TestCheckRequest) -> Result<TestCheckResponse, CompostError> {
        let body = serde_json::to_vec(request)?;
        let req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(TEST_CHECK_PATH)
            .header(hyper::header::HOST, self.addr.as_str())
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| CompostError::Worker(format!("request build failed: {}", e)))?;

        let res = self
            .sender
            .send_request(req)
            .await
            .map_err(|e| CompostError::Worker(format!("{}: {}", self.addr, e)))?;
        let status = res.status();
        let bytes = res
            .into_body()
            .collect()
            .await
            .map_err(|e| CompostError::Worker(format!("{}: {}", self.addr, e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(CompostError::Worker(format!(
                "HTTP {} from {}: {}",
                status,
                self.addr,
                String::from_utf8_lossy(&bytes).trim()
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| CompostError::Worker(format!("{}: undecodable reply: {}", self.addr, e)))
    }
}

impl Drop for WorkerConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl WorkerConnector for HttpWorkerConnector {
    async fn test_check(&self, addr: &str, request: &TestCheckRequest) -> Result<TestCheckResponse, CompostError> {
        let mut conn = self.connect(addr).await?;
        info!(addr, "established connection to worker");
        conn.post(request).await
    }
}

#[derive(Debug, Deserialize)]
struct ServiceAddress {
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    port: u16,
}

pub struct TestDispatcher {
    directory: Arc<dyn ServiceDirectory>,
    connector: Arc<dyn WorkerConnector>,
    routes: DirectoryConfig,
    config: DispatcherConfig,
}

impl TestDispatcher {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        connector: Arc<dyn WorkerConnector>,
        routes: DirectoryConfig,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            directory,
            connector,
            routes,
            config,
        }
    }

    /// Run a check once on a worker serving the caller's execution group.
    ///
    /// Input and directory problems are errors. Anything that goes wrong
    /// once a worker entry is chosen comes back as an empty response.
    pub async fn test_check(&self, user: &User, input: serde_json::Value) -> Result<TestCheckResponse, CompostError> {
        let check = self.prepare_check(input)?;

        let group = self.routing_key(user, &check).to_string();
        let path = format!("{}/{}", self.routes.routes_path.trim_end_matches('/'), group);
        let request = TestCheckRequest {
            deadline: Utc::now() + chrono::Duration::seconds(self.config.check_deadline_secs as i64),
            check,
        };

        let directory = Arc::clone(&self.directory);
        let connector = Arc::clone(&self.connector);
        let service_name = self.config.service_name.clone();
        let customer_id = user.customer_id.clone();
        let call_timeout = self.config.call_timeout();

        // Lookup, dial and call all run here; dropping the handle cancels them.
        let mut call = ScopedTask::spawn(async move {
            let entries = directory.get(&path, true, true).await?;
            let Some(entry) = entries.into_iter().next() else {
                warn!(%customer_id, %path, "no workers registered");
                return Err(CompostError::NoWorkersFound(group));
            };

            let addr = match worker_address(&entry.value, &service_name) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(%customer_id, key = %entry.key, error = %e, "unusable worker entry, ignoring");
                    return Ok(TestCheckResponse::default());
                }
            };

            let outcome = match tokio::time::timeout(call_timeout, connector.test_check(&addr, &request)).await {
                Ok(result) => result,
                Err(_) => Err(CompostError::Worker(format!("no reply within {}s", call_timeout.as_secs()))),
            };
            match outcome {
                Ok(response) => {
                    info!(%customer_id, %addr, responses = response.responses.len(), "test check complete");
                    Ok(response)
                }
                Err(e) => {
                    warn!(%customer_id, %addr, error = %e, "test check failed, ignoring");
                    Ok(TestCheckResponse::default())
                }
            }
        });

        tokio::select! {
            joined = &mut call => match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(customer_id = %user.customer_id, error = %e, "worker call task failed, ignoring");
                    Ok(TestCheckResponse::default())
                }
            },
            _ = tokio::time::sleep(call_timeout) => {
                call.abort();
                warn!(customer_id = %user.customer_id, timeout_secs = call_timeout.as_secs(), "test check timed out, ignoring");
                Ok(TestCheckResponse::default())
            }
        }
    }

    fn prepare_check(&self, input: serde_json::Value) -> Result<Check, CompostError> {
        let mut check: Check = serde_json::from_value(input)
            .map_err(|e| CompostError::InvalidInput(format!("error decoding check: {}", e)))?;
        check.interval = self.config.test_interval_secs;

        // Older workers read only the serialized form
        check.resolve_spec()?;
        if let Some(spec) = &check.spec {
            check.check_spec = Some(spec.to_payload()?);
        }

        if check.target.is_none() {
            return Err(CompostError::InvalidInput("test check is missing target".to_string()));
        }
        Ok(check)
    }

    fn routing_key<'a>(&'a self, user: &'a User, check: &Check) -> &'a str {
        match &check.target {
            Some(target) if target.kind == EXTERNAL_HOST_TARGET => self.routes.shared_execution_group.as_str(),
            _ => user.customer_id.as_str(),
        }
    }
}

/// `host:port` of `service_name` in a worker's JSON address map
fn worker_address(value: &str, service_name: &str) -> Result<String, CompostError> {
    let mut services: HashMap<String, serde_json::Value> = serde_json::from_str(value)?;
    let service = services
        .remove(service_name)
        .ok_or_else(|| CompostError::Worker(format!("no {} service in address map", service_name)))?;
    let address: ServiceAddress = serde_json::from_value(service)?;
    if address.hostname.is_empty() {
        return Err(CompostError::Worker(format!("{} service has no hostname", service_name)));
    }
    Ok(format!("{}:{}", address.hostname, address.port))
}

/// Connector that answers from memory
#[derive(Default)]
pub struct FakeWorkerConnector {
    response: Mutex<Option<TestCheckResponse>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(String, TestCheckRequest)>>,
}

impl FakeWorkerConnector {
    /// Every call fails until a response is set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(response: TestCheckResponse) -> Self {
        Self {
            response: Mutex::new(Some(response)),
            ..Default::default()
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<(String, TestCheckRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerConnector for FakeWorkerConnector {
    async fn test_check(&self, addr: &str, request: &TestCheckRequest) -> Result<TestCheckResponse, CompostError> {
        self.requests
            .lock()
            .unwrap()
            .push((addr.to_string(), request.clone()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CompostError::Worker(format!("connect to {}: connection refused", addr)))
    }
}
