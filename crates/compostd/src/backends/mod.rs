//! Clients for the independently-owned backends.
//!
//! Each backend is an async trait with a production HTTP client and an
//! in-memory fake for deterministic tests. Clients are built once at startup
//! and shared read-only across requests.

pub mod checks;
pub mod cloud;
pub mod history;
pub mod notifications;

pub use checks::{CheckService, FakeCheckService, HttpCheckService};
pub use cloud::{CloudProvider, FakeCloudProvider, HttpCloudProvider};
pub use history::{FakeStateHistory, HttpStateHistory, StateHistory};
pub use notifications::{FakeNotificationService, HttpNotificationService, NotificationService};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use compost_shared::{CompostError, User};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTP plumbing shared by the backend clients
#[derive(Debug, Clone)]
pub struct HttpBackend {
    service: &'static str,
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("compostd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CompostError::backend(service, format!("client build failed: {}", e)))?;

        Ok(Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Backends trust the caller identity forwarded as basic auth
    fn authorization(user: &User) -> Result<String, CompostError> {
        let json = serde_json::to_vec(user)?;
        Ok(format!("Basic {}", STANDARD.encode(json)))
    }

    fn request(&self, method: Method, user: &User, path: &str) -> Result<reqwest::RequestBuilder, CompostError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(service = self.service, %method, %url, "backend request");
        Ok(self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, Self::authorization(user)?))
    }

    async fn execute(&self, req: reqwest::RequestBuilder, path: &str) -> Result<reqwest::Response, CompostError> {
        let response = req
            .send()
            .await
            .map_err(|e| CompostError::backend(self.service, e.to_string()))?;

        if !response.status().is_success() {
            return Err(CompostError::backend(
                self.service,
                format!("HTTP {} from {}", response.status(), path),
            ));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, CompostError> {
        response
            .json()
            .await
            .map_err(|e| CompostError::backend(self.service, format!("bad response body: {}", e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, user: &User, path: &str) -> Result<T, CompostError> {
        let req = self.request(Method::GET, user, path)?;
        let response = self.execute(req, path).await?;
        self.decode(response).await
    }

    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        user: &User,
        path: &str,
        query: &Q,
    ) -> Result<T, CompostError> {
        let req = self.request(Method::GET, user, path)?.query(query);
        let response = self.execute(req, path).await?;
        self.decode(response).await
    }

    pub async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        user: &User,
        path: &str,
        body: &B,
    ) -> Result<T, CompostError> {
        let req = self.request(method, user, path)?.json(body);
        let response = self.execute(req, path).await?;
        self.decode(response).await
    }

    /// Send a body and ignore whatever comes back
    pub async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        user: &User,
        path: &str,
        body: &B,
    ) -> Result<(), CompostError> {
        let req = self.request(method, user, path)?.json(body);
        self.execute(req, path).await?;
        Ok(())
    }

    pub async fn delete(&self, user: &User, path: &str) -> Result<(), CompostError> {
        let req = self.request(Method::DELETE, user, path)?;
        self.execute(req, path).await?;
        Ok(())
    }
}
