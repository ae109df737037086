//! Check-management backend (bartnet).

use async_trait::async_trait;
use compost_shared::{Check, CompostError, User};
use reqwest::Method;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::HttpBackend;

#[async_trait]
pub trait CheckService: Send + Sync {
    async fn list_checks(&self, user: &User) -> Result<Vec<Check>, CompostError>;

    async fn get_check(&self, user: &User, id: &str) -> Result<Check, CompostError>;

    async fn create_check(&self, user: &User, check: &Check) -> Result<Check, CompostError>;

    async fn update_check(&self, user: &User, check: &Check) -> Result<Check, CompostError>;

    async fn delete_check(&self, user: &User, id: &str) -> Result<(), CompostError>;
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct HttpCheckService {
    backend: HttpBackend,
}

impl HttpCheckService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        Ok(Self {
            backend: HttpBackend::new("bartnet", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl CheckService for HttpCheckService {
    async fn list_checks(&self, user: &User) -> Result<Vec<Check>, CompostError> {
        self.backend.get(user, "/checks").await
    }

    async fn get_check(&self, user: &User, id: &str) -> Result<Check, CompostError> {
        self.backend.get(user, &format!("/checks/{}", id)).await
    }

    async fn create_check(&self, user: &User, check: &Check) -> Result<Check, CompostError> {
        self.backend.send(Method::POST, user, "/checks", check).await
    }

    async fn update_check(&self, user: &User, check: &Check) -> Result<Check, CompostError> {
        self.backend
            .send(Method::PUT, user, &format!("/checks/{}", check.id), check)
            .await
    }

    async fn delete_check(&self, user: &User, id: &str) -> Result<(), CompostError> {
        self.backend.delete(user, &format!("/checks/{}", id)).await
    }
}

// ============================================================================
// Fake (testing)
// ============================================================================

/// In-memory check backend. Checks keep insertion order.
#[derive(Default)]
pub struct FakeCheckService {
    checks: Mutex<Vec<Check>>,
    failing: AtomicBool,
    /// Writes succeed this many times, then fail
    writes_before_failure: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl FakeCheckService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checks(checks: Vec<Check>) -> Self {
        Self {
            checks: Mutex::new(checks),
            ..Default::default()
        }
    }

    /// Every call fails
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Allow `n` more writes, then fail every write after
    pub fn fail_writes_after(&self, n: usize) {
        *self.writes_before_failure.lock().unwrap() = Some(n);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<Check> {
        self.checks.lock().unwrap().clone()
    }

    fn enter(&self) -> Result<(), CompostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CompostError::backend("bartnet", "HTTP 503 from /checks"));
        }
        Ok(())
    }

    fn enter_write(&self) -> Result<(), CompostError> {
        self.enter()?;
        let mut budget = self.writes_before_failure.lock().unwrap();
        match budget.as_mut() {
            Some(0) => Err(CompostError::backend("bartnet", "HTTP 500 from /checks")),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CheckService for FakeCheckService {
    async fn list_checks(&self, user: &User) -> Result<Vec<Check>, CompostError> {
        self.enter()?;
        Ok(self
            .checks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.customer_id == user.customer_id)
            .cloned()
            .collect())
    }

    async fn get_check(&self, user: &User, id: &str) -> Result<Check, CompostError> {
        self.enter()?;
        self.checks
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id && c.customer_id == user.customer_id)
            .cloned()
            .ok_or_else(|| CompostError::backend("bartnet", format!("HTTP 404 from /checks/{}", id)))
    }

    async fn create_check(&self, user: &User, check: &Check) -> Result<Check, CompostError> {
        self.enter_write()?;
        let mut created = check.clone();
        created.id = uuid::Uuid::new_v4().to_string();
        created.customer_id = user.customer_id.clone();
        created.notifications.clear();
        self.checks.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_check(&self, user: &User, check: &Check) -> Result<Check, CompostError> {
        self.enter_write()?;
        let mut checks = self.checks.lock().unwrap();
        let slot = checks
            .iter_mut()
            .find(|c| c.id == check.id && c.customer_id == user.customer_id)
            .ok_or_else(|| CompostError::backend("bartnet", format!("HTTP 404 from /checks/{}", check.id)))?;
        *slot = Check {
            customer_id: user.customer_id.clone(),
            notifications: Vec::new(),
            ..check.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_check(&self, user: &User, id: &str) -> Result<(), CompostError> {
        self.enter_write()?;
        let mut checks = self.checks.lock().unwrap();
        let before = checks.len();
        checks.retain(|c| !(c.id == id && c.customer_id == user.customer_id));
        if checks.len() == before {
            return Err(CompostError::backend("bartnet", format!("HTTP 404 from /checks/{}", id)));
        }
        Ok(())
    }
}
