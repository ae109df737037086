//! Notification backend (hugs).

use async_trait::async_trait;
use compost_shared::{CompostError, Notification, NotificationRequest, User};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::HttpBackend;

#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn list_notifications(&self, user: &User) -> Result<Vec<Notification>, CompostError>;

    async fn list_notifications_for_check(
        &self,
        user: &User,
        check_id: &str,
    ) -> Result<Vec<Notification>, CompostError>;

    async fn create_notifications_batch(
        &self,
        user: &User,
        requests: &[NotificationRequest],
    ) -> Result<(), CompostError>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Deserialize)]
struct NotificationList {
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
struct BatchBody<'a> {
    items: &'a [NotificationRequest],
}

pub struct HttpNotificationService {
    backend: HttpBackend,
}

impl HttpNotificationService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CompostError> {
        Ok(Self {
            backend: HttpBackend::new("hugs", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn list_notifications(&self, user: &User) -> Result<Vec<Notification>, CompostError> {
        let list: NotificationList = self.backend.get(user, "/notifications").await?;
        Ok(list.notifications)
    }

    async fn list_notifications_for_check(
        &self,
        user: &User,
        check_id: &str,
    ) -> Result<Vec<Notification>, CompostError> {
        let list: NotificationList = self
            .backend
            .get(user, &format!("/notifications/{}", check_id))
            .await?;
        Ok(list.notifications)
    }

    async fn create_notifications_batch(
        &self,
        user: &User,
        requests: &[NotificationRequest],
    ) -> Result<(), CompostError> {
        self.backend
            .send_unit(
                Method::POST,
                user,
                "/notifications-multicheck",
                &BatchBody { items: requests },
            )
            .await
    }
}

// ============================================================================
// Fake (testing)
// ============================================================================

#[derive(Default)]
pub struct FakeNotificationService {
    notifications: Mutex<Vec<Notification>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
}

impl FakeNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        Self {
            notifications: Mutex::new(notifications),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every list call, to exercise the join
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn enter_list(&self) -> Result<(), CompostError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CompostError::backend("hugs", "HTTP 502 from /notifications"));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationService for FakeNotificationService {
    async fn list_notifications(&self, _user: &User) -> Result<Vec<Notification>, CompostError> {
        self.enter_list().await?;
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn list_notifications_for_check(
        &self,
        _user: &User,
        check_id: &str,
    ) -> Result<Vec<Notification>, CompostError> {
        self.enter_list().await?;
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.check_id == check_id)
            .cloned()
            .collect())
    }

    async fn create_notifications_batch(
        &self,
        _user: &User,
        requests: &[NotificationRequest],
    ) -> Result<(), CompostError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CompostError::backend("hugs", "HTTP 502 from /notifications-multicheck"));
        }
        let mut stored = self.notifications.lock().unwrap();
        for req in requests {
            stored.retain(|n| n.check_id != req.check_id);
            stored.extend(req.notifications.iter().map(|n| Notification {
                check_id: req.check_id.clone(),
                ..n.clone()
            }));
        }
        Ok(())
    }
}
