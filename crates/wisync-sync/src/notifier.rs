//! Log-backed notification adapter
//!
//! Headless sessions have no desktop to notify; [`LogNotifier`] routes
//! notifications into the tracing output instead.

use anyhow::Result;
use tracing::{info, warn};

use wisync_core::ports::{INotificationService, Notification, NotificationPriority};

/// [`INotificationService`] that emits each notification as a log event
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl INotificationService for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        match notification.priority {
            NotificationPriority::High => warn!(
                title = %notification.title,
                category = %notification.category,
                "{}",
                notification.body
            ),
            NotificationPriority::Normal | NotificationPriority::Low => info!(
                title = %notification.title,
                category = %notification.category,
                "{}",
                notification.body
            ),
        }
        Ok(())
    }
}
