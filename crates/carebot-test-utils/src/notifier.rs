use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use carebot_monitoring::{AlertNotifier, SecurityAlert};

/// Keeps every alert it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<SecurityAlert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, alert: SecurityAlert) {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).push(alert);
    }
}
