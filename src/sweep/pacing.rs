use async_trait::async_trait;
use rand::{thread_rng, Rng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::cli::config::PacingSettings;

/// Courtesy delay taken before each upstream request
#[async_trait]
pub trait RequestPacer: Send + Sync {
    async fn wait(&self);
}

/// No delay at all
pub struct NoPacing;

#[async_trait]
impl RequestPacer for NoPacing {
    async fn wait(&self) {}
}

/// Sleeps a random duration in `[min_ms, max_ms]` before each request
pub struct JitteredDelay {
    min_ms: u64,
    max_ms: u64,
}

impl JitteredDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    fn next_delay(&self) -> Duration {
        let mut rng = thread_rng();
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

#[async_trait]
impl RequestPacer for JitteredDelay {
    async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!("Pacing request by {} ms", delay.as_millis());
            sleep(delay).await;
        }
    }
}

/// Build the pacer described by the settings
pub fn from_settings(settings: &PacingSettings) -> Arc<dyn RequestPacer> {
    if settings.max_delay_ms == 0 {
        Arc::new(NoPacing)
    } else {
        Arc::new(JitteredDelay::new(settings.min_delay_ms, settings.max_delay_ms))
    }
}
