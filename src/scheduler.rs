use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info};

use crate::collector::HelmCollector;
use crate::helm::ReleaseLister;

/// Cap on the delay before retrying after an unexpected loop failure.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Drives the scrape loop: one refresh up front, then one per interval,
/// for the life of the process.
pub struct Scheduler {
    interval: Duration,
    retry_delay: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            retry_delay: interval.min(MAX_RETRY_DELAY),
        }
    }

    /// Never returns. `refresh` handles every scrape-level failure itself;
    /// the catch_unwind is the backstop for a panic in the loop body, which
    /// is logged and followed by a bounded retry delay instead of killing
    /// the task.
    pub async fn run(self, collector: Arc<HelmCollector>, lister: Arc<dyn ReleaseLister>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting scrape loop"
        );

        // First scrape runs before the loop so the endpoint has data before
        // the first interval elapses.
        collector.refresh(lister.as_ref()).await;

        loop {
            let cycle = async {
                tokio::time::sleep(self.interval).await;
                collector.refresh(lister.as_ref()).await;
            };

            if let Err(panic) = AssertUnwindSafe(cycle).catch_unwind().await {
                error!(error = %panic_message(&panic), "Scrape loop error");
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
