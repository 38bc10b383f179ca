//! Background review maintenance.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::Repositories;

/// What one maintenance pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Reviews newly marked `STALE`.
    pub stale: usize,
    /// Reviews removed after their retention window.
    pub swept: usize,
}

impl AddAssign for MaintenanceReport {
    fn add_assign(&mut self, other: Self) {
        self.stale += other.stale;
        self.swept += other.swept;
    }
}

/// Handle to the maintenance task. The task stops when this is dropped.
pub struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run staleness and retention sweeps over every repository each
/// `interval`, starting immediately. Must be called inside a tokio runtime.
pub fn spawn_maintenance(repos: Arc<Repositories>, interval: Duration) -> MaintenanceHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "review maintenance started");
        loop {
            ticker.tick().await;
            match repos.maintain(Utc::now()) {
                Ok(report) if report != MaintenanceReport::default() => {
                    info!(stale = report.stale, swept = report.swept, "review maintenance pass");
                }
                Ok(_) => debug!("review maintenance pass: nothing to do"),
                Err(e) => warn!(error = %e, "review maintenance pass failed"),
            }
        }
    });
    MaintenanceHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_review::ReviewConfig;
    use arbor_types::BranchPath;

    use crate::config::CoreConfig;

    #[test]
    fn reports_add_up() {
        let mut total = MaintenanceReport::default();
        total += MaintenanceReport { stale: 1, swept: 2 };
        total += MaintenanceReport { stale: 3, swept: 0 };
        assert_eq!(total, MaintenanceReport { stale: 4, swept: 2 });
    }

    #[tokio::test]
    async fn sweeps_expired_reviews_in_the_background() {
        let repos = Arc::new(
            Repositories::new(CoreConfig {
                repositories: vec!["snomed".into()],
                review: ReviewConfig {
                    keep_current_mins: 0,
                    keep_other_mins: 0,
                    ..ReviewConfig::default()
                },
                ..CoreConfig::default()
            })
            .unwrap(),
        );
        let snomed = repos.get("snomed").unwrap();
        snomed.create_review(&BranchPath::main(), &BranchPath::main()).unwrap();
        assert_eq!(snomed.review_manager().reviews().unwrap().len(), 1);

        let handle = spawn_maintenance(repos.clone(), Duration::from_millis(10));
        let mut swept = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if snomed.review_manager().reviews().unwrap().is_empty() {
                swept = true;
                break;
            }
        }
        assert!(swept);

        handle.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
