//! The discovery handler. At most one discovery runs at a time;
//! concurrent requests are dropped, never queued.

use crate::{dispatch::Reply, service::DeviceService};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Triggers a discovery pass. Returns 202 when the driver accepted
/// the request, 423 when one is already in flight, and 503 when the
/// driver has no discovery support.
pub async fn trigger(svc: &Arc<DeviceService>) -> Reply {
    if !svc.driver().discoverable() {
        return Reply::error(503, "discovery is not supported");
    }

    match svc.cache().try_begin_discovery() {
        Some(guard) => {
            use tracing_futures::Instrument;

            let svc = svc.clone();

            svc.clone().pool().submit(Box::pin(
                async move {
                    debug!("running discovery");
                    svc.driver().discover().await;
                    debug!("discovery finished");
                    drop(guard);
                }
                .instrument(tracing::info_span!("discovery")),
            ));

            Reply {
                status: 202,
                body: json!({ "message": "discovery triggered" }),
            }
        }
        None => {
            info!("discovery already in progress; request dropped");
            Reply::error(423, "discovery is already in progress")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemData, MemMetadata, MockDriver};
    use std::sync::Arc;
    use tokio::time::Duration;

    fn harness(driver: Arc<MockDriver>) -> Arc<DeviceService> {
        DeviceService::new_for_tests(
            driver,
            Arc::new(MemData::default()),
            Arc::new(MemMetadata::default()),
        )
    }

    #[tokio::test]
    async fn test_unsupported_503() {
        let driver = Arc::new(MockDriver::default());

        driver.set_discoverable(false);

        let svc = harness(driver);

        assert_eq!(trigger(&svc).await.status, 503);
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight() {
        let driver = Arc::new(MockDriver::default());

        driver.set_discoverable(true);
        driver.set_discover_delay(Duration::from_millis(200));

        let svc = harness(driver.clone());

        // The first request is accepted; a second while it runs is
        // rejected with 423.

        assert_eq!(trigger(&svc).await.status, 202);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(trigger(&svc).await.status, 423);

        // Once the pass completes the gate reopens.

        svc.pool().stop(false).await;
        assert_eq!(driver.discover_count(), 1);
    }
}
