//! The `/api/v1/callback` handler: core-metadata tells the service
//! about device, profile and schedule-event mutations, and the local
//! caches follow.

use crate::{dispatch::Reply, service::DeviceService};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Method {
    Post,
    Put,
    Delete,
}

/// Applies one callback alert. The body carries the mutated object's
/// id and kind.
pub async fn handle(
    svc: &Arc<DeviceService>,
    method: Method,
    body: serde_json::Value,
) -> Reply {
    let id = body.get("id").and_then(|v| v.as_str()).unwrap_or("");
    let kind = body.get("type").and_then(|v| v.as_str()).unwrap_or("");

    if id.is_empty() || kind.is_empty() {
        return Reply::error(400, "callback requires 'id' and 'type'");
    }

    match kind.to_uppercase().as_str() {
        "DEVICE" => device_callback(svc, method, id).await,
        "PROFILE" => profile_callback(svc, method, id).await,
        "SCHEDULE" | "SCHEDULEEVENT" => {
            // The durable copy changed; rebuild the runtime job set
            // from metadata.

            match svc.resync_schedule_jobs().await {
                Ok(()) => Reply::ok(json!({})),
                Err(e) => Reply::error(500, &e.to_string()),
            }
        }
        other => {
            warn!("callback for unsupported type {}", other);
            Reply::error(400, &format!("unsupported callback type {}", other))
        }
    }
}

async fn device_callback(
    svc: &Arc<DeviceService>,
    method: Method,
    id: &str,
) -> Reply {
    match method {
        Method::Delete => match svc.cache().remove(id).await {
            Some(dev) => {
                info!("callback removed device {}", &dev.name);
                Reply::ok(json!({}))
            }
            None => Reply::error(404, &format!("no device with id {}", id)),
        },
        Method::Post | Method::Put => {
            let metadata = match svc.metadata() {
                Ok(m) => m,
                Err(e) => return Reply::error(500, &e.to_string()),
            };

            match metadata.device(id).await {
                Ok(Some(dev)) => {
                    info!("callback updated device {}", &dev.name);
                    svc.cache().add(dev).await;
                    Reply::ok(json!({}))
                }
                Ok(None) => {
                    Reply::error(404, &format!("no device with id {}", id))
                }
                Err(e) => Reply::error(500, &e.to_string()),
            }
        }
    }
}

async fn profile_callback(
    svc: &Arc<DeviceService>,
    method: Method,
    id: &str,
) -> Reply {
    match method {
        Method::Delete => match svc.cache().remove_profile_by_id(id).await {
            Some(profile) => {
                info!("callback removed profile {}", &profile.name);
                Reply::ok(json!({}))
            }
            None => {
                Reply::error(404, &format!("no profile with id {}", id))
            }
        },
        Method::Post | Method::Put => {
            let metadata = match svc.metadata() {
                Ok(m) => m,
                Err(e) => return Reply::error(500, &e.to_string()),
            };

            match metadata.profile_by_id(id).await {
                Ok(Some(profile)) => {
                    info!("callback updated profile {}", &profile.name);
                    svc.cache().add_profile(profile).await;
                    Reply::ok(json!({}))
                }
                Ok(None) => {
                    Reply::error(404, &format!("no profile with id {}", id))
                }
                Err(e) => Reply::error(500, &e.to_string()),
            }
        }
    }
}
