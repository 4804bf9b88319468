#![deny(unsafe_code)]

//! The edgeline device-service SDK.
//!
//! A device service mediates between a set of physical or logical
//! devices and the edge platform's core-data and core-metadata
//! services. This crate supplies everything around the user's
//! protocol driver: configuration resolution (registry or file),
//! metadata reconciliation, the REST surface, the command dispatch
//! plane, the event publisher and the scheduled-job engine.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn example(driver: Arc<dyn edgeline_api::driver::ProtocolDriver>)
//! #     -> edgeline_api::Result<()> {
//! let svc = edgeline_sdk::DeviceService::new("device-example", "1.0.0", driver)?;
//!
//! svc.start(None, None, "res").await?;
//! // ... run until told otherwise ...
//! svc.stop(false).await;
//! # Ok(())
//! # }
//! ```

pub mod config;

mod cache;
mod callback;
pub mod clients;
mod devices;
mod discovery;
mod dispatch;
mod events;
mod http;
mod logging;
mod metrics;
mod pool;
mod profiles;
mod scheduler;
mod service;
mod transform;

#[cfg(test)]
pub(crate) mod testutil;

pub use events::millitime;
pub use service::DeviceService;
