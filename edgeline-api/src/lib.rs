//! Traits and types shared between the edgeline service core and the
//! protocol drivers it hosts.
//!
//! A device service is built by implementing
//! [`driver::ProtocolDriver`] and handing it to the SDK. The SDK, in
//! turn, talks to the rest of the edge platform through the client
//! traits in [`client`], so every platform collaborator can be
//! replaced by a test double.

pub mod client;
pub mod driver;
pub mod types;

pub use types::Error;

/// A `Result` type where the error value is a value from
/// `edgeline_api::types::Error`.
pub type Result<T> = std::result::Result<T, types::Error>;
