//! Defines fundamental types used throughout the edgeline codebase.

use std::fmt;

pub mod device;
pub mod event;
pub mod profile;
pub mod schedule;
pub mod value;

/// Enumerates all the errors that can be reported in edgeline. Every
/// variant carries a single-line reason string attached at the origin
/// of the failure; the top-level caller receives the variant and the
/// reason. Keep new variants generic enough to be useful outside the
/// module that introduces them. The reason string is the place for
/// specifics.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// No driver implementation was supplied to the service.
    ///
    /// The typed service constructor makes this unrepresentable in
    /// safe code; the variant is retained so the exit-code space
    /// matches the platform's reason codes.
    NoDeviceImpl,

    /// The service was created without a name.
    NoDeviceName,

    /// The service was created without a version string.
    NoDeviceVersion,

    /// An invalid argument was passed to an SDK entry point.
    InvalidArg(String),

    /// A configuration could not be parsed or was semantically
    /// invalid.
    BadConfig(String),

    /// A peer service (registry, core-data, core-metadata) did not
    /// respond within the configured retry budget.
    RemoteServerDown(String),

    /// The protocol driver's `init` callback failed.
    DriverUnstart(String),

    /// The remote object already exists. Recoverable during startup
    /// reconciliation; the remote copy is authoritative.
    Conflict(String),

    /// The requested resource does not exist.
    NotFound(String),

    /// A peer service replied with an unexpected error status.
    ServerError(String),

    /// A value did not match the property type declared in the
    /// device profile.
    TypeMismatch(String),

    /// The requested operation couldn't complete. The reason string
    /// has the details.
    OperationError(String),
}

impl Error {
    /// The numeric reason code for this error. A service aborted by
    /// an error exits with this code; HTTP-mirror variants use their
    /// status number.
    pub fn code(&self) -> i32 {
        match self {
            Error::NoDeviceImpl => 1,
            Error::NoDeviceName => 2,
            Error::NoDeviceVersion => 3,
            Error::InvalidArg(_) => 4,
            Error::BadConfig(_) => 5,
            Error::RemoteServerDown(_) => 6,
            Error::DriverUnstart(_) => 7,
            Error::TypeMismatch(_) => 8,
            Error::OperationError(_) => 9,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::ServerError(_) => 500,
        }
    }

    /// Maps an HTTP status from a peer service into the matching
    /// error value.
    pub fn from_status(status: u16, detail: &str) -> Error {
        match status {
            404 => Error::NotFound(detail.to_string()),
            409 => Error::Conflict(detail.to_string()),
            _ => Error::ServerError(format!("HTTP {}: {}", status, detail)),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoDeviceImpl => {
                write!(f, "no device implementation supplied")
            }
            Error::NoDeviceName => write!(f, "no device service name"),
            Error::NoDeviceVersion => write!(f, "no device service version"),
            Error::InvalidArg(v) => write!(f, "invalid argument: {}", &v),
            Error::BadConfig(v) => write!(f, "bad configuration: {}", &v),
            Error::RemoteServerDown(v) => {
                write!(f, "remote server down: {}", &v)
            }
            Error::DriverUnstart(v) => {
                write!(f, "driver failed to start: {}", &v)
            }
            Error::Conflict(v) => write!(f, "already exists: {}", &v),
            Error::NotFound(v) => write!(f, "not found: {}", &v),
            Error::ServerError(v) => write!(f, "server error: {}", &v),
            Error::TypeMismatch(v) => write!(f, "type mismatch: {}", &v),
            Error::OperationError(v) => {
                write!(f, "couldn't complete operation: {}", &v)
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::OperationError(format!("I/O error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::NoDeviceName.code(), 2);
        assert_eq!(Error::BadConfig("x".into()).code(), 5);
        assert_eq!(Error::Conflict("x".into()).code(), 409);
        assert_eq!(Error::from_status(404, "d").code(), 404);
        assert_eq!(
            Error::from_status(502, "gateway"),
            Error::ServerError("HTTP 502: gateway".into())
        );
    }
}
