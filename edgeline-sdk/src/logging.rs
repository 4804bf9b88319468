//! Log system bring-up. The subscriber is installed once per process;
//! a service started inside an already-configured process keeps the
//! existing subscriber.

use std::sync::Arc;
use tracing::warn;

/// Installs the global fmt subscriber at the configured level,
/// writing to `file` when one is set.
pub fn init(level: tracing::Level, file: Option<&str>) {
    let result = match file {
        Some(path) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(f) => {
                    let subscriber = tracing_subscriber::fmt()
                        .with_max_level(level)
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(f))
                        .finish();

                    tracing::subscriber::set_global_default(subscriber)
                }
                Err(e) => {
                    init(level, None);
                    warn!("can't open log file {}: {}", path, e);
                    return;
                }
            }
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_target(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
        }
    };

    // Already set by the embedding process; that one wins.
    let _ = result;
}
