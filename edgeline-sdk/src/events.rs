//! Builds event/reading records from driver results and posts them to
//! core-data from the worker pool.

use crate::{pool::WorkerPool, transform};
use edgeline_api::{
    client::CoreDataClient,
    driver::{CommandRequest, CommandResult},
    types::{
        event::{Event, Reading},
        value::{PropertyType, Value},
    },
    Error, Result,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The current time in epoch milliseconds, the resolution used for
/// `origin` fields throughout the platform.
pub fn millitime() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// The value standing in for an out-of-range reading: zero of the
/// reading's own type.
fn sentinel(ty: PropertyType) -> Value {
    match ty {
        PropertyType::Bool => Value::Bool(false),
        PropertyType::String => Value::Str(String::new()),
        PropertyType::Binary => Value::Binary(vec![]),
        _ => Value::from_f64(ty, 0.0).unwrap_or(Value::F64(0.0)),
    }
}

/// Builds an event from parallel `(source, result)` pairs.
///
/// Each result's type must equal the property type declared by its
/// source resource. When `transform` is set, the forward transforms
/// run here; a reading whose transformed value falls outside the
/// resource's minimum/maximum is replaced with a sentinel and marked
/// non-valid, keeping its place in the event. `Ok(None)` only when
/// there were no pairs at all.
pub fn generate_event(
    device_name: &str,
    sources: &[CommandRequest],
    results: Vec<CommandResult>,
    transform: bool,
) -> Result<Option<Event>> {
    if sources.len() != results.len() {
        return Err(Error::OperationError(format!(
            "driver returned {} results for {} requests",
            results.len(),
            sources.len()
        )));
    }

    let mut readings = vec![];

    for (source, result) in sources.iter().zip(results) {
        let props = &source.resource.properties.value;
        let declared = props.value_type.unwrap_or(PropertyType::String);

        if result.value.property_type() != declared {
            return Err(Error::TypeMismatch(format!(
                "device {}: resource {} declares {} but the driver returned {}",
                device_name,
                &source.resource.name,
                declared,
                result.value.property_type()
            )));
        }

        let value = if transform {
            transform::forward(result.value, props)?
        } else {
            result.value
        };

        let valid = transform::in_range(&value, props);
        let value = if valid {
            value
        } else {
            warn!(
                "device {}: reading {} = {} is out of range; sentinel used",
                device_name, &source.resource.name, value
            );
            sentinel(value.property_type())
        };

        let media_type = if value.property_type() == PropertyType::Binary {
            props.media_type.clone()
        } else {
            None
        };

        readings.push(Reading {
            name: source.resource.name.clone(),
            value: value.to_string(),
            origin: if result.origin != 0 {
                result.origin
            } else {
                millitime()
            },
            value_type: value.property_type(),
            media_type,
            valid,
        });
    }

    if readings.is_empty() {
        return Ok(None);
    }

    Ok(Some(Event {
        device: device_name.to_string(),
        origin: millitime(),
        readings,
    }))
}

/// Submits an event POST to the worker pool. Delivery is at-most-once:
/// a failed POST is logged and dropped, never retried.
pub fn publish(pool: &WorkerPool, client: Arc<dyn CoreDataClient>, event: Event) {
    pool.submit(Box::pin(async move {
        match client.add_event(&event).await {
            Ok(()) => debug!(
                "posted event for {} ({} reading(s))",
                &event.device,
                event.readings.len()
            ),
            Err(e) => {
                error!("dropping event for {}: {}", &event.device, &e)
            }
        }
    }))
}
