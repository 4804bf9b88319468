//! The REST surface. One warp server carries every handler; each
//! route consults the service's startup stage so the callback
//! endpoint is live before metadata reconciliation while the device
//! and auxiliary endpoints only answer once their collaborators are
//! wired.

use crate::{
    callback, discovery, dispatch,
    dispatch::Reply,
    metrics,
    service::{DeviceService, Stage},
};
use edgeline_api::{Error, Result};
use serde_json::json;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::info;
use warp::{http::StatusCode, Filter};

pub struct HttpHandle {
    pub task: JoinHandle<()>,
    pub shutdown: oneshot::Sender<()>,
}

fn to_response(reply: Reply) -> impl warp::Reply {
    warp::reply::with_status(
        warp::reply::json(&reply.body),
        StatusCode::from_u16(reply.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    )
}

fn not_wired() -> Reply {
    Reply::error(404, "not found")
}

fn with_svc(
    svc: Arc<DeviceService>,
) -> impl Filter<Extract = (Arc<DeviceService>,), Error = Infallible> + Clone {
    warp::any().map(move || svc.clone())
}

async fn ping_handler(
    svc: Arc<DeviceService>,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Full) {
        Reply::ok(json!({ "value": "pong" }))
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

async fn config_handler(
    svc: Arc<DeviceService>,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Full) {
        let pairs = svc.config_nvpairs().await;
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        Reply::ok(serde_json::Value::Object(map))
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

async fn metrics_handler(
    svc: Arc<DeviceService>,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Full) {
        match serde_json::to_value(metrics::collect()) {
            Ok(body) => Reply::ok(body),
            Err(e) => Reply::error(500, &e.to_string()),
        }
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

async fn discovery_handler(
    svc: Arc<DeviceService>,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Device) {
        discovery::trigger(&svc).await
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

async fn device_handler(
    svc: Arc<DeviceService>,
    tail: warp::path::Tail,
    write: bool,
    body: Option<serde_json::Value>,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Device) {
        dispatch::device_command(&svc, tail.as_str(), write, body).await
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

async fn callback_handler(
    svc: Arc<DeviceService>,
    method: callback::Method,
    body: serde_json::Value,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let reply = if svc.stage_at_least(Stage::Callback) {
        callback::handle(&svc, method, body).await
    } else {
        not_wired()
    };

    Ok(to_response(reply))
}

/// Binds the server and runs it on a background task until the
/// shutdown handle fires.
pub async fn start(
    svc: Arc<DeviceService>,
    port: u16,
) -> Result<HttpHandle> {
    let ping = warp::path!("api" / "v1" / "ping")
        .and(warp::get())
        .and(with_svc(svc.clone()))
        .and_then(ping_handler);

    let config = warp::path!("api" / "v1" / "config")
        .and(warp::get())
        .and(with_svc(svc.clone()))
        .and_then(config_handler);

    let metrics = warp::path!("api" / "v1" / "metrics")
        .and(warp::get())
        .and(with_svc(svc.clone()))
        .and_then(metrics_handler);

    let disco = warp::path!("api" / "v1" / "discovery")
        .and(warp::post())
        .and(with_svc(svc.clone()))
        .and_then(discovery_handler);

    let device_base = warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path("device"));

    let device_get = device_base
        .clone()
        .and(with_svc(svc.clone()))
        .and(warp::path::tail())
        .and(warp::get())
        .and_then(|svc, tail| device_handler(svc, tail, false, None));

    let device_put = device_base
        .and(with_svc(svc.clone()))
        .and(warp::path::tail())
        .and(warp::put())
        .and(warp::body::json())
        .and_then(|svc, tail, body| device_handler(svc, tail, true, Some(body)));

    let cb = warp::path!("api" / "v1" / "callback")
        .and(with_svc(svc.clone()))
        .and(
            warp::post()
                .map(|| callback::Method::Post)
                .or(warp::put().map(|| callback::Method::Put))
                .unify()
                .or(warp::delete().map(|| callback::Method::Delete))
                .unify(),
        )
        .and(warp::body::json())
        .and_then(callback_handler);

    let routes = ping
        .or(disco)
        .or(device_get)
        .or(device_put)
        .or(cb)
        .or(config)
        .or(metrics);

    let (tx, rx) = oneshot::channel::<()>();
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async {
            let _ = rx.await;
        })
        .map_err(|e| {
            Error::ServerError(format!("can't bind HTTP server: {}", e))
        })?;

    info!("REST server listening on {}", bound);

    Ok(HttpHandle {
        task: tokio::spawn(server),
        shutdown: tx,
    })
}
