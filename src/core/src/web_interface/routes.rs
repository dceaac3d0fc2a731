use std::convert::Infallible;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{info, warn};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Filter, Rejection, Reply};

use super::types::{ApiReply, ControlResponse, PacketsQuery, StartQuery, WebContext};
use crate::data_capture::publisher::BroadcastPublisher;
use crate::data_capture::types::RecordEvent;
use crate::error_handling::types::{SessionError, StorageError};
use crate::session_management::DEFAULT_SLOT;
use crate::storage::csv_codec;
use crate::storage::storage_trait::validate_key;

fn with_context(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (Arc<WebContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn session_error_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::AlreadyRunning => StatusCode::CONFLICT,
        SessionError::NotRunning | SessionError::InvalidPacketLimit => StatusCode::BAD_REQUEST,
        SessionError::NotFound => StatusCode::NOT_FOUND,
        SessionError::CaptureError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn start_sniffing(ctx: &WebContext, query: StartQuery) -> ApiReply {
    let interface = query
        .interface
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| ctx.default_interface.clone());
    match ctx.registry.start(DEFAULT_SLOT, &interface, query.limit) {
        Ok(session_id) => ApiReply::ok(&ControlResponse {
            status: "started",
            session_id,
        }),
        Err(e) => ApiReply::error(session_error_status(&e), e),
    }
}

pub fn stop_sniffing(ctx: &WebContext) -> ApiReply {
    match ctx.registry.stop_slot(DEFAULT_SLOT) {
        Ok(session_id) => ApiReply::ok(&ControlResponse {
            status: "stopped",
            session_id,
        }),
        Err(e) => ApiReply::error(session_error_status(&e), e),
    }
}

pub fn current_status(ctx: &WebContext) -> ApiReply {
    match ctx.registry.slot_status(DEFAULT_SLOT) {
        Ok(snapshot) => ApiReply::ok(&snapshot),
        Err(e) => ApiReply::error(session_error_status(&e), e),
    }
}

pub fn session_status(ctx: &WebContext, id: Uuid) -> ApiReply {
    match ctx.registry.status(id) {
        Ok(snapshot) => ApiReply::ok(&snapshot),
        Err(e) => ApiReply::error(session_error_status(&e), e),
    }
}

pub fn list_captures(ctx: &WebContext) -> ApiReply {
    match ctx.store.list(&ctx.key_prefix) {
        Ok(keys) => ApiReply::ok(&json!({ "captures": keys })),
        Err(e) => ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub fn load_capture(ctx: &WebContext, key: &str) -> ApiReply {
    if let Err(e) = validate_key(key) {
        return ApiReply::error(StatusCode::BAD_REQUEST, e);
    }
    let bytes = match ctx.store.get(key) {
        Ok(b) => b,
        Err(e @ StorageError::NotFound(_)) => return ApiReply::error(StatusCode::NOT_FOUND, e),
        Err(e) => return ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    match csv_codec::decode_records(&bytes) {
        Ok(records) => ApiReply::ok(&json!({ "key": key, "records": records })),
        Err(e) => ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Forwards published records (all of them, or one session's) to one
/// WebSocket subscriber until either side goes away.
async fn forward_records(
    socket: WebSocket,
    mut records: broadcast::Receiver<RecordEvent>,
    publisher: Arc<BroadcastPublisher>,
    session: Option<Uuid>,
) {
    let (mut outgoing, mut incoming) = socket.split();
    info!(
        "Live subscriber connected ({} listening)",
        publisher.subscriber_count()
    );

    loop {
        tokio::select! {
            event = records.recv() => match event {
                Ok(event) if session.is_some_and(|id| id != event.session_id) => {}
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(t) => t,
                        Err(e) => {
                            warn!("[{}] Unable to encode record: {}", event.session_id, e);
                            continue;
                        }
                    };
                    if outgoing.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live subscriber lagging, {} records dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            msg = incoming.next() => match msg {
                Some(Ok(m)) if m.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    let _ = outgoing.close().await;
    info!("Live subscriber disconnected");
}

/// GET /start-sniffing
pub fn start_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path("start-sniffing")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<StartQuery>())
        .and(with_context(ctx))
        .map(|query: StartQuery, ctx: Arc<WebContext>| start_sniffing(&ctx, query))
}

/// GET /stop-sniffing
pub fn stop_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path("stop-sniffing")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx))
        .map(|ctx: Arc<WebContext>| stop_sniffing(&ctx))
}

/// GET /status
pub fn status_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx))
        .map(|ctx: Arc<WebContext>| current_status(&ctx))
}

/// GET /sessions/:id
pub fn session_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path!("sessions" / Uuid)
        .and(warp::get())
        .and(with_context(ctx))
        .map(|id: Uuid, ctx: Arc<WebContext>| session_status(&ctx, id))
}

/// GET /captures
pub fn list_captures_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path("captures")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx))
        .map(|ctx: Arc<WebContext>| list_captures(&ctx))
}

/// GET /captures/:key
pub fn load_capture_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    warp::path!("captures" / String)
        .and(warp::get())
        .and(with_context(ctx))
        .map(|key: String, ctx: Arc<WebContext>| load_capture(&ctx, &key))
}

/// WS /packets[?session=<uuid>]
pub fn packets_route(
    ctx: Arc<WebContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("packets")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<PacketsQuery>())
        .and(with_context(ctx))
        .map(|ws: Ws, query: PacketsQuery, ctx: Arc<WebContext>| {
            let publisher = ctx.publisher.clone();
            let records = publisher.subscribe();
            ws.on_upgrade(move |socket| forward_records(socket, records, publisher, query.session))
        })
}
