use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::data_capture::BroadcastPublisher;
use crate::session_management::SessionRegistry;
use crate::storage::ObjectStore;

/// Everything the request handlers share.
pub struct WebContext {
    pub registry: Arc<SessionRegistry>,
    pub publisher: Arc<BroadcastPublisher>,
    pub store: Arc<dyn ObjectStore>,
    pub key_prefix: String,
    pub default_interface: String,
}

/// API error payload
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

/// Query string of `GET /start-sniffing`.
#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    pub interface: Option<String>,
    pub limit: Option<usize>,
}

/// Query string of `WS /packets`; `session` narrows the stream to one session.
#[derive(Debug, Default, Deserialize)]
pub struct PacketsQuery {
    pub session: Option<uuid::Uuid>,
}

#[derive(Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    pub session_id: uuid::Uuid,
}

/// A JSON body with its status code.
#[derive(Debug)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiReply {
    pub fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status: StatusCode::OK,
                body,
            },
            Err(e) => Self::error(StatusCode::INTERNAL_SERVER_ERROR, e),
        }
    }

    pub fn error<E: ToString>(status: StatusCode, error: E) -> Self {
        Self {
            status,
            body: json!(ApiError {
                error: error.to_string()
            }),
        }
    }
}

impl Reply for ApiReply {
    fn into_response(self) -> Response {
        reply::with_status(reply::json(&self.body), self.status).into_response()
    }
}
