//! Web Interface
//!
//! HTTP control surface and live subscriber channel of the capture service.
//!
//! Components:
//! - `routes`: request handlers and their warp filters
//! - `types`: shared state and request/response payloads
//! - `web_server`: composes the routes and serves them
pub mod routes;
pub mod types;
pub mod web_server;

pub use types::{ApiReply, WebContext};
pub use web_server::WebServer;
