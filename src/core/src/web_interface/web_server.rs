use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::info;
use warp::{Filter, Rejection, Reply};

use super::routes;
use super::types::WebContext;
use crate::error_handling::types::WebError;

/// Web server for the capture control API and the live packet channel
pub struct WebServer {
    context: Arc<WebContext>,
}

impl WebServer {
    pub fn new(context: Arc<WebContext>) -> Self {
        Self { context }
    }

    /// All routes, logged through the `netsniff::web` target.
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let ctx = &self.context;
        routes::start_route(ctx.clone())
            .or(routes::stop_route(ctx.clone()))
            .or(routes::status_route(ctx.clone()))
            .or(routes::session_route(ctx.clone()))
            .or(routes::list_captures_route(ctx.clone()))
            .or(routes::load_capture_route(ctx.clone()))
            .or(routes::packets_route(ctx.clone()))
            .with(warp::log("netsniff::web"))
    }

    /// Serves until the surrounding task is cancelled.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|e| WebError::BindFailed(format!("{}: {}", bind_address, e)))?;
        let addr = SocketAddr::new(ip, port);

        info!("Web server listening on http://{}", addr);
        warp::serve(self.routes()).run(addr).await;
        Ok(())
    }
}
