mod websocket;

use std::{io, sync::Arc};

use actix_web::{
    dev::ServerHandle,
    web::{self, Bytes, Data, Payload},
    App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use log::{debug, info};
use tokio::sync::Mutex;

use super::{methods, RpcHandler, RpcResponseError};
use crate::chain::DevChain;

pub use websocket::{NEW_HEAD_NOTIFICATION, SUBSCRIBE_NEW_HEADS, UNSUBSCRIBE_NEW_HEADS};

/// Ephemeral JSON-RPC server for one dev chain instance.
///
/// Serves `/json_rpc` over plain HTTP POST and as a WebSocket upgrade on the
/// same route, dispatching both through one method registry.
pub struct RpcServer {
    handle: Mutex<Option<ServerHandle>>,
    port: u16,
}

impl RpcServer {
    /// Bind on 127.0.0.1 and start serving. Port 0 requests any free port;
    /// the effective port is reported by [`RpcServer::port`].
    pub async fn bind(chain: Arc<DevChain>, port: u16) -> io::Result<Self> {
        let mut handler = RpcHandler::new(chain);
        methods::register_methods(&mut handler);
        let handler = Arc::new(handler);

        let builder = HttpServer::new(move || {
            App::new()
                .app_data(Data::from(handler.clone()))
                .route("/json_rpc", web::post().to(json_rpc))
                .route("/json_rpc", web::get().to(websocket_endpoint))
        })
        .disable_signals()
        .workers(1)
        .bind(("127.0.0.1", port))?;

        let port = builder
            .addrs()
            .first()
            .map(|addr| addr.port())
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no bound address"))?;

        let server = builder.run();
        let handle = server.handle();
        tokio::spawn(server);
        info!("RPC server listening on 127.0.0.1:{}", port);

        Ok(Self {
            handle: Mutex::new(Some(handle)),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the server. Safe to call more than once; later calls are no-ops.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.stop(false).await;
            info!("RPC server stopped");
        } else {
            debug!("RPC server already stopped");
        }
    }
}

async fn json_rpc(
    handler: Data<RpcHandler<Arc<DevChain>>>,
    body: Bytes,
) -> Result<impl Responder, RpcResponseError> {
    let result = handler.handle_request(&body).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn websocket_endpoint(
    handler: Data<RpcHandler<Arc<DevChain>>>,
    request: HttpRequest,
    body: Payload,
) -> actix_web::Result<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&request, body)?;
    // the message stream is not Send; keep the session on this worker
    actix_rt::spawn(websocket::session_loop(
        handler.into_inner(),
        session,
        stream,
    ));
    Ok(response)
}
