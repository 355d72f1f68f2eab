//! HTTP listener, router and action dispatch using rouille.
//!
//! # Purpose
//!
//! Accepts connections on a rouille thread pool, decodes `POST /api`
//! bodies into a [`Command`] on the request thread, then runs the command
//! on the owner context through the [`Bridge`] and writes the outcome back
//! as `{"result": .., "error": ..}`.
//!
//! # Key types
//!
//! - [`BrowseServer`] - start/stop lifecycle around a rouille server
//! - [`Router`] - request handler shared by all pool threads
//! - [`ApiRequest`] / [`ApiResponse`] - protocol envelope
//!
//! # Error reporting
//!
//! Everything the protocol can express (malformed body, unknown action,
//! bad params, handler failures, owner panics) is HTTP 200 with the
//! `error` slot set. rouille turns a panicking handler into a bare 500 and
//! drops writes to clients that went away.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::assets::StaticFiles;
use crate::actions::{Action, Command};
use crate::bridge::Bridge;
use crate::collection::CollectionHost;
use crate::error::ActionError;

/// Path of the action endpoint.
pub const API_PATH: &str = "/api";
/// Path of the health check.
pub const HEALTH_PATH: &str = "/api/health";
/// Largest accepted request body.
pub const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

const JSON_MIME: &str = "application/json";

/// Request body of `POST /api`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub action: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

impl ApiRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, ActionError> {
        serde_json::from_slice(body).map_err(|e| ActionError::InvalidRequest(e.to_string()))
    }
}

/// Response body of `POST /api`; exactly one side is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(result: Value) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn err(message: impl ToString) -> Self {
        Self { result: None, error: Some(message.to_string()) }
    }

    fn into_response(self) -> Response {
        match serde_json::to_vec(&self) {
            Ok(body) => Response::from_data(JSON_MIME, body),
            Err(e) => {
                warn!("Failed to encode API response: {}", e);
                Response::text("Internal server error").with_status_code(500)
            }
        }
    }
}

impl From<Result<Value, ActionError>> for ApiResponse {
    fn from(outcome: Result<Value, ActionError>) -> Self {
        match outcome {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(e),
        }
    }
}

/// Request handler shared by the listener's worker threads.
pub struct Router<H> {
    bridge: Bridge<H>,
    assets: Option<StaticFiles>,
}

impl<H: CollectionHost + 'static> Router<H> {
    pub fn new(bridge: Bridge<H>) -> Self {
        Self { bridge, assets: None }
    }

    pub fn with_assets(mut self, assets: StaticFiles) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn handle(&self, request: &Request) -> Response {
        rouille::router!(request,
            (GET) ["/api/health"] => {
                health()
            },
            (HEAD) ["/api/health"] => {
                health()
            },
            (POST) ["/api"] => {
                ApiResponse::from(self.dispatch(request)).into_response()
            },
            _ => {
                self.fallback(request)
            }
        )
    }

    /// Decodes, runs and logs one API call.
    pub fn dispatch(&self, request: &Request) -> Result<Value, ActionError> {
        let body = read_body(request)?;
        let api = ApiRequest::from_slice(&body)?;
        let action: Action = api.action.parse()?;
        let command = Command::parse(action, &api.params.unwrap_or_default())?;

        let started = Instant::now();
        let outcome = self.bridge.run(move |host: &mut H| -> Result<Value, ActionError> {
            let col = host.collection().ok_or(ActionError::CollectionClosed)?;
            command.execute(col)
        });
        let outcome = outcome.map_err(ActionError::from).and_then(|r| r);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &outcome {
            Ok(_) => debug!("{} ok in {:.2} ms", action, elapsed_ms),
            Err(e) => debug!("{} failed in {:.2} ms: {}", action, elapsed_ms, e),
        }
        outcome
    }

    fn fallback(&self, request: &Request) -> Response {
        if request.method() != "GET" && request.method() != "HEAD" {
            return Response::empty_404();
        }
        self.assets
            .as_ref()
            .and_then(|assets| assets.serve(request))
            .unwrap_or_else(Response::empty_404)
    }
}

fn health() -> Response {
    Response::from_data(JSON_MIME, r#"{"status":"ok"}"#)
}

fn read_body(request: &Request) -> Result<Vec<u8>, ActionError> {
    let data = request
        .data()
        .ok_or_else(|| ActionError::InvalidRequest("request body already consumed".to_string()))?;
    let mut body = Vec::new();
    data.take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| ActionError::InvalidRequest(format!("failed to read body: {}", e)))?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(ActionError::InvalidRequest(format!("body exceeds {} bytes", MAX_BODY_BYTES)));
    }
    Ok(body)
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

struct Running {
    addr: SocketAddr,
    stop: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// HTTP server with idempotent start and stop.
pub struct BrowseServer<H> {
    router: Arc<Router<H>>,
    pool_size: usize,
    running: Mutex<Option<Running>>,
}

impl<H: CollectionHost + 'static> BrowseServer<H> {
    pub fn new(bridge: Bridge<H>) -> Self {
        Self::from_router(Router::new(bridge))
    }

    pub fn from_router(router: Router<H>) -> Self {
        Self {
            router: Arc::new(router),
            pool_size: default_pool_size(),
            running: Mutex::new(None),
        }
    }

    /// Number of request worker threads.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Binds `host:port` and starts serving in the background.
    ///
    /// Calling it again while running returns the address already bound and
    /// ignores the new arguments. Port 0 picks a free port.
    pub fn start(&self, host: &str, port: u16) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = running.as_ref() {
            debug!("Server already running on {}", current.addr);
            return Ok(current.addr);
        }

        let router = Arc::clone(&self.router);
        let server = rouille::Server::new((host, port), move |request| router.handle(request))
            .map_err(|source| ServerError::Bind { addr: format!("{}:{}", host, port), source })?
            .pool_size(self.pool_size);
        let addr = server.server_addr();
        let (handle, stop) = server.stoppable();

        info!("Browse server listening on http://{} ({} workers)", addr, self.pool_size);
        *running = Some(Running { addr, stop, handle });
        Ok(addr)
    }

    /// Stops accepting connections and waits for the listener thread to
    /// release its socket. Safe to call when not running.
    pub fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(running) = running else {
            return;
        };
        let _ = running.stop.send(());
        if running.handle.join().is_err() {
            warn!("Listener thread panicked");
        }
        info!("Browse server on {} stopped", running.addr);
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(|r| r.addr)
    }

    pub fn is_running(&self) -> bool {
        self.local_addr().is_some()
    }

    pub fn router(&self) -> &Router<H> {
        &self.router
    }
}

impl<H> Drop for BrowseServer<H> {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            let _ = running.stop.send(());
            let _ = running.handle.join();
        }
    }
}

/// Two request threads per CPU.
pub fn default_pool_size() -> usize {
    (num_cpus::get() * 2).max(2)
}
