//! Same-origin HTTP server for the browse front-end.
//!
//! # Purpose
//!
//! Serves the JSON action protocol and, optionally, the static files of the
//! web UI. Request threads never touch the collection: every action is
//! handed to the owner context and the request thread waits for the result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐      Bridge::run(job)      ┌──────────────────────┐
//! │  rouille worker pool    │  ──── Command closure ───▶ │   Owner context      │
//! │                         │                            │   (main thread or    │
//! │  POST /api              │                            │    OwnerThread)      │
//! │   parse -> Command      │  ◀── Result<Value, _> ──── │  host.collection()   │
//! │   write {result,error}  │                            │  command.execute()   │
//! └─────────────────────────┘                            └──────────────────────┘
//! ```
//!
//! - **rouille** - sync HTTP server with a fixed worker pool
//! - **Bridge** - submit-and-block handoff to the owner context
//! - **StaticFiles** - optional web root with path containment
//!
//! # Endpoints
//!
//! | Method   | Path          | Description                           |
//! |----------|---------------|---------------------------------------|
//! | GET/HEAD | `/api/health` | `{"status":"ok"}`, no collection use  |
//! | POST     | `/api`        | `{"action", "params"}` action call    |
//! | GET      | anything else | static file from the web root, or 404 |

mod api;
mod assets;

pub use api::{
    API_PATH, ApiRequest, ApiResponse, BrowseServer, HEALTH_PATH, MAX_BODY_BYTES, Router, ServerError,
    default_pool_size,
};
pub use assets::StaticFiles;
