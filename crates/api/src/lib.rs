#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade API
//!
//! The HTTP surface of the orchestration backend:
//!
//! - workflow CRUD, commit (compile), run control, trace reads, and the
//!   server-sent-events run stream;
//! - approval listing/resolution plus the public tokenized links;
//! - MCP session plumbing (`/mcp/sse` + `/mcp/messages`) bridging
//!   agents onto the gateway's virtual servers;
//! - the worker-only `/internal/mcp/*` surface.
//!
//! Authentication accepts exactly one of: the internal shared secret,
//! a bearer API key, or a provider-validated user session.

pub mod app;
pub mod auth;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use app::{router, serve};
pub use config::ApiConfig;
pub use error::ApiError;
pub use state::AppState;
