#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Gateway
//!
//! The agent tool gateway:
//!
//! - [`ToolRegistry`] — per-run tools in a shared KV (hash per run,
//!   field per node) so every gateway instance agrees on the tool set;
//!   credentials sealed with AES-256-GCM envelope encryption
//! - [`SessionTokenStore`] — short-lived bearer tokens scoping an MCP
//!   session to a run, organization, agent, and allowed node set
//! - [`McpGateway`] / [`RunGatewayServer`] — cached per-scope virtual
//!   MCP servers implementing rmcp's `ServerHandler`; component tools
//!   dispatch into the running workflow by signal and poll, external
//!   sources are proxied and announced as `{source}__{tool}`
//!
//! Transport plumbing (SSE session wiring, bearer extraction) lives in
//! the API layer; this crate is transport-agnostic.

pub mod crypto;
pub mod error;
pub mod kv;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod session;

pub use crypto::CredentialSealer;
pub use error::GatewayError;
pub use kv::{KvStore, MemoryKv, RedisKv};
pub use registry::{RegisterComponent, RegisteredTool, ToolRegistry, ToolStatus, ToolType};
pub use server::{McpGateway, RunGatewayServer};
pub use session::{SessionScope, SessionTokenStore};
