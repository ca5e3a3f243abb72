//! HTTP route handlers.

pub mod approvals;
pub mod internal;
pub mod mcp;
pub mod stream;
pub mod workflows;
