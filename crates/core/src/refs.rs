//! String-backed references with validated shapes.
//!
//! These identifiers cross process boundaries as plain strings: run ids
//! appear in URLs and durable-runtime handles, node refs are authored by
//! users in the graph editor, call ids round-trip through agent tool
//! invocations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix carried by every run id.
const RUN_ID_PREFIX: &str = "run_";

/// A stable, externally visible run identifier.
///
/// Shape: `run_` followed by 32 lowercase hex characters. The durable
/// runtime keeps its own internal id; this one is the key every store
/// and API path uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

/// Error returned when parsing a malformed run id.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid run id: {0:?}")]
pub struct RunIdParseError(String);

impl RunId {
    /// Generate a fresh random run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{RUN_ID_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    /// Parse an externally supplied run id, validating its shape.
    pub fn parse(s: &str) -> Result<Self, RunIdParseError> {
        let suffix = s
            .strip_prefix(RUN_ID_PREFIX)
            .ok_or_else(|| RunIdParseError(s.to_owned()))?;
        if suffix.len() == 32 && suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(RunIdParseError(s.to_owned()))
        }
    }

    /// The run id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = RunIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A reference to a node in a workflow graph (and, after compilation,
/// to the action derived from it).
///
/// Node refs are user-authored: any non-empty string without leading or
/// trailing whitespace is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

/// Error returned for an empty or whitespace-padded node ref.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid node ref: {0:?}")]
pub struct NodeRefError(String);

impl NodeRef {
    /// Validate and wrap a node reference.
    pub fn new(s: impl Into<String>) -> Result<Self, NodeRefError> {
        let s = s.into();
        if s.is_empty() || s.trim() != s {
            return Err(NodeRefError(s));
        }
        Ok(Self(s))
    }

    /// The node ref as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeRef {
    type Err = NodeRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of one agent tool invocation.
///
/// Shape: `{run_id}:{node_ref}:{millis}` where `millis` is a monotonic
/// timestamp assigned by the gateway at dispatch time. Node refs may
/// themselves contain colons, so parsing anchors on the first separator
/// (run ids contain none) and the last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

/// Error returned when a call id does not have the expected shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid call id: {0:?}")]
pub struct CallIdParseError(String);

impl CallId {
    /// Compose a call id from its parts.
    #[must_use]
    pub fn new(run_id: &RunId, node_ref: &NodeRef, millis: u64) -> Self {
        Self(format!("{run_id}:{node_ref}:{millis}"))
    }

    /// Split a call id back into `(run_id, node_ref, millis)`.
    pub fn decompose(&self) -> Result<(RunId, NodeRef, u64), CallIdParseError> {
        let malformed = || CallIdParseError(self.0.clone());
        let (run, rest) = self.0.split_once(':').ok_or_else(malformed)?;
        let (node, millis) = rest.rsplit_once(':').ok_or_else(malformed)?;
        let run_id = RunId::parse(run).map_err(|_| malformed())?;
        let node_ref = NodeRef::new(node).map_err(|_| malformed())?;
        let millis = millis.parse::<u64>().map_err(|_| malformed())?;
        Ok((run_id, node_ref, millis))
    }

    /// The call id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
