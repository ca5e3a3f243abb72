//! Short-lived MCP session tokens.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cascade_core::{AgentId, OrganizationId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::kv::KvStore;

/// Prefix distinguishing session tokens from other bearer credentials.
const TOKEN_PREFIX: &str = "mcp_";

/// What a session token authorizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScope {
    /// The run the session is bound to.
    pub run_id: RunId,
    /// The organization that must match the run's, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
    /// The agent the session belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Node ids the session may see; `None` means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_node_ids: Option<Vec<String>>,
    /// Expiry instant, mirrored into the KV TTL.
    pub expires_at: DateTime<Utc>,
}

/// KV-backed store of session tokens (`mcp:session:{token}` with TTL).
///
/// `validate` does not distinguish a missing token from an expired one.
pub struct SessionTokenStore {
    kv: Arc<dyn KvStore>,
}

impl SessionTokenStore {
    /// Create a store over the shared KV.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn token_key(token: &str) -> String {
        format!("mcp:session:{token}")
    }

    /// Mint a token scoping an MCP session.
    pub async fn mint(
        &self,
        run_id: RunId,
        organization_id: Option<OrganizationId>,
        agent_id: Option<AgentId>,
        allowed_node_ids: Option<Vec<String>>,
        ttl: Duration,
    ) -> Result<String, GatewayError> {
        let bytes = rand::random::<[u8; 32]>();
        let token = format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
        let scope = SessionScope {
            run_id,
            organization_id,
            agent_id,
            allowed_node_ids,
            expires_at: Utc::now()
                + chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0)),
        };
        let serialized =
            serde_json::to_string(&scope).map_err(|e| GatewayError::Kv(e.to_string()))?;
        self.kv
            .set_with_ttl(&Self::token_key(&token), serialized, ttl)
            .await?;
        Ok(token)
    }

    /// Resolve a presented token to its scope.
    pub async fn validate(&self, token: &str) -> Result<SessionScope, GatewayError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(GatewayError::SessionNotFound);
        }
        let serialized = self
            .kv
            .get(&Self::token_key(token))
            .await?
            .ok_or(GatewayError::SessionNotFound)?;
        let scope: SessionScope =
            serde_json::from_str(&serialized).map_err(|e| GatewayError::Kv(e.to_string()))?;
        if scope.expires_at <= Utc::now() {
            return Err(GatewayError::SessionNotFound);
        }
        Ok(scope)
    }

    /// Remove a token before its TTL (logout).
    pub async fn revoke(&self, token: &str) -> Result<(), GatewayError> {
        self.kv.delete(&Self::token_key(token)).await
    }
}
