//! Server configuration from the environment.

use std::net::SocketAddr;

use crate::error::ApiError;

/// Which identity provider validates user sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProviderKind {
    /// HTTP Basic against `ADMIN_USERNAME` / `ADMIN_PASSWORD`.
    Admin,
    /// Clerk-backed sessions; the provider integration is deployed as
    /// an external collaborator.
    Clerk,
}

/// Durable-runtime connection settings. Consumed by the Temporal
/// adapter deployment; the local runtime only uses `task_queue` for
/// run metadata.
#[derive(Debug, Clone)]
pub struct TemporalConfig {
    /// Frontend address.
    pub address: String,
    /// Task queue runs are scheduled on.
    pub task_queue: String,
    /// Namespace.
    pub namespace: String,
}

/// Connection settings for external collaborators. The core never
/// talks to these itself; their capability/sink implementations are
/// deployed alongside and read the same variables.
#[derive(Debug, Clone, Default)]
pub struct ExternalServices {
    /// Object storage (`MINIO_ENDPOINT`, `MINIO_ACCESS_KEY`,
    /// `MINIO_SECRET_KEY`, `MINIO_BUCKET`).
    pub minio_endpoint: Option<String>,
    /// Object storage access key.
    pub minio_access_key: Option<String>,
    /// Object storage secret key.
    pub minio_secret_key: Option<String>,
    /// Object storage bucket.
    pub minio_bucket: Option<String>,
    /// Log-stream indexing (`LOKI_URL`, `LOKI_USERNAME`,
    /// `LOKI_PASSWORD`).
    pub loki_url: Option<String>,
    /// Loki basic-auth username.
    pub loki_username: Option<String>,
    /// Loki basic-auth password.
    pub loki_password: Option<String>,
    /// Log shipping (`LOG_KAFKA_BROKERS`, `LOG_KAFKA_TOPIC`).
    pub log_kafka_brokers: Option<String>,
    /// Kafka topic for shipped logs.
    pub log_kafka_topic: Option<String>,
    /// Clerk keys (`CLERK_SECRET_KEY`, `CLERK_PUBLISHABLE_KEY`) for the
    /// external identity-provider integration.
    pub clerk_secret_key: Option<String>,
    /// Clerk publishable key.
    pub clerk_publishable_key: Option<String>,
}

impl ExternalServices {
    fn from_env() -> Self {
        Self {
            minio_endpoint: optional("MINIO_ENDPOINT"),
            minio_access_key: optional("MINIO_ACCESS_KEY"),
            minio_secret_key: optional("MINIO_SECRET_KEY"),
            minio_bucket: optional("MINIO_BUCKET"),
            loki_url: optional("LOKI_URL"),
            loki_username: optional("LOKI_USERNAME"),
            loki_password: optional("LOKI_PASSWORD"),
            log_kafka_brokers: optional("LOG_KAFKA_BROKERS"),
            log_kafka_topic: optional("LOG_KAFKA_TOPIC"),
            clerk_secret_key: optional("CLERK_SECRET_KEY"),
            clerk_publishable_key: optional("CLERK_PUBLISHABLE_KEY"),
        }
    }
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Shared secret guarding `/internal/*` (`INTERNAL_SERVICE_TOKEN`).
    pub internal_token: String,
    /// Hex master key for credential envelope encryption
    /// (`SECRET_STORE_MASTER_KEY`).
    pub master_key: String,
    /// Durable-runtime settings.
    pub temporal: TemporalConfig,
    /// Tool-registry Redis, when deployed multi-instance
    /// (`TOOL_REGISTRY_REDIS_URL`); in-memory otherwise.
    pub redis_url: Option<String>,
    /// Database connection (`DATABASE_URL`); stores fall back to
    /// in-memory implementations when absent.
    pub database_url: Option<String>,
    /// Identity provider selection (`AUTH_PROVIDER`).
    pub auth_provider: AuthProviderKind,
    /// Admin credentials for the static provider.
    pub admin_username: String,
    /// Admin password; doubles as the development bearer API key.
    pub admin_password: String,
    /// External collaborator settings, passed through to deployments.
    pub external: ExternalServices,
}

fn required(name: &str) -> Result<String, ApiError> {
    std::env::var(name).map_err(|_| ApiError::configuration(format!("{name} is not set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl ApiConfig {
    /// Read the configuration from the process environment. Missing
    /// mandatory values fail startup.
    pub fn from_env() -> Result<Self, ApiError> {
        let bind = optional("CASCADE_BIND")
            .unwrap_or_else(|| "0.0.0.0:8080".to_owned())
            .parse()
            .map_err(|e| ApiError::configuration(format!("CASCADE_BIND: {e}")))?;

        let auth_provider = match optional("AUTH_PROVIDER").as_deref() {
            None | Some("admin") => AuthProviderKind::Admin,
            Some("clerk") => AuthProviderKind::Clerk,
            Some(other) => {
                return Err(ApiError::configuration(format!(
                    "AUTH_PROVIDER must be `admin` or `clerk`, got {other}"
                )));
            }
        };
        if auth_provider == AuthProviderKind::Clerk && optional("CLERK_SECRET_KEY").is_none() {
            return Err(ApiError::configuration(
                "AUTH_PROVIDER=clerk requires CLERK_SECRET_KEY",
            ));
        }

        Ok(Self {
            bind,
            internal_token: required("INTERNAL_SERVICE_TOKEN")?,
            master_key: required("SECRET_STORE_MASTER_KEY")?,
            temporal: TemporalConfig {
                address: optional("TEMPORAL_ADDRESS")
                    .unwrap_or_else(|| "localhost:7233".to_owned()),
                task_queue: optional("TEMPORAL_TASK_QUEUE")
                    .unwrap_or_else(|| "cascade-main".to_owned()),
                namespace: optional("TEMPORAL_NAMESPACE").unwrap_or_else(|| "default".to_owned()),
            },
            redis_url: optional("TOOL_REGISTRY_REDIS_URL"),
            database_url: optional("DATABASE_URL"),
            auth_provider,
            admin_username: optional("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_owned()),
            admin_password: required("ADMIN_PASSWORD")?,
            external: ExternalServices::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_reports_missing_variable() {
        let err = required("CASCADE_TEST_DOES_NOT_EXIST").unwrap_err();
        assert!(err.to_string().contains("CASCADE_TEST_DOES_NOT_EXIST"));
    }

    #[test]
    fn optional_is_none_for_unset_variable() {
        assert_eq!(optional("CASCADE_TEST_ALSO_UNSET"), None);
    }
}
