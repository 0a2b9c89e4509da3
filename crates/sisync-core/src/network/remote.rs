//! Remote client contract consumed by the migration engine.
//!
//! Every component takes its clients by reference through [`Environment`],
//! so tests can swap in an in-memory implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, SisyncError};
use crate::models::EntityKind;

/// A decoded response. Non-2xx statuses are returned, not raised; only
/// transport failures become `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Best-effort error text from the body.
    pub fn error_message(&self) -> String {
        match &self.body {
            Value::Null => format!("HTTP {}", self.status),
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.body.to_string()),
            other => other.to_string(),
        }
    }

    /// Map a non-2xx status into the error taxonomy.
    ///
    /// `kind` and `name` describe what was being fetched, for 404s.
    pub fn ensure_success(self, kind: EntityKind, name: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(match self.status {
            401 | 403 => SisyncError::Unauthorized {
                status: self.status,
                message: self.error_message(),
            },
            404 => SisyncError::not_found(kind, name),
            status => SisyncError::Api {
                status,
                message: self.error_message(),
            },
        })
    }

    /// Like [`ensure_success`](Self::ensure_success) but for writes, where a
    /// 404 is an API error rather than a lookup miss.
    pub fn ensure_written(self, action: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = format!("{}: {}", action, self.error_message());
        Err(match self.status {
            401 | 403 => SisyncError::Unauthorized {
                status: self.status,
                message,
            },
            status => SisyncError::Api { status, message },
        })
    }
}

/// Authenticated request/response primitive against one environment.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, path: &str) -> Result<RemoteResponse>;

    async fn post(&self, path: &str, body: &Value) -> Result<RemoteResponse>;

    async fn put(&self, path: &str, body: &Value) -> Result<RemoteResponse>;

    async fn delete(&self, path: &str) -> Result<RemoteResponse>;

    /// Base URL, for log context.
    fn base_url(&self) -> &str;
}

/// Which side of a migration an environment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentRole {
    Source,
    Target,
}

impl std::fmt::Display for EnvironmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentRole::Source => write!(f, "source"),
            EnvironmentRole::Target => write!(f, "target"),
        }
    }
}

/// An authenticated endpoint with its own identifier space.
#[derive(Clone)]
pub struct Environment {
    role: EnvironmentRole,
    client: Arc<dyn RemoteClient>,
}

impl Environment {
    pub fn new(role: EnvironmentRole, client: Arc<dyn RemoteClient>) -> Self {
        Self { role, client }
    }

    pub fn source(client: Arc<dyn RemoteClient>) -> Self {
        Self::new(EnvironmentRole::Source, client)
    }

    pub fn target(client: Arc<dyn RemoteClient>) -> Self {
        Self::new(EnvironmentRole::Target, client)
    }

    pub fn role(&self) -> EnvironmentRole {
        self.role
    }

    pub fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("role", &self.role)
            .field("base_url", &self.client.base_url())
            .finish()
    }
}
