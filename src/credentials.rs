//! Credential and region lookup.
//!
//! The core treats credentials as a pure lookup: given an identifier, a
//! provider either knows the keys or it does not. Real deployments back this
//! with a profile store or an STS exchange; the in-memory registry covers the
//! CLI and the test suite.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A resolved AWS credential set, injected into the sandbox environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary credentials; injected as `AWS_SESSION_TOKEN`.
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn basic(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

/// Supplies credentials for a configured identifier.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Look up a credential set. None = identifier unknown.
    async fn resolve(&self, credentials_id: &str) -> Option<AwsCredentials>;
}

/// In-memory provider keyed by identifier.
#[derive(Default)]
pub struct CredentialRegistry {
    entries: RwLock<HashMap<String, AwsCredentials>>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: impl Into<String>, creds: AwsCredentials) {
        self.entries.write().await.insert(id.into(), creds);
    }
}

#[async_trait]
impl CredentialProvider for CredentialRegistry {
    async fn resolve(&self, credentials_id: &str) -> Option<AwsCredentials> {
        self.entries.read().await.get(credentials_id).cloned()
    }
}
