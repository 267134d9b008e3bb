pub mod cli;
pub mod config;
pub mod credentials;
pub mod debugger;
pub mod error;
pub mod events;
pub mod handler;
pub mod invoke;
pub mod launcher;
pub mod tool;

pub use error::RunError;
pub use launcher::{launch, ExecutionResult, RunOutcome, RunStatus, RunningProcess};

use std::sync::Arc;

use config::SamRunConfig;
use credentials::{CredentialProvider, CredentialRegistry};
use events::EventBroadcaster;
use handler::ResolverRegistry;

/// Shared state passed to every launch: config, event fan-out, the handler
/// resolver registry, and the credential provider. Runs built from the same
/// context are fully independent of each other — the context itself is
/// read-only after construction.
#[derive(Clone)]
pub struct RunnerContext {
    pub config: Arc<SamRunConfig>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub resolvers: Arc<ResolverRegistry>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl RunnerContext {
    /// Context with the built-in resolvers and an empty credential registry.
    pub fn new(config: SamRunConfig) -> Self {
        Self {
            config: Arc::new(config),
            broadcaster: Arc::new(EventBroadcaster::new()),
            resolvers: Arc::new(ResolverRegistry::with_defaults()),
            credentials: Arc::new(CredentialRegistry::new()),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }
}
