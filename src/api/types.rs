//! Shared types for the HTTP layer.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::api::middleware::principal::HeaderPrincipalProvider;
use crate::authorization::PrincipalProvider;
use crate::core_state::{CoreError, CoreState};

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub principals: Arc<dyn PrincipalProvider<Request = HeaderMap>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            principals: Arc::new(HeaderPrincipalProvider),
        }
    }

    /// Run a core operation on the blocking pool. Core services hold the
    /// SQLite mutex and call blocking HTTP clients.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CoreState) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let core = self.core.clone();
        let result = tokio::task::spawn_blocking(move || f(&core)).await?;
        Ok(result?)
    }
}
