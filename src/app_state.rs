use crate::registry::RegistryEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RegistryEngine>,
    pub admin_key: Option<String>,
    pub shutdown: CancellationToken,
}
