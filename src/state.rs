use std::sync::Arc;

use crate::collab::CoordinatorHandle;
use crate::config::Config;
use crate::services::auth_service::IdentityVerifier;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: CoordinatorHandle,
    pub verifier: Arc<dyn IdentityVerifier>,
}
