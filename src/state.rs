use std::sync::Arc;
use std::time::Duration;

use crate::store::MetricsStore;

/// Process-wide immutable state: the shared store handle and the bound on any
/// single remote call. Initialized once at startup, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricsStore>,
    pub call_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn MetricsStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }
}
