use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::Transport;

/// Transport selection: the engine default, or a registered override
#[derive(Debug)]
pub struct TransportHooks {
    default: Arc<dyn Transport>,
    custom: RwLock<Option<Arc<dyn Transport>>>,
}

impl TransportHooks {
    pub fn new(default: Arc<dyn Transport>) -> Self {
        TransportHooks {
            default,
            custom: RwLock::new(None),
        }
    }

    /// Install a custom transport; it replaces any earlier registration
    pub fn register(&self, transport: Arc<dyn Transport>) {
        info!("Custom transport registered");
        *self.custom.write() = Some(transport);
    }

    /// Revert to the default transport
    pub fn unregister(&self) {
        if self.custom.write().take().is_some() {
            info!("Custom transport unregistered, using default");
        }
    }

    pub fn current(&self) -> Arc<dyn Transport> {
        self.custom
            .read()
            .clone()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn is_custom(&self) -> bool {
        self.custom.read().is_some()
    }
}
