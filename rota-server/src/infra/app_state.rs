use std::{fmt, sync::Arc};

use tracing::warn;

use rota_core::{
    AllocationEngine, AllocationOutcome, AllocationRequest, Notifier,
};
use rota_model::DeliveryContext;

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub engine: AllocationEngine,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        engine: AllocationEngine,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            notifier,
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocate and, when the serving owner has a forward target, tell
    /// them what was handed out.
    pub async fn allocate(&self, request: AllocationRequest) -> AllocationOutcome {
        let requester = request.requester;
        let outcome = self.engine.allocate(request).await;

        if let AllocationOutcome::Issued(issued) = &outcome
            && let Some(target) = issued.forward_target
        {
            let text = format!(
                "Your {} {} was given to {}.",
                issued.kind, issued.value, requester
            );
            if let Err(err) = self
                .notifier
                .deliver(&DeliveryContext::new(target), &text)
                .await
            {
                warn!(owner = %issued.owner, error = %err, "failed to forward issuance");
            }
        }

        outcome
    }
}
