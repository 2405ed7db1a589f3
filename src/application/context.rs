use crate::config::Config;
use crate::domain::ports::Clock;
use crate::domain::repositories::SignalRepository;
use crate::infrastructure::message_bus::MessageBus;
use std::sync::Arc;

/// Process-scoped context handed to every agent at construction. Replaces
/// module-global singletons with explicit ownership; the clock is injectable
/// so time-dependent behavior is testable.
#[derive(Clone)]
pub struct AgentContext {
    pub repo: Arc<dyn SignalRepository>,
    pub bus: MessageBus,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AgentContext {
    pub fn new(
        repo: Arc<dyn SignalRepository>,
        bus: MessageBus,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            bus,
            clock,
            config,
        }
    }
}
