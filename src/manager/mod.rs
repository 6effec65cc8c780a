//! Dynamic bot manager: registry, bootstrap, events, per-bot scheduling

pub mod bootstrap;
pub mod events;
pub mod registry;
pub mod scheduler;

// Re-exports for convenience
pub use bootstrap::{initialize_bots, StartupReport};
pub use events::{EventHandler, RegistrationEvent};
pub use registry::{BotRegistry, RegistryStats, RestartOutcome, StartOutcome};
pub use scheduler::SchedulerHandle;
