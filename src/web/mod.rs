//! Admin and webhook HTTP surface

pub mod server;

// Re-exports for convenience
pub use server::{build_router, run_server, AppState};
