//! Observability listener and the application context behind it.

mod app;
mod context;
mod state;

pub use app::create_app;
pub use context::{AppContext, ListenerHandle, Readiness, ReleaseResult};
pub use state::AppState;
