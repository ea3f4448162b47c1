//! API route modules.

pub mod dashboard;
pub mod debug;
pub mod health;
pub mod logging;
pub mod notifications;
pub mod printers;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/ws", dashboard::router())
        .nest("/api/printers", printers::router())
        .nest("/api/notifications", notifications::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router());

    if state.enable_debug {
        router = router.nest("/api/debug", debug::router());
    }

    router.with_state(state)
}
