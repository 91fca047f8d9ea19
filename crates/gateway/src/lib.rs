//! Admin HTTP surface for the ferrygram plugin runtime.
//!
//! Everything under `/api/admin` sits behind [`auth_middleware::require_admin`];
//! `/health` is public.

pub mod api_response;
pub mod auth_middleware;
pub mod plugin_routes;
pub mod runtime_routes;
pub mod server;
pub mod state;

pub use {
    auth_middleware::{ADMIN_COOKIE, AdminAuthenticator, DenyAll},
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
};
