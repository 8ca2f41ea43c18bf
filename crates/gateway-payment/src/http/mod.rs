//! The payment-service HTTP surface (`spec.md` §6).

mod handlers;
mod routes;
mod state;

pub use routes::routes;
pub use state::AppState;
