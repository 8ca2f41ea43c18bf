mod handlers;
mod routes;
mod state;

pub use routes::routes;
pub use state::AppState;
