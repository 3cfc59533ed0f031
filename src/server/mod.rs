mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{extract_bearer_token, relay_auth};
pub use state::AppState;
