pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::{AppState, AppStateInner};
pub use routes::create_router;
pub use server::ApiServer;
