mod analytics_routes;
mod auth_routes;
mod chat_routes;
pub mod config;
mod http_layers;
mod process_routes;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use session::Session;
pub use state::ServerState;
