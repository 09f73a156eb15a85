pub mod error;
pub mod handlers;
pub mod mcp_client;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use mcp_client::McpClient;
pub use routes::{create_app, AppState};
