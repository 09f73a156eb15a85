use axum::response::IntoResponse;
use serde::Serialize;

use crate::response::success;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
