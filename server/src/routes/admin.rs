use axum::{routing::get, Router};
use http::StatusCode;

pub fn routes() -> Router<super::RouterState> {
    Router::new().route("/health_check", get(health_check))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
