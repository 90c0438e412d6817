use std::{io, sync::Arc};

use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{buildkite::Pipelines, routes};

pub async fn run(
    listener: TcpListener,
    connection: PgPool,
    ci: Arc<dyn Pipelines>,
) -> io::Result<()> {
    let router = routes::router(Arc::new(connection), ci).layer(TraceLayer::new_for_http());
    axum::serve(listener, router).await
}
