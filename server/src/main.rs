use std::sync::Arc;

use anyhow::Context;
use bench_fleet::{
    buildkite::BuildkiteClient,
    configuration::{get_configuration, Settings},
};
use common::telemetry::{get_subscriber, init_subscriber};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber(get_subscriber(
        "bench-fleet".into(),
        "info".into(),
        std::io::stdout,
    ));

    let conf = get_configuration().expect("Failed to read configuration");
    tracing::info!(initial_configuration = ?conf);

    let connection = if conf.db.migrate {
        migrate(&conf).await
    } else {
        PgPool::connect(&conf.db.connection_string())
            .await
            .expect("Failed to connect to Postgres")
    };

    let ci = Arc::new(BuildkiteClient::new(&conf.buildkite).context("creating buildkite client")?);

    let listener = TcpListener::bind(("0.0.0.0", conf.port))
        .await
        .context("binding http socket")?;

    bench_fleet::startup::run(listener, connection, ci)
        .await
        .context("running bench-fleet")?;
    Ok(())
}

async fn migrate(config: &Settings) -> PgPool {
    let mut connection = PgConnection::connect(&config.db.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    let exists = connection
        .fetch_one(
            format!(
                "SELECT 1 FROM pg_catalog.pg_database WHERE datname = '{}'",
                config.db.name
            )
            .as_str(),
        )
        .await;
    match exists {
        Ok(_) => {}
        Err(sqlx::Error::RowNotFound) => {
            connection
                .execute(format!(r#"CREATE DATABASE "{}";"#, config.db.name).as_str())
                .await
                .expect("Failed to create database.");
        }
        Err(e) => {
            panic!("failed to inspect db: {e:?}");
        }
    }
    let connection = PgPool::connect(&config.db.connection_string())
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&connection)
        .await
        .expect("Failed to migrate the database");
    connection
}
