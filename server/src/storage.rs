use std::collections::BTreeMap;

use common::domain::{FilterMap, Machine, MachineName};
use futures::{future, TryStreamExt};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("machine {name:?} has a malformed {column} column: {message}")]
    MalformedColumn {
        name: String,
        column: &'static str,
        message: String,
    },
}

/// Raw shape of a `machine` row. Conversion into the domain type is fallible
/// on purpose: names, ips and filter json are stored as loose text/jsonb and a
/// bad row should name the offending column instead of panicking.
#[derive(sqlx::FromRow)]
struct MachineRow {
    name: String,
    info: Option<String>,
    hostname: Option<String>,
    ip_address: Option<String>,
    port: Option<i32>,
    api_token: Option<Uuid>,
    default_filters: serde_json::Value,
    supported_filters: Vec<String>,
    supported_langs: Vec<String>,
    offline_warning_enabled: bool,
}

impl TryFrom<MachineRow> for Machine {
    type Error = StoreError;

    fn try_from(row: MachineRow) -> Result<Self, Self::Error> {
        fn malformed(
            name: &str,
            column: &'static str,
            message: impl ToString,
        ) -> StoreError {
            StoreError::MalformedColumn {
                name: name.to_owned(),
                column,
                message: message.to_string(),
            }
        }

        let name = MachineName::try_from(row.name.as_str())
            .map_err(|e| malformed(&row.name, "name", e))?;
        let ip_address = row
            .ip_address
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e| malformed(&row.name, "ip_address", e))?;
        let port = row
            .port
            .map(u16::try_from)
            .transpose()
            .map_err(|e| malformed(&row.name, "port", e))?;
        let default_filters: BTreeMap<String, FilterMap> =
            serde_json::from_value(row.default_filters)
                .map_err(|e| malformed(&row.name, "default_filters", e))?;

        Ok(Machine {
            name,
            info: row.info,
            hostname: row.hostname,
            ip_address,
            port,
            api_token: row.api_token,
            default_filters,
            supported_filters: row.supported_filters,
            supported_langs: row.supported_langs,
            offline_warning_enabled: row.offline_warning_enabled,
        })
    }
}

const COLUMNS: &str = "name, info, hostname, ip_address, port, api_token, \
     default_filters, supported_filters, supported_langs, offline_warning_enabled";

pub async fn upsert(pool: &PgPool, machine: &Machine) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO machine
            (name, info, hostname, ip_address, port, api_token,
             default_filters, supported_filters, supported_langs, offline_warning_enabled)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (name) DO UPDATE SET
            info = EXCLUDED.info,
            hostname = EXCLUDED.hostname,
            ip_address = EXCLUDED.ip_address,
            port = EXCLUDED.port,
            api_token = EXCLUDED.api_token,
            default_filters = EXCLUDED.default_filters,
            supported_filters = EXCLUDED.supported_filters,
            supported_langs = EXCLUDED.supported_langs,
            offline_warning_enabled = EXCLUDED.offline_warning_enabled"#,
    )
    .bind(machine.name.as_ref())
    .bind(machine.info.as_deref())
    .bind(machine.hostname.as_deref())
    .bind(machine.ip_address.map(|ip| ip.to_string()))
    .bind(machine.port.map(i32::from))
    .bind(machine.api_token)
    .bind(Json(&machine.default_filters))
    .bind(&machine.supported_filters)
    .bind(&machine.supported_langs)
    .bind(machine.offline_warning_enabled)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch(pool: &PgPool, name: &MachineName) -> Result<Option<Machine>, StoreError> {
    let query = format!("SELECT {COLUMNS} FROM machine WHERE name = $1");
    let row: Option<MachineRow> = sqlx::query_as(&query)
        .bind(name.as_ref())
        .fetch_optional(pool)
        .await?;
    row.map(Machine::try_from).transpose()
}

pub async fn list(pool: &PgPool) -> Result<Vec<Machine>, StoreError> {
    let query = format!("SELECT {COLUMNS} FROM machine ORDER BY name");
    sqlx::query_as::<_, MachineRow>(&query)
        .fetch(pool)
        .map_err(StoreError::from)
        .and_then(|row| future::ready(Machine::try_from(row)))
        .try_collect()
        .await
}

pub async fn delete(pool: &PgPool, name: &MachineName) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM machine WHERE name = $1")
        .bind(name.as_ref())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
