use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use sqlx::PgPool;

use common::domain::{FilterMap, Machine, MachineName};

use crate::{
    buildkite::{self, BuildkiteError},
    probe::{self, Reachability},
    storage,
};

pub fn routes() -> Router<super::RouterState> {
    Router::new()
        .route("/", post(register).get(list))
        .route("/:name", get(fetch).delete(remove))
        .route("/:name/run-filters", post(run_filters))
        .route("/:name/reachability", get(reachability))
        .route("/:name/pipeline", post(create_pipeline).delete(delete_pipeline))
}

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("no machine named {0}")]
    NotFound(MachineName),
    #[error("machine {0} still has scheduled builds")]
    BuildsPending(MachineName),
    #[error(transparent)]
    Store(#[from] storage::StoreError),
    #[error(transparent)]
    Buildkite(#[from] BuildkiteError),
}

impl IntoResponse for MachineError {
    fn into_response(self) -> axum::response::Response {
        let code = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BuildsPending(_) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Buildkite(_) => StatusCode::BAD_GATEWAY,
        };

        (code, self.to_string()).into_response()
    }
}

async fn load(db: &PgPool, name: &MachineName) -> Result<Machine, MachineError> {
    storage::fetch(db, name)
        .await?
        .ok_or_else(|| MachineError::NotFound(name.clone()))
}

#[tracing::instrument(skip_all, fields(machine = %machine.name))]
async fn register(
    State(super::RouterState { db, .. }): State<super::RouterState>,
    Json(machine): Json<Machine>,
) -> Result<StatusCode, MachineError> {
    storage::upsert(&db, &machine).await?;
    Ok(StatusCode::CREATED)
}

#[tracing::instrument(skip_all)]
async fn list(
    State(super::RouterState { db, .. }): State<super::RouterState>,
) -> Result<Json<Vec<Machine>>, MachineError> {
    Ok(Json(storage::list(&db).await?))
}

#[tracing::instrument(skip_all, fields(machine = %name))]
async fn fetch(
    State(super::RouterState { db, .. }): State<super::RouterState>,
    Path(name): Path<MachineName>,
) -> Result<Json<Machine>, MachineError> {
    Ok(Json(load(&db, &name).await?))
}

#[tracing::instrument(skip_all, fields(machine = %name))]
async fn remove(
    State(super::RouterState { db, ci }): State<super::RouterState>,
    Path(name): Path<MachineName>,
) -> Result<StatusCode, MachineError> {
    let machine = load(&db, &name).await?;

    if buildkite::has_scheduled_or_running_builds(&*ci, &machine).await? {
        return Err(MachineError::BuildsPending(name));
    }

    // a machine may be registered without its pipeline ever having been created
    match ci.delete_pipeline(&machine.pipeline_name()).await {
        Ok(()) => {}
        Err(BuildkiteError::UnexpectedStatus { status, .. })
            if status == StatusCode::NOT_FOUND => {}
        Err(e) => return Err(e.into()),
    }

    storage::delete(&db, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, serde::Deserialize)]
pub struct RunFiltersRequest {
    pub benchmarkable_type: String,
    #[serde(default)]
    pub override_filters: Option<FilterMap>,
}

#[derive(Debug, serde::Serialize)]
pub struct RunFiltersResponse {
    pub filters: FilterMap,
    pub skip_reason: Option<String>,
}

#[tracing::instrument(skip_all, fields(machine = %name, benchmarkable_type = %request.benchmarkable_type))]
async fn run_filters(
    State(super::RouterState { db, .. }): State<super::RouterState>,
    Path(name): Path<MachineName>,
    Json(request): Json<RunFiltersRequest>,
) -> Result<Json<RunFiltersResponse>, MachineError> {
    let machine = load(&db, &name).await?;
    let (filters, skip_reason) = machine
        .run_filters_and_skip_reason(&request.benchmarkable_type, request.override_filters.as_ref());

    Ok(Json(RunFiltersResponse { filters, skip_reason }))
}

#[tracing::instrument(skip_all, fields(machine = %name))]
async fn reachability(
    State(super::RouterState { db, .. }): State<super::RouterState>,
    Path(name): Path<MachineName>,
) -> Result<Json<Reachability>, MachineError> {
    let machine = load(&db, &name).await?;
    let outcome = probe::probe(&machine).await;

    if machine.offline_warning_enabled && !outcome.is_reachable() {
        tracing::warn!(machine = %machine.name, outcome = ?outcome, "machine is offline");
    }

    Ok(Json(outcome))
}

#[tracing::instrument(skip_all, fields(machine = %name))]
async fn create_pipeline(
    State(super::RouterState { db, ci }): State<super::RouterState>,
    Path(name): Path<MachineName>,
) -> Result<StatusCode, MachineError> {
    let machine = load(&db, &name).await?;
    ci.create_pipeline(&machine.pipeline_name(), machine.agent_queue())
        .await?;
    Ok(StatusCode::CREATED)
}

#[tracing::instrument(skip_all, fields(machine = %name))]
async fn delete_pipeline(
    State(super::RouterState { db, ci }): State<super::RouterState>,
    Path(name): Path<MachineName>,
) -> Result<StatusCode, MachineError> {
    let machine = load(&db, &name).await?;
    ci.delete_pipeline(&machine.pipeline_name()).await?;
    Ok(StatusCode::NO_CONTENT)
}
