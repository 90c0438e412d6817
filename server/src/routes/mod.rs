use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::PgPool;

use crate::buildkite::Pipelines;

pub mod admin;
pub mod machines;

#[derive(Clone)]
pub struct RouterState {
    pub db: Arc<PgPool>,
    pub ci: Arc<dyn Pipelines>,
}

impl AsRef<PgPool> for RouterState {
    fn as_ref(&self) -> &PgPool {
        &self.db
    }
}

impl AsRef<dyn Pipelines> for RouterState {
    fn as_ref(&self) -> &(dyn Pipelines + 'static) {
        &*self.ci
    }
}

impl FromRef<RouterState> for Arc<PgPool> {
    fn from_ref(input: &RouterState) -> Self {
        input.db.clone()
    }
}

impl FromRef<RouterState> for Arc<dyn Pipelines> {
    fn from_ref(input: &RouterState) -> Self {
        input.ci.clone()
    }
}

pub fn router(db: Arc<PgPool>, ci: Arc<dyn Pipelines>) -> Router {
    Router::new()
        .nest("/admin", admin::routes())
        .nest("/machines", machines::routes())
        .with_state(RouterState { db, ci })
}
