use async_trait::async_trait;
use http::StatusCode;
use reqwest::{Client, Response, Url};
use serde::Deserialize;

use crate::configuration::BuildkiteSettings;
use common::domain::Machine;

#[derive(thiserror::Error, Debug)]
pub enum BuildkiteError {
    #[error("bad buildkite url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("buildkite returned {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub id: String,
    pub number: u64,
    pub state: String,
}

/// The slice of the CI service this service needs: pipeline lifecycle and the
/// scheduled-builds listing. Injected so the registry never talks to a global
/// client and tests can stand in their own.
#[async_trait]
pub trait Pipelines: Send + Sync {
    async fn create_pipeline(&self, name: &str, queue: &str) -> Result<(), BuildkiteError>;

    async fn delete_pipeline(&self, name: &str) -> Result<(), BuildkiteError>;

    async fn scheduled_builds(&self, pipeline_name: &str) -> Result<Vec<Build>, BuildkiteError>;
}

/// True iff the machine's benchmark pipeline has builds waiting to run.
pub async fn has_scheduled_or_running_builds(
    ci: &dyn Pipelines,
    machine: &Machine,
) -> Result<bool, BuildkiteError> {
    Ok(!ci.scheduled_builds(&machine.pipeline_name()).await?.is_empty())
}

/// Buildkite derives pipeline slugs from their names; deleting and listing go
/// through the slug, not the display name.
pub fn pipeline_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

pub struct BuildkiteClient {
    client: Client,
    base: Url,
    organization: String,
    token: String,
}

impl BuildkiteClient {
    pub fn new(settings: &BuildkiteSettings) -> Result<Self, BuildkiteError> {
        Ok(Self {
            client: Client::new(),
            base: Url::parse(&settings.api_url)?,
            organization: settings.organization.clone(),
            token: settings.token.clone(),
        })
    }

    fn pipelines_url(&self) -> Result<Url, BuildkiteError> {
        Ok(self
            .base
            .join(&format!("v2/organizations/{}/pipelines", self.organization))?)
    }

    fn pipeline_url(&self, name: &str) -> Result<Url, BuildkiteError> {
        Ok(self.base.join(&format!(
            "v2/organizations/{}/pipelines/{}",
            self.organization,
            pipeline_slug(name)
        ))?)
    }

    async fn check(response: Response) -> Result<Response, BuildkiteError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BuildkiteError::UnexpectedStatus {
                status,
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl Pipelines for BuildkiteClient {
    #[tracing::instrument(skip(self))]
    async fn create_pipeline(&self, name: &str, queue: &str) -> Result<(), BuildkiteError> {
        let response = self
            .client
            .post(self.pipelines_url()?)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "name": name,
                "steps": [{
                    "type": "script",
                    "name": ":rocket: benchmark",
                    "command": "buildkite-agent pipeline upload",
                    "agent_query_rules": [format!("queue={queue}")],
                }],
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_pipeline(&self, name: &str) -> Result<(), BuildkiteError> {
        let response = self
            .client
            .delete(self.pipeline_url(name)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn scheduled_builds(&self, pipeline_name: &str) -> Result<Vec<Build>, BuildkiteError> {
        let mut url = self.base.join(&format!(
            "v2/organizations/{}/pipelines/{}/builds",
            self.organization,
            pipeline_slug(pipeline_name)
        ))?;
        url.query_pairs_mut().append_pair("state", "scheduled");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
