//! Release sequencing: tag creation, visibility confirmation, pipeline kickoff

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{SETTLE_POLL_ATTEMPTS, SETTLE_POLL_INTERVAL};
use crate::gitlab::client::GitLabClient;
use crate::gitlab::error::ApiError;
use crate::gitlab::pipeline::PipelineTrigger;
use crate::gitlab::types::Project;
use crate::release::version::{Bump, next_tag};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("could not create tag: {0}")]
    TagCreation(#[source] ApiError),
}

/// What a release produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub tag: String,
    pub pipeline: PipelineOutcome,
}

/// Pipeline kickoff result. A failed trigger never rolls back the tag that
/// was already created, so it lives in the outcome rather than the error.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    NotRequested,
    Triggered { url: Option<String> },
    Failed { message: String },
}

/// Network operations the release flow depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseGateway: Send + Sync {
    /// Creates `tag_name` on the project; `false` when the remote reported
    /// it as already present.
    async fn create_tag(&self, project_id: u64, tag_name: &str) -> Result<bool, ApiError>;

    /// Whether `tag_name` shows up in the project's tag list yet.
    async fn tag_exists(&self, project_id: u64, tag_name: &str) -> Result<bool, ApiError>;

    async fn trigger_pipeline(
        &self,
        project_path: &str,
        tag: &str,
    ) -> Result<Option<String>, ApiError>;
}

/// Production gateway: REST client for tags, session trigger for pipelines.
pub struct GitLabGateway<'a> {
    pub client: &'a GitLabClient,
    pub trigger: Option<&'a PipelineTrigger>,
}

#[async_trait]
impl ReleaseGateway for GitLabGateway<'_> {
    async fn create_tag(&self, project_id: u64, tag_name: &str) -> Result<bool, ApiError> {
        Ok(self.client.create_tag(project_id, tag_name).await?.is_some())
    }

    async fn tag_exists(&self, project_id: u64, tag_name: &str) -> Result<bool, ApiError> {
        let tags = self.client.list_tags(project_id).await?;
        Ok(tags.iter().any(|t| t.name == tag_name))
    }

    async fn trigger_pipeline(
        &self,
        project_path: &str,
        tag: &str,
    ) -> Result<Option<String>, ApiError> {
        match self.trigger {
            Some(trigger) => trigger.trigger(project_path, tag).await,
            None => Err(ApiError::Client(
                "no session credentials configured for pipeline trigger".to_string(),
            )),
        }
    }
}

/// Publishes the next version of `project`.
///
/// Computes the next tag from `tags_desc`, creates it, waits until it is
/// visible, and optionally kicks off a pipeline for it. Pipeline failures
/// are reported in the outcome; only tag creation itself can fail the
/// release.
pub async fn release<G: ReleaseGateway>(
    gateway: &G,
    project: &Project,
    tags_desc: &[String],
    kind: Bump,
    run_pipeline: bool,
) -> Result<ReleaseOutcome, ReleaseError> {
    let tag = next_tag(tags_desc, kind);
    info!(
        "creating tag {} on {} ({} bump)",
        tag, project.path_with_namespace, kind
    );

    let created = gateway
        .create_tag(project.id, &tag)
        .await
        .map_err(ReleaseError::TagCreation)?;
    if !created {
        debug!("tag {} already existed upstream", tag);
    }

    wait_until_visible(gateway, project.id, &tag).await;

    let pipeline = if run_pipeline {
        match gateway
            .trigger_pipeline(&project.path_with_namespace, &tag)
            .await
        {
            Ok(url) => PipelineOutcome::Triggered { url },
            Err(e) => {
                // the tag stays; kickoff is not transactional with it
                warn!("pipeline trigger for {} failed: {}", tag, e);
                PipelineOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    } else {
        PipelineOutcome::NotRequested
    };

    Ok(ReleaseOutcome { tag, pipeline })
}

/// Tag creation is not guaranteed to be synchronous with everything that
/// hangs off it on the remote side. Poll the tag list a few times instead
/// of sleeping blindly, and give up quietly once the window is spent.
async fn wait_until_visible<G: ReleaseGateway>(gateway: &G, project_id: u64, tag: &str) {
    for attempt in 1..=SETTLE_POLL_ATTEMPTS {
        match gateway.tag_exists(project_id, tag).await {
            Ok(true) => {
                debug!("tag {} visible after {} attempt(s)", tag, attempt);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("visibility check for {} failed: {}", tag, e),
        }
        if attempt < SETTLE_POLL_ATTEMPTS {
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }
    warn!(
        "tag {} not visible after {} attempts, proceeding",
        tag, SETTLE_POLL_ATTEMPTS
    );
}
