//! Session-authenticated pipeline trigger
//!
//! Pipeline creation goes through the instance's web endpoint with the
//! session cookie and anti-forgery token, not the REST API, so it skips the
//! usual classification. Redirects are handled manually: a 3xx answer's
//! `Location` header is the URL of the pipeline that was just created.

use tracing::debug;

use crate::config::PipelineVariable;
use crate::gitlab::error::ApiError;

pub struct PipelineTrigger {
    http: reqwest::Client,
    base_url: String,
    cookie: String,
    csrf_token: String,
    variables: Vec<PipelineVariable>,
}

impl PipelineTrigger {
    pub fn new(
        base_url: &str,
        cookie: &str,
        csrf_token: &str,
        variables: Vec<PipelineVariable>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("gitlab-release")
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie: cookie.to_string(),
            csrf_token: csrf_token.to_string(),
            variables,
        }
    }

    /// Starts a pipeline for `tag` on the project at `project_path`.
    ///
    /// Returns the redirect target when the instance answers with one, and
    /// `None` on a plain 2xx.
    pub async fn trigger(&self, project_path: &str, tag: &str) -> Result<Option<String>, ApiError> {
        let url = format!("{}/{}/-/pipelines", self.base_url, project_path);
        debug!("POST {}", url);

        let variables: Vec<serde_json::Value> = self
            .variables
            .iter()
            .map(|v| {
                serde_json::json!({
                    "variable_type": "env_var",
                    "key": v.key,
                    "secret_value": v.value,
                })
            })
            .collect();
        let body = serde_json::json!({
            "ref": format!("refs/tags/{tag}"),
            "variables": variables,
        });

        let response = self
            .http
            .post(&url)
            .header("Cookie", &self.cookie)
            .header("x-csrf-token", &self.csrf_token)
            .header("Accept", "*/*")
            .header("Referer", &url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!("status code: {}", status.as_u16());
        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Ok(Some(location));
        }
        if status.is_success() {
            return Ok(None);
        }
        Err(ApiError::Server(status.as_u16()))
    }
}
