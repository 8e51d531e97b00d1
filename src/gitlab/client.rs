//! Token-authenticated GitLab REST client
//!
//! One method per remote operation. Listings follow the `x-next-page`
//! header until it runs out; every response goes through the same status
//! classification (see [`ApiError`]).

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::DiskCache;
use crate::config::{IDENTITY_CACHE_TTL, PAGE_SIZE, PAGE_SIZE_ALL};
use crate::gitlab::error::ApiError;
use crate::gitlab::types::{Commit, Event, Project, Tag, User};

/// Cache key for the identity lookup
const IDENTITY_CACHE_KEY: &str = "user";

pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    cache: Option<DiskCache>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("gitlab-release")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            cache: None,
        }
    }

    /// Attaches the disk cache backing the identity lookup.
    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4/{}", self.base_url, path)
    }

    async fn get_page(
        &self,
        path: &str,
        params: &[(&str, &str)],
        per_page: u32,
        page: u32,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.api_url(path);
        debug!("GET {} (page {})", url, page);
        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .query(params)
            .query(&[("per_page", per_page.to_string()), ("page", page.to_string())])
            .send()
            .await?;
        Ok(response)
    }

    /// Single-page read for endpoints where the first page is enough.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self.get_page(path, params, PAGE_SIZE, 1).await?;
        Self::json_or_error(response).await
    }

    /// Paginated read: keeps fetching and concatenating pages while the
    /// `x-next-page` header names one.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let response = self.get_page(path, params, PAGE_SIZE_ALL, 1).await?;
        let mut next_page = Self::next_page_number(&response);
        let mut items: Vec<T> = Self::json_or_error(response).await?;

        while let Some(page) = next_page {
            let response = self.get_page(path, params, PAGE_SIZE_ALL, page).await?;
            next_page = Self::next_page_number(&response);
            let mut page_items: Vec<T> = Self::json_or_error(response).await?;
            items.append(&mut page_items);
        }
        Ok(items)
    }

    fn next_page_number(response: &reqwest::Response) -> Option<u32> {
        response
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    async fn json_or_error<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        debug!("status code: {}", status.as_u16());
        if status.is_success() {
            response.json().await.map_err(|e| {
                warn!("Failed to parse GitLab API response: {}", e);
                ApiError::from(e)
            })
        } else {
            Err(Self::classify(response).await)
        }
    }

    async fn classify(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        match status {
            401 => ApiError::Unauthorized,
            403 => {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let message =
                    if body.get("error").and_then(|e| e.as_str()) == Some("insufficient_scope") {
                        "Insufficient API token scope"
                    } else {
                        "Forbidden"
                    };
                ApiError::Forbidden(message.to_string())
            }
            404 => ApiError::NotFound,
            s if (400..500).contains(&s) => {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let message = match body.get("message") {
                    Some(serde_json::Value::String(m)) => m.clone(),
                    Some(other) => other.to_string(),
                    None => format!("http status {s}"),
                };
                warn!("client error from GitLab API: {}", message);
                ApiError::Client(message)
            }
            s => ApiError::Server(s),
        }
    }

    /// The authenticated user, served from the disk cache when fresh.
    /// Invoked on every session but the answer changes rarely.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_compute(IDENTITY_CACHE_KEY, IDENTITY_CACHE_TTL, || {
                        self.fetch_current_user()
                    })
                    .await
            }
            None => self.fetch_current_user().await,
        }
    }

    async fn fetch_current_user(&self) -> Result<User, ApiError> {
        self.get("user", &[]).await
    }

    pub async fn get_project(&self, project_id: u64) -> Result<Project, ApiError> {
        self.get(&format!("projects/{project_id}"), &[]).await
    }

    /// Starred projects, optionally narrowed by a title search.
    pub async fn list_projects(&self, search: Option<&str>) -> Result<Vec<Project>, ApiError> {
        let mut params = vec![("starred", "true")];
        if let Some(text) = search {
            params.push(("search", text));
            params.push(("in", "title"));
        }
        self.get_all("projects", &params).await
    }

    pub async fn list_tags(&self, project_id: u64) -> Result<Vec<Tag>, ApiError> {
        self.get_all(&format!("projects/{project_id}/repository/tags"), &[])
            .await
    }

    pub async fn list_commits(
        &self,
        project_id: u64,
        ref_name: &str,
    ) -> Result<Vec<Commit>, ApiError> {
        self.get(
            &format!("projects/{project_id}/repository/commits"),
            &[("ref_name", ref_name)],
        )
        .await
    }

    /// The current user's events, newest first, filtered by `action`.
    pub async fn list_events(&self, action: &str) -> Result<Vec<Event>, ApiError> {
        let user = self.current_user().await?;
        self.get(
            &format!("users/{}/events", user.id),
            &[("action", action), ("target_type", "merge_request")],
        )
        .await
    }

    /// The most recently touched project, judged by the user's merge events.
    pub async fn latest_project(&self) -> Result<Option<Project>, ApiError> {
        let events = self.list_events("merged").await?;
        match events.first() {
            Some(event) => Ok(Some(self.get_project(event.project_id).await?)),
            None => Ok(None),
        }
    }

    /// Creates `tag_name` pointing at `master`. The remote answers 304 when
    /// nothing changed; that is a no-op, not an error.
    pub async fn create_tag(
        &self,
        project_id: u64,
        tag_name: &str,
    ) -> Result<Option<Tag>, ApiError> {
        let url = self.api_url(&format!("projects/{project_id}/repository/tags"));
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&serde_json::json!({ "tag_name": tag_name, "ref": "master" }))
            .send()
            .await?;

        let status = response.status();
        debug!("status code: {}", status.as_u16());
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if status.is_success() {
            let tag = response.json().await.map_err(|e| {
                warn!("Failed to parse tag creation response: {}", e);
                ApiError::from(e)
            })?;
            return Ok(Some(tag));
        }
        Err(Self::classify(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn client(server: &Server) -> GitLabClient {
        GitLabClient::new(&server.url(), "glpat-test")
    }

    #[tokio::test]
    async fn get_project_sends_token_and_parses_body() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/api/v4/projects/42")
            .match_header("PRIVATE-TOKEN", "glpat-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 42, "name": "app", "path_with_namespace": "group/app"}"#)
            .create_async()
            .await;

        let project = client(&server).get_project(42).await.unwrap();

        mock.assert_async().await;
        assert_eq!(project.name, "app");
    }

    #[tokio::test]
    async fn list_tags_concatenates_pages_until_next_page_header_is_absent() {
        let mut server = Server::new_async().await;

        let page1 = server
            .mock("GET", "/api/v4/projects/42/repository/tags")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "2")
            .with_body(r#"[{"name": "v1.1.0"}, {"name": "v1.0.0"}]"#)
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/api/v4/projects/42/repository/tags")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-next-page", "")
            .with_body(r#"[{"name": "v0.9.0"}]"#)
            .create_async()
            .await;

        let tags = client(&server).list_tags(42).await.unwrap();

        page1.assert_async().await;
        page2.assert_async().await;
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["v1.1.0", "v1.0.0", "v0.9.0"]);
    }

    #[tokio::test]
    async fn list_projects_passes_search_params() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/api/v4/projects")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("starred".into(), "true".into()),
                Matcher::UrlEncoded("search".into(), "app".into()),
                Matcher::UrlEncoded("in".into(), "title".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 1, "name": "app", "path_with_namespace": "me/app"}]"#)
            .create_async()
            .await;

        let projects = client(&server).list_projects(Some("app")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(projects.len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_response_classifies_as_unauthorized() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(401)
            .with_body(r#"{"message": "401 Unauthorized"}"#)
            .create_async()
            .await;

        let result = client(&server).get_project(42).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn forbidden_with_insufficient_scope_refines_the_message() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "insufficient_scope"}"#)
            .create_async()
            .await;

        let result = client(&server).get_project(42).await;
        match result {
            Err(ApiError::Forbidden(message)) => {
                assert_eq!(message, "Insufficient API token scope")
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_forbidden_keeps_the_generic_message() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "403 Forbidden"}"#)
            .create_async()
            .await;

        let result = client(&server).get_project(42).await;
        match result {
            Err(ApiError::Forbidden(message)) => assert_eq!(message, "Forbidden"),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_classifies_as_not_found() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(404)
            .with_body(r#"{"message": "404 Project Not Found"}"#)
            .create_async()
            .await;

        let result = client(&server).get_project(42).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn other_client_errors_carry_the_server_message() {
        let mut server = Server::new_async().await;

        server
            .mock("POST", "/api/v4/projects/42/repository/tags")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Tag v1.0.0 already exists"}"#)
            .create_async()
            .await;

        let result = client(&server).create_tag(42, "v1.0.0").await;
        match result {
            Err(ApiError::Client(message)) => assert_eq!(message, "Tag v1.0.0 already exists"),
            other => panic!("expected Client, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_carry_the_status() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(502)
            .create_async()
            .await;

        let result = client(&server).get_project(42).await;
        assert!(matches!(result, Err(ApiError::Server(502))));
    }

    #[tokio::test]
    async fn create_tag_treats_304_as_a_no_op() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/api/v4/projects/42/repository/tags")
            .match_body(Matcher::Json(serde_json::json!({
                "tag_name": "v1.0.1",
                "ref": "master"
            })))
            .with_status(304)
            .create_async()
            .await;

        let created = client(&server).create_tag(42, "v1.0.1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(created, None);
    }

    #[tokio::test]
    async fn create_tag_returns_the_created_tag() {
        let mut server = Server::new_async().await;

        server
            .mock("POST", "/api/v4/projects/42/repository/tags")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "v1.0.1", "commit": {"id": "abc"}}"#)
            .create_async()
            .await;

        let created = client(&server).create_tag(42, "v1.0.1").await.unwrap();
        assert_eq!(created.unwrap().name, "v1.0.1");
    }

    #[tokio::test]
    async fn current_user_is_served_from_the_cache_within_the_ttl() {
        let mut server = Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();

        let mock = server
            .mock("GET", "/api/v4/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "name": "Alice", "username": "alice"}"#)
            .expect(1)
            .create_async()
            .await;

        let client =
            GitLabClient::new(&server.url(), "glpat-test").with_cache(DiskCache::new(temp_dir.path()));

        let first = client.current_user().await.unwrap();
        let second = client.current_user().await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
        assert_eq!(first.username, "alice");
    }

    #[tokio::test]
    async fn latest_project_follows_the_newest_merge_event() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "name": "Alice", "username": "alice"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/users/7/events")
            .match_query(Matcher::UrlEncoded("action".into(), "merged".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"project_id": 42, "action_name": "accepted"}, {"project_id": 9}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 42, "name": "app", "path_with_namespace": "group/app"}"#)
            .create_async()
            .await;

        let project = client(&server).latest_project().await.unwrap();
        assert_eq!(project.unwrap().id, 42);
    }

    #[tokio::test]
    async fn latest_project_is_none_without_events() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/api/v4/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "name": "Alice", "username": "alice"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/users/7/events")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let project = client(&server).latest_project().await.unwrap();
        assert_eq!(project, None);
    }
}
