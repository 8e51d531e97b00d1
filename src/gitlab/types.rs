//! Typed payloads for the GitLab REST API

use serde::{Deserialize, Serialize};

/// The authenticated user. Serializable because it is the one payload the
/// disk cache persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub web_url: String,
}

/// Immutable snapshot of a project as the API reports it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_with_namespace: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub star_count: u64,
    #[serde(default, rename = "forks_count")]
    pub fork_count: u64,
    #[serde(default)]
    pub last_activity_at: Option<String>,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// A repository tag and the commit it points at.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A contribution event; only the fields needed to find the most recently
/// touched project.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Event {
    pub project_id: u64,
    #[serde(default)]
    pub action_name: String,
    #[serde(default)]
    pub target_type: Option<String>,
}
