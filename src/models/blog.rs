//! Editorial blog content models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blog post. Slug is the unique natural key; body stays raw markdown
/// (rendering happens client-side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin payload for creating or updating a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostInput {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub body: String,
    #[serde(default)]
    pub published: bool,
}
