//! Query functions for the goal-tracking app.
//!
//! Each wrapper holds an injected [`Client`] and maps the backend's native
//! reply into an [`Envelope`] at the boundary. None of them return `Err`:
//! every backend failure lands in the envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{Client, Select};
use crate::envelope::Envelope;
use crate::query::QueryFn;

/// Table holding goal categories.
pub const CATEGORIES_TABLE: &str = "categories";
/// Table holding goals.
pub const GOALS_TABLE: &str = "goals";
/// Storage bucket holding profile pictures.
pub const AVATARS_BUCKET: &str = "avatars";

/// A goal category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Primary key.
    pub id: i64,
    /// Display name; categories are listed by it.
    pub name: String,
    /// Icon identifier, if one was chosen.
    #[serde(default)]
    pub icon: Option<String>,
}

/// A tracked goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Primary key.
    pub id: i64,
    /// Short title.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Id of the owning [`Category`].
    pub category_id: i64,
    /// Amount to reach.
    pub target: f64,
    /// Amount reached so far.
    #[serde(default)]
    pub progress: f64,
    /// Creation timestamp (RFC 3339); goal pages are newest first.
    pub created_at: String,
}

impl Goal {
    /// Fraction of the target reached, clamped to `0.0..=1.0`.
    pub fn completion(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        (self.progress / self.target).clamp(0.0, 1.0)
    }
}

/// Page selector for [`FetchGoals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalPage {
    /// Zero-based page number.
    pub page: u64,
    /// Rows per page; treated as 1 when 0.
    pub per_page: u64,
    /// Only goals of this category, when set.
    pub category_id: Option<i64>,
}

impl GoalPage {
    /// First page of all categories.
    pub fn first(per_page: u64) -> Self {
        Self {
            page: 0,
            per_page,
            category_id: None,
        }
    }

    /// The page after this one. Stays put at the last representable page.
    pub fn next_page(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }

    /// Restrict to one category.
    pub fn in_category(self, category_id: i64) -> Self {
        Self {
            category_id: Some(category_id),
            ..self
        }
    }

    /// Inclusive row range `(from, to)` of this page.
    pub fn range(&self) -> (u64, u64) {
        let per_page = self.per_page.max(1);
        let from = self.page.saturating_mul(per_page);
        (from, from.saturating_add(per_page - 1))
    }
}

/// Lists every category, ordered by name.
#[derive(Debug, Clone)]
pub struct FetchCategories {
    client: Client,
}

impl FetchCategories {
    /// Query categories through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryFn<()> for FetchCategories {
    type Output = Vec<Category>;

    async fn call(&self, _args: ()) -> anyhow::Result<Envelope<Vec<Category>>> {
        let select = Select::from(CATEGORIES_TABLE).order("name", true);
        Ok(self.client.select(select).await.into_envelope())
    }
}

/// Fetches one page of goals, newest first.
///
/// Pagination is passed straight through to the backend; an empty page is
/// a successful, empty result.
#[derive(Debug, Clone)]
pub struct FetchGoals {
    client: Client,
}

impl FetchGoals {
    /// Query goal pages through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryFn<GoalPage> for FetchGoals {
    type Output = Vec<Goal>;

    async fn call(&self, page: GoalPage) -> anyhow::Result<Envelope<Vec<Goal>>> {
        let (from, to) = page.range();
        let mut select = Select::from(GOALS_TABLE)
            .order("created_at", false)
            .range(from, to);
        if let Some(category_id) = page.category_id {
            select = select.eq("category_id", category_id);
        }
        Ok(self.client.select(select).await.into_envelope())
    }
}

/// Storage path of a user's avatar.
pub fn avatar_path(user_id: &str) -> String {
    format!("{user_id}.png")
}

/// Downloads the avatar stored at the given path.
#[derive(Debug, Clone)]
pub struct DownloadAvatar {
    client: Client,
}

impl DownloadAvatar {
    /// Download avatars through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryFn<String> for DownloadAvatar {
    type Output = Vec<u8>;

    async fn call(&self, path: String) -> anyhow::Result<Envelope<Vec<u8>>> {
        Ok(self
            .client
            .download(AVATARS_BUCKET, &path)
            .await
            .into_raw_envelope())
    }
}

/// Stores a new avatar for a user, replacing the old one.
///
/// Arguments are `(user_id, image bytes)`; the output is the stored path.
#[derive(Debug, Clone)]
pub struct UploadAvatar {
    client: Client,
}

impl UploadAvatar {
    /// Upload avatars through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryFn<(String, Vec<u8>)> for UploadAvatar {
    type Output = String;

    async fn call(&self, args: (String, Vec<u8>)) -> anyhow::Result<Envelope<String>> {
        let (user_id, bytes) = args;
        let path = avatar_path(&user_id);
        Ok(self
            .client
            .upload(AVATARS_BUCKET, &path, bytes, true)
            .await
            .into_raw_envelope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_page_range() {
        assert_eq!(GoalPage::first(20).range(), (0, 19));
        assert_eq!(GoalPage::first(20).next_page().next_page().range(), (40, 59));
        assert_eq!(GoalPage::first(0).range(), (0, 0));
    }

    #[test]
    fn test_goal_page_category() {
        let page = GoalPage::first(10).in_category(4).next_page();
        assert_eq!(page.category_id, Some(4));
        assert_eq!(page.page, 1);
    }

    #[test]
    fn test_goal_page_next_at_last_page() {
        let last = GoalPage {
            page: u64::MAX,
            per_page: 10,
            category_id: None,
        };
        assert_eq!(last.next_page(), last);
        assert_eq!(last.range(), (u64::MAX, u64::MAX));
    }

    #[test]
    fn test_goal_completion() {
        let mut goal = Goal {
            id: 1,
            title: "Run 100km".to_string(),
            description: None,
            category_id: 1,
            target: 100.0,
            progress: 25.0,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(goal.completion(), 0.25);

        goal.progress = 150.0;
        assert_eq!(goal.completion(), 1.0);

        goal.target = 0.0;
        assert_eq!(goal.completion(), 0.0);
    }

    #[test]
    fn test_avatar_path() {
        assert_eq!(avatar_path("user-1"), "user-1.png");
    }
}
