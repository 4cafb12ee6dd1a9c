use sqlx::Row;

use crate::common::types::UserSummary;
use crate::server::database::Database;
use crate::server::error::ServiceError;

/// Directory over the users table: existence checks and profile projection.
/// Account management lives with the external identity provider; only
/// `create_user` is exposed as its provisioning hook (used by tests and the
/// probe binary).
#[derive(Debug, Clone)]
pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool, ServiceError> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn profile(&self, user_id: &str) -> Result<Option<UserSummary>, ServiceError> {
        let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.map(|r| UserSummary {
            id: r.get("id"),
            username: r.get("username"),
        }))
    }

    /// Every user except the requester.
    pub async fn list_contacts(&self, excluding: &str) -> Result<Vec<UserSummary>, ServiceError> {
        let rows = sqlx::query("SELECT id, username FROM users WHERE id != ? ORDER BY username ASC")
            .bind(excluding)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| UserSummary {
                id: r.get("id"),
                username: r.get("username"),
            })
            .collect())
    }

    /// Resolve a set of ids to profiles. Ids that no longer exist are simply
    /// skipped; the sets involved are small (chat partners).
    pub async fn profiles(&self, ids: &[String]) -> Result<Vec<UserSummary>, ServiceError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(profile) = self.profile(id).await? {
                out.push(profile);
            }
        }
        Ok(out)
    }

    pub async fn create_user(&self, username: &str) -> Result<UserSummary, ServiceError> {
        let user = UserSummary {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
        };
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.db.pool)
            .await?;
        Ok(user)
    }
}
