use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::common::types::Message;
use crate::server::database::Database;
use crate::server::error::ServiceError;

/// Input for a message about to be persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

/// Durable message store: create, point/range reads, deletes. There is no
/// update — messages are immutable once written.
#[derive(Debug, Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a new message. A message with neither text nor attachment is
    /// rejected here as well, so no caller can slip an empty row past the
    /// service layer.
    pub async fn create(&self, new: NewMessage) -> Result<Message, ServiceError> {
        let text = new.text.filter(|t| !t.is_empty());
        let image_url = new.image_url.filter(|u| !u.is_empty());
        if text.is_none() && image_url.is_none() {
            return Err(ServiceError::EmptyContent);
        }

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text,
            image_url,
            sent_at: chrono::Utc::now().timestamp_millis(),
        };
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, sent_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(message.text.as_deref())
        .bind(message.image_url.as_deref())
        .bind(message.sent_at)
        .execute(&self.db.pool)
        .await?;
        Ok(message)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Message>, ServiceError> {
        let row = sqlx::query(
            "SELECT id, sender_id, receiver_id, text, image_url, sent_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(row.map(row_to_message))
    }

    /// Full history between two users, both directions, in creation order.
    /// The rowid tiebreak keeps same-millisecond messages in insertion order.
    pub async fn find_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, ServiceError> {
        let rows = sqlx::query(
            "SELECT id, sender_id, receiver_id, text, image_url, sent_at FROM messages \
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
             ORDER BY sent_at ASC, rowid ASC",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    /// Remove the whole history between two users, both directions. Returns
    /// how many rows went away.
    pub async fn delete_all_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "DELETE FROM messages \
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .execute(&self.db.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Distinct counterparts across every message the user took part in.
    pub async fn partner_ids(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
        let rows = sqlx::query(
            "SELECT DISTINCT CASE WHEN sender_id = ? THEN receiver_id ELSE sender_id END AS partner \
             FROM messages WHERE sender_id = ? OR receiver_id = ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("partner")).collect())
    }

    pub async fn count(&self) -> Result<i64, ServiceError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.db.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_message(row: SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        text: row.get("text"),
        image_url: row.get("image_url"),
        sent_at: row.get("sent_at"),
    }
}
