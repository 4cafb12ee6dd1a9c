use log::{info, warn};
use sqlx::Row;

use crate::server::database::Database;
use crate::server::error::{AuthError, ServiceError};

/// Resolve a session token to its user id. Authentication failures carry the
/// precise reason so connection rejections can name what went wrong; session
/// issuance itself belongs to the external identity provider.
pub async fn validate_session(db: &Database, session_token: &str) -> Result<String, ServiceError> {
    if session_token.trim().is_empty() {
        return Err(AuthError::MissingToken.into());
    }
    let now = chrono::Utc::now().timestamp_millis();
    let row = sqlx::query("SELECT user_id FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now)
        .fetch_optional(&db.pool)
        .await?;
    let user_id: String = match row {
        Some(row) => row.get("user_id"),
        None => return Err(AuthError::InvalidToken.into()),
    };

    // A session can outlive its user; that is its own failure reason.
    let user_row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&db.pool)
        .await?;
    if user_row.is_none() {
        warn!("[AUTH] Session maps to missing user {}", user_id);
        return Err(AuthError::UnknownUser.into());
    }
    Ok(user_id)
}

/// Provisioning hook for the external session issuer (and tests): mint a
/// token for an existing user.
pub async fn issue_session(
    db: &Database,
    user_id: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let token = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO sessions (user_id, session_token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&token)
    .bind(now)
    .bind(now + ttl_secs * 1000)
    .execute(&db.pool)
    .await?;
    Ok(token)
}

/// Drop expired sessions. Idempotent, safe to run periodically.
pub async fn cleanup_expired_sessions(db: &Database) {
    let now = chrono::Utc::now().timestamp_millis();
    match sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(&db.pool)
        .await
    {
        Ok(res) => {
            if res.rows_affected() > 0 {
                info!("[AUTH] Cleaned up {} expired sessions", res.rows_affected());
            }
        }
        Err(e) => warn!("[AUTH] Failed to cleanup sessions: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::users::UserDirectory;

    async fn database() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn issued_sessions_validate() {
        let db = database().await;
        let users = UserDirectory::new(db.clone());
        let alice = users.create_user("alice").await.unwrap();
        let token = issue_session(&db, &alice.id, 3600).await.unwrap();

        let resolved = validate_session(&db, &token).await.unwrap();
        assert_eq!(resolved, alice.id);
    }

    #[tokio::test]
    async fn each_failure_has_its_own_reason() {
        let db = database().await;
        let users = UserDirectory::new(db.clone());
        let alice = users.create_user("alice").await.unwrap();

        let empty = validate_session(&db, "  ").await.unwrap_err();
        assert!(matches!(
            empty,
            ServiceError::Unauthenticated(AuthError::MissingToken)
        ));

        let unknown = validate_session(&db, "not-a-token").await.unwrap_err();
        assert!(matches!(
            unknown,
            ServiceError::Unauthenticated(AuthError::InvalidToken)
        ));

        let expired_token = issue_session(&db, &alice.id, -10).await.unwrap();
        let expired = validate_session(&db, &expired_token).await.unwrap_err();
        assert!(matches!(
            expired,
            ServiceError::Unauthenticated(AuthError::InvalidToken)
        ));

        // Session pointing at a user that was never created.
        let orphan_token = issue_session(&db, "ghost-user", 3600).await.unwrap();
        let orphan = validate_session(&db, &orphan_token).await.unwrap_err();
        assert!(matches!(
            orphan,
            ServiceError::Unauthenticated(AuthError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_rows() {
        let db = database().await;
        let users = UserDirectory::new(db.clone());
        let alice = users.create_user("alice").await.unwrap();
        let live = issue_session(&db, &alice.id, 3600).await.unwrap();
        let _dead = issue_session(&db, &alice.id, -10).await.unwrap();

        cleanup_expired_sessions(&db).await;
        assert!(validate_session(&db, &live).await.is_ok());
        let remaining = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
