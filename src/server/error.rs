use thiserror::Error;

/// Connection/handshake authentication failures. Each variant is a distinct
/// rejection reason echoed back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credential in handshake")]
    MissingCredential,
    #[error("no session token provided")]
    MissingToken,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("session does not map to a known user")]
    UnknownUser,
}

/// Failures of the external attachment store.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("attachment payload is not valid base64")]
    BadEncoding(#[from] base64::DecodeError),
    #[error("attachment storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

/// Everything a service operation can fail with. `status_code` is the
/// request-surface contract; callers never retry on their own.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("message text and attachment are both empty")]
    EmptyContent,
    #[error("cannot send a message to yourself")]
    SelfSend,
    #[error("message text exceeds {0} characters")]
    TextTooLong(usize),
    #[error("receiver not found")]
    ReceiverNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("not allowed to delete this message")]
    NotOwner,
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
    #[error("attachment upload failed: {0}")]
    Upstream(#[from] UploadError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::EmptyContent
            | ServiceError::SelfSend
            | ServiceError::TextTooLong(_)
            | ServiceError::ReceiverNotFound => 400,
            ServiceError::Unauthenticated(_) => 401,
            ServiceError::NotOwner => 403,
            ServiceError::MessageNotFound => 404,
            ServiceError::Upstream(_) | ServiceError::Database(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_contract() {
        assert_eq!(ServiceError::EmptyContent.status_code(), 400);
        assert_eq!(ServiceError::SelfSend.status_code(), 400);
        assert_eq!(ServiceError::ReceiverNotFound.status_code(), 400);
        assert_eq!(
            ServiceError::Unauthenticated(AuthError::InvalidToken).status_code(),
            401
        );
        assert_eq!(ServiceError::NotOwner.status_code(), 403);
        assert_eq!(ServiceError::MessageNotFound.status_code(), 404);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "provider down");
        assert_eq!(
            ServiceError::Upstream(UploadError::Storage(io)).status_code(),
            500
        );
    }
}
