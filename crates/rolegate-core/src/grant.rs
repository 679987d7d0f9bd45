use std::future::Future;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    /// The privilege API answered with a non-success status. The token is
    /// already consumed at this point and no automatic retry happens.
    #[error("role grant rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The privilege API could not be reached (connect error or timeout).
    #[error("role grant endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Seam to the external privilege-granting call. The production
/// implementation assigns a guild role through the chat platform's REST
/// API; tests substitute a mock.
pub trait RoleGranter: Send + Sync {
    fn grant_role(
        &self,
        requester_id: &str,
    ) -> impl Future<Output = Result<(), GrantError>> + Send;
}
