use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with an existing token value. Recovered by the
    /// issuer (regenerate and retry), never shown to a user.
    #[error("token value already exists")]
    DuplicateToken,

    /// No row for the presented token.
    #[error("token not found")]
    NotFound,

    /// The token was already redeemed; replay or race loser.
    #[error("token already used")]
    AlreadyUsed,

    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
