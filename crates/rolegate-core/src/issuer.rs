use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, warn};

use rolegate_db::{Database, StoreError};

/// 24 bytes of OS randomness per token (192 bits), base64url encoded.
const TOKEN_BYTES: usize = 24;

/// Collisions are astronomically unlikely at this entropy; the bound only
/// keeps a misbehaving store from spinning the issuer forever.
const MAX_ATTEMPTS: usize = 4;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("could not place a unique token after {0} attempts")]
    Exhausted(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates tokens bound to a requester identity. Any identity is
/// accepted; scoping who may ask is the chat platform's concern.
pub struct TokenIssuer {
    db: Arc<Database>,
}

impl TokenIssuer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a fresh single-use token for `requester_id`. A store-level
    /// duplicate is recovered by regenerating, never surfaced.
    pub fn issue(&self, requester_id: &str) -> Result<String, IssueError> {
        self.issue_with(requester_id, generate_token)
    }

    fn issue_with(
        &self,
        requester_id: &str,
        mut generate: impl FnMut() -> String,
    ) -> Result<String, IssueError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let token = generate();
            match self.db.create_token(&token, requester_id, Utc::now()) {
                Ok(()) => {
                    debug!("Issued verification token for {}", requester_id);
                    return Ok(token);
                }
                Err(StoreError::DuplicateToken) => {
                    warn!("Token collision on attempt {}, regenerating", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(IssueError::Exhausted(MAX_ATTEMPTS))
    }
}

/// Draw a token from the OS RNG. base64url without padding keeps it safe
/// to embed in a query string.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
