use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use rolegate_db::{Database, StoreError};

use crate::grant::{GrantError, RoleGranter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Unknown or garbage token.
    NotFound,
    /// Replay, or the loser of a concurrent redemption race.
    AlreadyUsed,
}

/// Result of the read-only first step of the web flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Valid { requester_id: String },
    Invalid(RejectReason),
}

/// Result of the confirming second step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Granted,
    Invalid(RejectReason),
    Failed(GrantError),
}

/// Validates tokens and drives the redeem-then-grant hand-off. Correctness
/// under concurrent redemption comes entirely from the store's conditional
/// update; no lock is held across the external grant call.
pub struct RedemptionService<G> {
    db: Arc<Database>,
    granter: G,
}

impl<G: RoleGranter> RedemptionService<G> {
    pub fn new(db: Arc<Database>, granter: G) -> Self {
        Self { db, granter }
    }

    /// Pure read used to render the confirmation page. Reloading it any
    /// number of times changes nothing.
    pub fn inspect(&self, token: &str) -> Result<Inspection, StoreError> {
        match self.db.get_token(token)? {
            None => Ok(Inspection::Invalid(RejectReason::NotFound)),
            Some(row) if row.used => Ok(Inspection::Invalid(RejectReason::AlreadyUsed)),
            Some(row) => Ok(Inspection::Valid {
                requester_id: row.requester_id,
            }),
        }
    }

    /// Consume the token, then grant. The store transition comes first so
    /// the grant is attempted by at most one caller; race losers bail out
    /// with `Invalid` before any external call. A grant failure after the
    /// mark leaves the token consumed with no privilege granted and no
    /// automatic retry.
    pub async fn complete(
        &self,
        token: &str,
        source_addr: &str,
    ) -> Result<Completion, StoreError> {
        let row = match self.db.mark_used(token, Utc::now(), source_addr) {
            Ok(row) => row,
            Err(StoreError::NotFound) => {
                return Ok(Completion::Invalid(RejectReason::NotFound));
            }
            Err(StoreError::AlreadyUsed) => {
                return Ok(Completion::Invalid(RejectReason::AlreadyUsed));
            }
            Err(e) => return Err(e),
        };

        match self.granter.grant_role(&row.requester_id).await {
            Ok(()) => {
                info!(
                    "Granted role to {} (token redeemed from {})",
                    row.requester_id, source_addr
                );
                Ok(Completion::Granted)
            }
            Err(e) => {
                warn!(
                    "Role grant for {} failed after token was consumed: {}",
                    row.requester_id, e
                );
                Ok(Completion::Failed(e))
            }
        }
    }
}
