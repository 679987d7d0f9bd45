use tracing::warn;

use crate::issuer::{IssueError, TokenIssuer};
use crate::report::{AdminReport, ReportError};

/// A link button for the platform renderer to attach to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyLink {
    pub label: String,
    pub url: String,
}

/// Platform-agnostic chat reply: message text plus an optional link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    pub link: Option<VerifyLink>,
}

impl CommandReply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: None,
        }
    }
}

/// Handlers for the two chat commands. The chat client dispatches here and
/// renders whatever comes back; all authorization for `list_verified`
/// happens inside.
pub struct ChatCommands {
    issuer: TokenIssuer,
    report: AdminReport,
    base_url: String,
}

impl ChatCommands {
    pub fn new(issuer: TokenIssuer, report: AdminReport, base_url: impl Into<String>) -> Self {
        Self {
            issuer,
            report,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `verify` — issue a token and hand the requester a redemption link.
    pub fn request_verification(&self, requester_id: &str) -> Result<CommandReply, IssueError> {
        let token = self.issuer.issue(requester_id)?;
        let url = format!("{}/verify?token={}", self.base_url, token);

        Ok(CommandReply {
            content: format!("<@{requester_id}> press the button below to verify your account."),
            link: Some(VerifyLink {
                label: "Verify".into(),
                url,
            }),
        })
    }

    /// `verified` — admin-only listing of completed redemptions. Errors
    /// are rendered into the reply; the command never fails the caller.
    pub fn list_verified(&self, caller_id: &str) -> CommandReply {
        match self.report.report(caller_id) {
            Ok(rows) if rows.is_empty() => CommandReply::text("No verification records."),
            Ok(rows) => {
                let mut out = String::from("Verified members:\n");
                for row in rows {
                    out.push_str(&format!("<@{}> - {}\n", row.requester_id, row.source_addr));
                }
                CommandReply::text(out)
            }
            Err(ReportError::Unauthorized) => CommandReply::text("You are not allowed to do that."),
            Err(ReportError::Store(e)) => {
                warn!("Verified listing failed: {}", e);
                CommandReply::text("Could not read the verification list.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use rolegate_db::Database;

    use super::*;

    fn commands() -> (tempfile::TempDir, Arc<Database>, ChatCommands) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("tokens.db")).unwrap());
        let cmds = ChatCommands::new(
            TokenIssuer::new(db.clone()),
            AdminReport::new(db.clone(), "42"),
            // Trailing slash must not produce a `//verify` link.
            "https://verify.example.com/",
        );
        (dir, db, cmds)
    }

    #[test]
    fn request_verification_links_a_stored_token() {
        let (_dir, db, cmds) = commands();

        let reply = cmds.request_verification("1001").unwrap();
        assert!(reply.content.contains("<@1001>"));

        let link = reply.link.unwrap();
        let token = link
            .url
            .strip_prefix("https://verify.example.com/verify?token=")
            .expect("link should point at the verify page");

        let row = db.get_token(token).unwrap().unwrap();
        assert_eq!(row.requester_id, "1001");
        assert!(!row.used);
    }

    #[test]
    fn list_verified_formats_redemptions() {
        let (_dir, db, cmds) = commands();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();
        db.mark_used("tok-a", Utc::now(), "1.2.3.4").unwrap();

        let reply = cmds.list_verified("42");
        assert!(reply.content.contains("<@1001> - 1.2.3.4"));
        assert!(reply.link.is_none());
    }

    #[test]
    fn list_verified_empty_state() {
        let (_dir, _db, cmds) = commands();
        assert_eq!(cmds.list_verified("42").content, "No verification records.");
    }

    #[test]
    fn list_verified_denies_non_admin() {
        let (_dir, db, cmds) = commands();
        db.create_token("tok-a", "1001", Utc::now()).unwrap();
        db.mark_used("tok-a", Utc::now(), "1.2.3.4").unwrap();

        let reply = cmds.list_verified("43");
        assert_eq!(reply.content, "You are not allowed to do that.");
        assert!(!reply.content.contains("1001"));
    }
}
