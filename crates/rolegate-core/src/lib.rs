pub mod commands;
pub mod grant;
pub mod issuer;
pub mod redemption;
pub mod report;

pub use commands::{ChatCommands, CommandReply, VerifyLink};
pub use grant::{GrantError, RoleGranter};
pub use issuer::{IssueError, TokenIssuer};
pub use redemption::{Completion, Inspection, RedemptionService, RejectReason};
pub use report::{AdminReport, ReportError};
