use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, header};
use serde_json::json;

use rolegate_core::commands::VerifyLink;
use rolegate_core::grant::{GrantError, RoleGranter};

const API_BASE: &str = "https://discord.com/api/v10";

/// Upper bound on any REST round trip so a hung grant call still turns
/// into a definite failure for the web caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimal Discord REST client: the two calls the verifier needs.
pub struct DiscordRest {
    http: reqwest::Client,
    bot_token: String,
}

impl DiscordRest {
    pub fn new(bot_token: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.into(),
        })
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// PUT /guilds/{guild}/members/{user}/roles/{role}. Discord answers
    /// 204 No Content on success; anything else is a rejection.
    pub async fn add_guild_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), GrantError> {
        let url = format!("{API_BASE}/guilds/{guild_id}/members/{user_id}/roles/{role_id}");

        let resp = self
            .http
            .put(&url)
            .header(header::AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(|e| GrantError::Unreachable(e.to_string()))?;

        if resp.status() == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(GrantError::Rejected {
                status: resp.status().as_u16(),
            })
        }
    }

    /// POST /channels/{channel}/messages, optionally with a link-button
    /// component row.
    pub async fn create_message(
        &self,
        channel_id: &str,
        content: &str,
        link: Option<&VerifyLink>,
    ) -> anyhow::Result<()> {
        let mut body = json!({ "content": content });
        if let Some(link) = link {
            body["components"] = json!([{
                "type": 1,
                "components": [{
                    "type": 2,
                    "style": 5,
                    "label": link.label.as_str(),
                    "url": link.url.as_str(),
                }],
            }]);
        }

        let resp = self
            .http
            .post(format!("{API_BASE}/channels/{channel_id}/messages"))
            .header(header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("message delivery failed with HTTP {}", resp.status());
        }
        Ok(())
    }
}

/// Production `RoleGranter`: assigns the configured guild role to the
/// redeeming member.
pub struct RoleGrantClient {
    rest: Arc<DiscordRest>,
    guild_id: String,
    role_id: String,
}

impl RoleGrantClient {
    pub fn new(
        rest: Arc<DiscordRest>,
        guild_id: impl Into<String>,
        role_id: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            guild_id: guild_id.into(),
            role_id: role_id.into(),
        }
    }
}

impl RoleGranter for RoleGrantClient {
    async fn grant_role(&self, requester_id: &str) -> Result<(), GrantError> {
        self.rest
            .add_guild_member_role(&self.guild_id, requester_id, &self.role_id)
            .await
    }
}
