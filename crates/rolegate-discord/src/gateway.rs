use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use rolegate_core::commands::{ChatCommands, CommandReply};

use crate::rest::DiscordRest;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILD_MESSAGES | MESSAGE_CONTENT — just enough to see prefix commands.
const INTENTS: u64 = (1 << 9) | (1 << 15);

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Chat-side front end: a single gateway session that listens for prefix
/// commands and replies over REST. All verification logic lives in
/// `ChatCommands`; this type only moves messages.
pub struct Bot {
    rest: Arc<DiscordRest>,
    commands: Arc<ChatCommands>,
    bot_token: String,
    prefix: String,
}

impl Bot {
    pub fn new(
        rest: Arc<DiscordRest>,
        commands: Arc<ChatCommands>,
        bot_token: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            commands,
            bot_token: bot_token.into(),
            prefix: prefix.into(),
        }
    }

    /// Run gateway sessions forever, reconnecting after any failure. A
    /// dead chat connection must never take the web surface down with it.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.session().await {
                warn!("Gateway session ended: {}", e);
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
            info!("Reconnecting to gateway");
        }
    }

    async fn session(&self) -> anyhow::Result<()> {
        let (stream, _) = connect_async(GATEWAY_URL).await?;
        let (mut tx, mut rx) = stream.split();

        let heartbeat_ms = await_hello(&mut rx).await?;
        debug!("Gateway hello, heartbeat every {}ms", heartbeat_ms);

        tx.send(Message::Text(
            identify(&self.bot_token).to_string().into(),
        ))
        .await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_ms));
        heartbeat.tick().await;
        let mut last_seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    send_heartbeat(&mut tx, last_seq).await?;
                }
                msg = rx.next() => {
                    let msg = match msg {
                        Some(m) => m?,
                        None => anyhow::bail!("gateway closed the connection"),
                    };

                    match msg {
                        Message::Text(text) => {
                            let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                                Ok(p) => p,
                                Err(e) => {
                                    debug!("Skipping unparseable gateway frame: {}", e);
                                    continue;
                                }
                            };

                            if let Some(s) = payload.s {
                                last_seq = Some(s);
                            }

                            match payload.op {
                                OP_DISPATCH => self.handle_dispatch(payload).await,
                                OP_HEARTBEAT => send_heartbeat(&mut tx, last_seq).await?,
                                OP_HEARTBEAT_ACK => {}
                                other => debug!("Ignoring gateway op {}", other),
                            }
                        }
                        Message::Ping(data) => tx.send(Message::Pong(data)).await?,
                        Message::Close(frame) => anyhow::bail!("gateway sent close: {:?}", frame),
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_dispatch(&self, payload: GatewayPayload) {
        match payload.t.as_deref() {
            Some("READY") => {
                let who = payload.d["user"]["username"].as_str().unwrap_or("?");
                info!("Gateway ready as {}", who);
            }
            Some("MESSAGE_CREATE") => {
                match serde_json::from_value::<MessageCreate>(payload.d) {
                    Ok(msg) => self.handle_message(msg).await,
                    Err(e) => debug!("Skipping malformed MESSAGE_CREATE: {}", e),
                }
            }
            _ => {}
        }
    }

    async fn handle_message(&self, msg: MessageCreate) {
        if msg.author.bot {
            return;
        }
        let Some(command) = parse_command(&self.prefix, &msg.content) else {
            return;
        };

        let reply = match command {
            Command::RequestVerification => {
                match self.commands.request_verification(&msg.author.id) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("Token issuance for {} failed: {}", msg.author.id, e);
                        CommandReply {
                            content: "Something went wrong, try again in a moment.".into(),
                            link: None,
                        }
                    }
                }
            }
            Command::ListVerified => self.commands.list_verified(&msg.author.id),
        };

        if let Err(e) = self
            .rest
            .create_message(&msg.channel_id, &reply.content, reply.link.as_ref())
            .await
        {
            warn!("Reply delivery to channel {} failed: {}", msg.channel_id, e);
        }
    }
}

async fn await_hello(rx: &mut SplitStream<WsStream>) -> anyhow::Result<u64> {
    while let Some(msg) = rx.next().await {
        if let Message::Text(text) = msg? {
            let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
            if payload.op == OP_HELLO {
                return Ok(payload.d["heartbeat_interval"].as_u64().unwrap_or(41_250));
            }
        }
    }
    anyhow::bail!("gateway closed before Hello")
}

async fn send_heartbeat(
    tx: &mut SplitSink<WsStream, Message>,
    last_seq: Option<u64>,
) -> anyhow::Result<()> {
    let beat = json!({ "op": OP_HEARTBEAT, "d": last_seq });
    tx.send(Message::Text(beat.to_string().into())).await?;
    Ok(())
}

fn identify(bot_token: &str) -> Value {
    json!({
        "op": 2,
        "d": {
            "token": bot_token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "rolegate",
                "device": "rolegate",
            },
        },
    })
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    #[serde(default)]
    content: String,
    channel_id: String,
    author: Author,
}

#[derive(Debug, Deserialize)]
struct Author {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    RequestVerification,
    ListVerified,
}

fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.strip_prefix(prefix)?;
    match rest.split_whitespace().next()? {
        "verify" => Some(Command::RequestVerification),
        "verified" => Some(Command::ListVerified),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_commands() {
        assert_eq!(
            parse_command(";", ";verify"),
            Some(Command::RequestVerification)
        );
        assert_eq!(parse_command(";", ";verified"), Some(Command::ListVerified));
        assert_eq!(
            parse_command(";", ";verify please"),
            Some(Command::RequestVerification)
        );
    }

    #[test]
    fn ignores_other_messages() {
        assert_eq!(parse_command(";", "verify"), None);
        assert_eq!(parse_command(";", ";unknown"), None);
        assert_eq!(parse_command(";", ""), None);
        assert_eq!(parse_command(";", ";"), None);
    }

    #[test]
    fn prefix_is_configurable() {
        assert_eq!(
            parse_command("!", "!verify"),
            Some(Command::RequestVerification)
        );
        assert_eq!(parse_command("!", ";verify"), None);
    }
}
