use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, Form, Query, State},
    response::Html,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use rolegate_core::{Completion, GrantError, Inspection, RedemptionService, RejectReason};
use rolegate_discord::RoleGrantClient;

#[derive(Clone)]
pub struct AppState {
    pub redemption: Arc<RedemptionService<RoleGrantClient>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/verify", get(verify_page))
        .route("/complete", post(complete))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteForm {
    #[serde(default)]
    token: String,
}

// ── Handlers ────────────────────────────────────────────────────────────

async fn home() -> Html<&'static str> {
    Html("<h1>Verification server is running</h1>")
}

/// First step of the flow: read-only lookup, renders the confirmation
/// form. Safe to reload.
async fn verify_page(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Html<String> {
    match state.redemption.inspect(&params.token) {
        Ok(Inspection::Valid { .. }) => Html(confirm_page(&params.token)),
        Ok(Inspection::Invalid(reason)) => Html(error_page(reject_text(reason))),
        Err(e) => {
            warn!("Token lookup failed: {}", e);
            Html(error_page("Something went wrong, try again later."))
        }
    }
}

/// Second step: consume the token and trigger the role grant. The peer
/// address is recorded on the redemption row.
async fn complete(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<CompleteForm>,
) -> Html<String> {
    let source = addr.ip().to_string();

    match state.redemption.complete(&form.token, &source).await {
        Ok(Completion::Granted) => Html(SUCCESS_PAGE.to_string()),
        Ok(Completion::Invalid(reason)) => Html(error_page(reject_text(reason))),
        Ok(Completion::Failed(e)) => Html(error_page(&grant_text(&e))),
        Err(e) => {
            warn!("Redemption failed: {}", e);
            Html(error_page("Something went wrong, try again later."))
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

const SUCCESS_PAGE: &str = "<h2>Verification complete. You can close this page.</h2>";

/// The hidden token is the only state the flow carries; it is echoed only
/// after a successful lookup, so its value always equals a stored token.
fn confirm_page(token: &str) -> String {
    format!(
        "<h2>Account verification</h2>\n\
         <form action=\"/complete\" method=\"post\">\n\
           <input type=\"hidden\" name=\"token\" value=\"{token}\">\n\
           <button type=\"submit\">Confirm verification</button>\n\
         </form>"
    )
}

fn error_page(reason: &str) -> String {
    format!("<h3>Verification failed: {reason}</h3>")
}

fn reject_text(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::NotFound => "this verification link is not valid.",
        RejectReason::AlreadyUsed => "this verification link was already used.",
    }
}

fn grant_text(e: &GrantError) -> String {
    match e {
        GrantError::Rejected { status } => {
            format!("role assignment was refused (HTTP {status}).")
        }
        GrantError::Unreachable(_) => {
            "role assignment service could not be reached.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_page_posts_the_token_back() {
        let page = confirm_page("tok-abc");
        assert!(page.contains("action=\"/complete\""));
        assert!(page.contains("name=\"token\" value=\"tok-abc\""));
    }

    #[test]
    fn reject_reasons_render_distinct_messages() {
        assert_ne!(
            reject_text(RejectReason::NotFound),
            reject_text(RejectReason::AlreadyUsed)
        );
    }

    #[test]
    fn grant_failure_includes_the_status() {
        let text = grant_text(&GrantError::Rejected { status: 403 });
        assert!(text.contains("403"));
    }
}
