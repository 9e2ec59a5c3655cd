use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header::HOST, HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use pollbot_core::config::AppConfig;
use pollbot_core::localization::{tr, Text};
use pollbot_core::{Poll, PollError, VoteOutcome};
use pollbot_db::{DbPool, SqlPollStore};
use pollbot_mattermost::attachments::{
    ephemeral, format_help, format_poll, vote_updated_text, ActionResponse, EphemeralResponse,
    PollResponse, PollView,
};
use pollbot_mattermost::commands::{ActionPayload, SlashCommandForm};
use pollbot_mattermost::{is_help_request, parse_poll_command, UserDirectory};
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

const DEFAULT_COMMAND: &str = "/poll";

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<AppConfig>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    fn store(&self) -> SqlPollStore {
        SqlPollStore::new(self.db_pool.clone())
    }
}

/// Reply to a slash command: either the poll itself or a private notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    Poll(PollResponse),
    Ephemeral(EphemeralResponse),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookError {
    pub error: String,
}

type HandlerError = (StatusCode, Json<WebhookError>);

pub fn router(state: AppState) -> Router {
    let images = ServeDir::new(&state.config.server.static_dir);
    Router::new()
        .route("/", get(status).post(create_poll))
        .route("/vote", post(vote))
        .route("/end", post(end_poll))
        .nest_service("/img", images)
        .with_state(state)
}

pub async fn status() -> &'static str {
    "Poll server is running. Use the slash command to create a poll."
}

pub async fn create_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<SlashCommandForm>, FormRejection>,
) -> Result<Json<CommandReply>, HandlerError> {
    let Form(form) =
        form.map_err(|rejection| failure(StatusCode::BAD_REQUEST, rejection.body_text()))?;

    if !state.config.mattermost.accepts_token(form.token.as_deref()) {
        warn!(event_name = "webhook.command.invalid_token", "slash command token rejected");
        let text = tr(&state.config.poll.locale, Text::InvalidToken);
        return Ok(Json(CommandReply::Ephemeral(ephemeral(text))));
    }

    let (Some(user_id), Some(text)) = (form.user_id, form.text) else {
        return Err(failure(StatusCode::BAD_REQUEST, "`user_id` and `text` are required"));
    };

    let user_locale = state.directory.user_locale(&user_id).await;
    if is_help_request(&text) {
        let command = form.command.as_deref().unwrap_or(DEFAULT_COMMAND);
        return Ok(Json(CommandReply::Ephemeral(format_help(command, &user_locale))));
    }

    let arguments = parse_poll_command(&text, &state.config.poll);
    if arguments.message.is_empty() {
        let text = tr(&user_locale, Text::MissingMessage);
        return Ok(Json(CommandReply::Ephemeral(ephemeral(text))));
    }

    let locale = arguments.locale.clone().unwrap_or(user_locale);
    let poll = Poll::create(state.store(), arguments.into_new_poll(&user_id, locale))
        .await
        .map_err(storage_failure)?;
    info!(
        event_name = "webhook.poll.created",
        poll_id = %poll.id(),
        creator_id = %user_id,
        options = poll.vote_options().len(),
        "poll created"
    );

    let view = PollView::collect(&poll, state.directory.as_ref()).await.map_err(storage_failure)?;
    Ok(Json(CommandReply::Poll(format_poll(&view, &base_url(&state.config, &headers)))))
}

pub async fn vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ActionPayload>,
) -> Result<Json<ActionResponse>, HandlerError> {
    let voter_locale = state.directory.user_locale(&payload.user_id).await;
    let poll = match load_poll(&state, &payload).await {
        Ok(poll) => poll,
        Err(error) if error.is_invalid_poll() => {
            warn!(event_name = "webhook.vote.invalid_poll", error = %error, "vote on invalid poll");
            return Ok(Json(ActionResponse::ephemeral(tr(&voter_locale, Text::InvalidPoll))));
        }
        Err(error) => return Err(storage_failure(error)),
    };

    let Some(vote_id) = payload.context.vote else {
        return Ok(Json(ActionResponse::ephemeral(tr(&voter_locale, Text::InvalidVote))));
    };

    let outcome = poll.vote(&payload.user_id, vote_id).await.map_err(storage_failure)?;
    info!(
        event_name = "webhook.poll.vote",
        poll_id = %poll.id(),
        user_id = %payload.user_id,
        vote_id,
        outcome = ?outcome,
        "vote processed"
    );

    match outcome {
        VoteOutcome::CapacityExceeded { .. } => {
            Ok(Json(ActionResponse::ephemeral(tr(&voter_locale, Text::NoVotesLeft))))
        }
        VoteOutcome::InvalidIndex { .. } => {
            Ok(Json(ActionResponse::ephemeral(tr(&voter_locale, Text::InvalidVote))))
        }
        _ => {
            let held = poll.votes_of(&payload.user_id).await.map_err(storage_failure)?;
            let view =
                PollView::collect(&poll, state.directory.as_ref()).await.map_err(storage_failure)?;
            let update = format_poll(&view, &base_url(&state.config, &headers));
            let summary = vote_updated_text(&voter_locale, poll.vote_options(), &held);
            Ok(Json(ActionResponse::update(update).with_ephemeral(summary)))
        }
    }
}

pub async fn end_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ActionPayload>,
) -> Result<Json<ActionResponse>, HandlerError> {
    let poll = match load_poll(&state, &payload).await {
        Ok(poll) => poll,
        Err(error) if error.is_invalid_poll() => {
            warn!(event_name = "webhook.end.invalid_poll", error = %error, "end of invalid poll");
            let locale = state.directory.user_locale(&payload.user_id).await;
            return Ok(Json(ActionResponse::ephemeral(tr(&locale, Text::InvalidPoll))));
        }
        Err(error) => return Err(storage_failure(error)),
    };

    if !may_end(&state, &payload, &poll).await {
        info!(
            event_name = "webhook.end.refused",
            poll_id = %poll.id(),
            user_id = %payload.user_id,
            "user may not end poll"
        );
        let locale = state.directory.user_locale(&payload.user_id).await;
        return Ok(Json(ActionResponse::ephemeral(tr(&locale, Text::NotAllowedToEnd))));
    }

    poll.end().await.map_err(storage_failure)?;
    info!(
        event_name = "webhook.poll.ended",
        poll_id = %poll.id(),
        user_id = %payload.user_id,
        "poll ended"
    );

    let view = PollView::collect(&poll, state.directory.as_ref()).await.map_err(storage_failure)?;
    Ok(Json(ActionResponse::update(format_poll(&view, &base_url(&state.config, &headers)))))
}

async fn load_poll(
    state: &AppState,
    payload: &ActionPayload,
) -> Result<Poll<SqlPollStore>, PollError> {
    let poll_id = payload
        .context
        .poll_id
        .poll_id()
        .ok_or_else(|| PollError::invalid(None, "poll id is not numeric"))?;
    Poll::load(state.store(), poll_id).await
}

/// The creator, system admins and admins of the team the poll was posted in.
async fn may_end(state: &AppState, payload: &ActionPayload, poll: &Poll<SqlPollStore>) -> bool {
    if payload.user_id == poll.creator_id() {
        return true;
    }
    if state.directory.is_admin_user(&payload.user_id).await {
        return true;
    }
    match payload.team_id.as_deref() {
        Some(team_id) => state.directory.is_team_admin(&payload.user_id, team_id).await,
        None => false,
    }
}

/// Where Mattermost should send button presses, without a trailing slash.
fn base_url(config: &AppConfig, headers: &HeaderMap) -> String {
    if let Some(public_url) = &config.server.public_url {
        return public_url.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    match headers.get(HOST).and_then(|value| value.to_str().ok()) {
        Some(host) => format!("{scheme}://{host}"),
        None => format!("{scheme}://localhost:{}", config.server.port),
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (status, Json(WebhookError { error: message.into() }))
}

fn storage_failure(error: PollError) -> HandlerError {
    error!(event_name = "webhook.poll.storage_failed", error = %error, "poll storage failed");
    failure(StatusCode::INTERNAL_SERVER_ERROR, "poll storage is unavailable")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::State,
        http::{header::HOST, HeaderMap, HeaderValue, Request, StatusCode},
        Form, Json,
    };
    use pollbot_core::config::AppConfig;
    use pollbot_core::localization::{tr, Text};
    use pollbot_db::{connect_with_settings, run_pending};
    use pollbot_mattermost::attachments::{ActionResponse, PollResponse};
    use pollbot_mattermost::commands::{ActionPayload, SlashCommandForm};
    use pollbot_mattermost::UserDirectory;
    use secrecy::SecretString;
    use serde_json::json;
    use tower::ServiceExt;

    use super::{create_poll, end_poll, router, vote, AppState, CommandReply};

    #[derive(Default)]
    struct StubDirectory {
        locales: HashMap<String, String>,
        admins: Vec<String>,
        team_admins: Vec<(String, String)>,
    }

    #[async_trait]
    impl UserDirectory for StubDirectory {
        async fn user_locale(&self, user_id: &str) -> String {
            self.locales.get(user_id).cloned().unwrap_or_else(|| "en".to_string())
        }

        async fn is_admin_user(&self, user_id: &str) -> bool {
            self.admins.iter().any(|admin| admin == user_id)
        }

        async fn is_team_admin(&self, user_id: &str, team_id: &str) -> bool {
            self.team_admins.iter().any(|(user, team)| user == user_id && team == team_id)
        }

        async fn resolve_usernames(&self, user_ids: &[String]) -> Vec<String> {
            user_ids.iter().map(|user_id| format!("@{user_id}")).collect()
        }
    }

    async fn state_with(config: AppConfig, directory: StubDirectory) -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        AppState { db_pool: pool, config: Arc::new(config), directory: Arc::new(directory) }
    }

    async fn state() -> AppState {
        state_with(AppConfig::default(), StubDirectory::default()).await
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("bot.example:5005"));
        headers
    }

    fn command(user_id: &str, text: &str) -> SlashCommandForm {
        SlashCommandForm {
            user_id: Some(user_id.to_string()),
            text: Some(text.to_string()),
            command: Some("/poll".to_string()),
            ..SlashCommandForm::default()
        }
    }

    fn action(user_id: &str, poll_id: serde_json::Value, vote: Option<i64>) -> ActionPayload {
        serde_json::from_value(json!({
            "user_id": user_id,
            "team_id": "team-1",
            "context": { "poll_id": poll_id, "vote": vote },
        }))
        .expect("action payload")
    }

    async fn created(state: &AppState, user_id: &str, text: &str) -> PollResponse {
        let reply = create_poll(State(state.clone()), headers(), Ok(Form(command(user_id, text))))
            .await
            .expect("create poll");
        match reply.0 {
            CommandReply::Poll(poll) => poll,
            other => panic!("expected a poll, got {other:?}"),
        }
    }

    fn poll_id(poll: &PollResponse) -> serde_json::Value {
        serde_json::to_value(poll.attachments[0].actions[0].integration.context.poll_id)
            .expect("poll id")
    }

    fn ephemeral_text(reply: CommandReply) -> String {
        match reply {
            CommandReply::Ephemeral(response) => response.text,
            other => panic!("expected an ephemeral reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_renders_a_running_poll_with_action_urls_from_host() {
        let state = state().await;

        let poll = created(&state, "alice", "Lunch? --Pizza --Burger").await;

        let attachment = &poll.attachments[0];
        assert_eq!(attachment.text, "Lunch?");
        let names: Vec<&str> = attachment.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Pizza (0)", "Burger (0)", "End Poll"]);
        assert_eq!(attachment.actions[0].integration.url, "http://bot.example:5005/vote");
        assert_eq!(attachment.actions[2].integration.url, "http://bot.example:5005/end");
    }

    #[tokio::test]
    async fn create_prefers_the_configured_public_url() {
        let mut config = AppConfig::default();
        config.server.public_url = Some("https://polls.example/".to_string());
        let state = state_with(config, StubDirectory::default()).await;

        let poll = created(&state, "alice", "Lunch?").await;

        assert_eq!(poll.attachments[0].actions[0].integration.url, "https://polls.example/vote");
    }

    #[tokio::test]
    async fn create_requires_user_and_text() {
        let state = state().await;
        let form = SlashCommandForm { text: Some("Lunch?".to_string()), ..Default::default() };

        let result = create_poll(State(state), headers(), Ok(Form(form))).await;

        let (status, _) = result.expect_err("missing user id should be rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_unknown_tokens_when_tokens_are_configured() {
        let mut config = AppConfig::default();
        config.mattermost.tokens = vec![SecretString::from("expected-token".to_string())];
        let state = state_with(config, StubDirectory::default()).await;
        let mut form = command("alice", "Lunch?");
        form.token = Some("other-token".to_string());

        let reply = create_poll(State(state.clone()), headers(), Ok(Form(form.clone())))
            .await
            .expect("reply");
        assert_eq!(ephemeral_text(reply.0), tr("en", Text::InvalidToken));

        form.token = Some("expected-token".to_string());
        let reply = create_poll(State(state), headers(), Ok(Form(form))).await.expect("reply");
        assert!(matches!(reply.0, CommandReply::Poll(_)));
    }

    #[tokio::test]
    async fn help_and_missing_message_answer_privately() {
        let state = state().await;

        let help = create_poll(State(state.clone()), headers(), Ok(Form(command("alice", "help"))))
            .await
            .expect("help");
        assert!(ephemeral_text(help.0).contains("/poll <Message>"));

        let empty =
            create_poll(State(state), headers(), Ok(Form(command("alice", "--Pizza --Burger"))))
                .await
                .expect("empty message");
        assert_eq!(ephemeral_text(empty.0), "Please provide a message");
    }

    #[tokio::test]
    async fn poll_locale_comes_from_the_flag_or_the_creator() {
        let directory = StubDirectory {
            locales: HashMap::from([("hans".to_string(), "de".to_string())]),
            ..StubDirectory::default()
        };
        let state = state_with(AppConfig::default(), directory).await;

        let german = created(&state, "hans", "Mittag?").await;
        let names: Vec<&str> =
            german.attachments[0].actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Ja (0)", "Nein (0)", "Umfrage beenden"]);

        let english = created(&state, "hans", "Lunch? --locale=en").await;
        assert_eq!(english.attachments[0].actions[0].name, "Yes (0)");
    }

    #[tokio::test]
    async fn vote_updates_the_post_and_summarises_the_selection() {
        let state = state().await;
        let poll = created(&state, "alice", "Lunch? --Pizza --Burger").await;

        let response = vote(State(state), headers(), Json(action("bob", poll_id(&poll), Some(1))))
            .await
            .expect("vote");

        let ActionResponse { update, ephemeral_text } = response.0;
        let props = update.expect("post update").props;
        assert_eq!(props.attachments[0].actions[1].name, "Burger (1)");
        assert_eq!(props.attachments[0].fields[0].value, "*Number of voters: 1*");
        assert_eq!(
            ephemeral_text.as_deref(),
            Some("Your vote has been updated:\nPizza ✗, Burger ✓")
        );
    }

    #[tokio::test]
    async fn vote_beyond_capacity_is_refused() {
        let state = state().await;
        let poll = created(&state, "alice", "Toppings --Cheese --Ham --Olives --votes=2").await;
        let id = poll_id(&poll);

        for vote_id in [0, 1] {
            vote(State(state.clone()), headers(), Json(action("bob", id.clone(), Some(vote_id))))
                .await
                .expect("vote");
        }
        let response = vote(State(state), headers(), Json(action("bob", id, Some(2))))
            .await
            .expect("vote");

        assert_eq!(response.0, ActionResponse::ephemeral(tr("en", Text::NoVotesLeft)));
    }

    #[tokio::test]
    async fn vote_on_unknown_or_malformed_poll_is_reported() {
        let state = state().await;

        let unknown =
            vote(State(state.clone()), headers(), Json(action("bob", json!(404), Some(0))))
                .await
                .expect("vote");
        assert_eq!(unknown.0, ActionResponse::ephemeral(tr("en", Text::InvalidPoll)));

        let malformed = vote(State(state), headers(), Json(action("bob", json!("abc"), Some(0))))
            .await
            .expect("vote");
        assert_eq!(malformed.0, ActionResponse::ephemeral(tr("en", Text::InvalidPoll)));
    }

    #[tokio::test]
    async fn vote_for_missing_option_is_reported() {
        let state = state().await;
        let poll = created(&state, "alice", "Lunch?").await;

        let response = vote(State(state), headers(), Json(action("bob", poll_id(&poll), Some(7))))
            .await
            .expect("vote");

        assert_eq!(response.0, ActionResponse::ephemeral(tr("en", Text::InvalidVote)));
    }

    #[tokio::test]
    async fn only_creator_and_admins_may_end_a_poll() {
        let directory = StubDirectory {
            admins: vec!["root".to_string()],
            team_admins: vec![("lead".to_string(), "team-1".to_string())],
            ..StubDirectory::default()
        };
        let state = state_with(AppConfig::default(), directory).await;
        let poll = created(&state, "alice", "Lunch?").await;
        let id = poll_id(&poll);

        let refused =
            end_poll(State(state.clone()), headers(), Json(action("bob", id.clone(), None)))
                .await
                .expect("end");
        assert_eq!(refused.0, ActionResponse::ephemeral(tr("en", Text::NotAllowedToEnd)));

        for user_id in ["alice", "root", "lead"] {
            let ended =
                end_poll(State(state.clone()), headers(), Json(action(user_id, id.clone(), None)))
                    .await
                    .expect("end");
            let props = ended.0.update.expect("post update").props;
            assert!(props.attachments[0].actions.is_empty(), "{user_id} should end the poll");
        }
    }

    #[tokio::test]
    async fn votes_after_the_end_leave_the_tally_untouched() {
        let state = state().await;
        let poll = created(&state, "alice", "Lunch? --public").await;
        let id = poll_id(&poll);
        vote(State(state.clone()), headers(), Json(action("bob", id.clone(), Some(0))))
            .await
            .expect("vote");
        end_poll(State(state.clone()), headers(), Json(action("alice", id.clone(), None)))
            .await
            .expect("end");

        let late = vote(State(state), headers(), Json(action("carol", id, Some(1))))
            .await
            .expect("late vote");

        let props = late.0.update.expect("post update").props;
        let fields = &props.attachments[0].fields;
        assert_eq!(fields[0].value, "*Number of voters: 1*");
        assert_eq!(fields[1].value, "1 Vote (100.0%)\n@bob");
        assert_eq!(fields[2].value, "0 Votes (0.0%)");
    }

    #[tokio::test]
    async fn router_serves_status_images_and_form_commands() {
        let images = tempfile::tempdir().expect("tempdir");
        std::fs::write(images.path().join("bar.png"), b"png").expect("write image");
        let mut config = AppConfig::default();
        config.server.static_dir = images.path().to_path_buf();
        let app = router(state_with(config, StubDirectory::default()).await);

        let status = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("status response");
        assert_eq!(status.status(), StatusCode::OK);

        let image = app
            .clone()
            .oneshot(Request::get("/img/bar.png").body(Body::empty()).expect("request"))
            .await
            .expect("image response");
        assert_eq!(image.status(), StatusCode::OK);

        let missing_text = app
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("user_id=alice&command=%2Fpoll"))
                    .expect("request"),
            )
            .await
            .expect("command response");
        assert_eq!(missing_text.status(), StatusCode::BAD_REQUEST);
    }
}
