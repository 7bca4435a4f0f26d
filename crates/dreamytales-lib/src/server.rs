//! HTTP API for the story engine.
//!
//! Runs on port 3001 by default. CORS-permissive so a browser front end on
//! another port can call it. Every failure is answered as
//! `{ "error": message }` with a status that says whose fault it was.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use dreamytales_core::types::{GeneratedStory, PlayerStatus, Story, StorySettings, UserProfile};

use crate::profile::ProfileStore;
use crate::studio::Studio;
use crate::{Error, Result};

#[derive(Clone)]
pub struct AppState {
    pub studio: Studio,
    pub profiles: ProfileStore,
}

/// Build the axum router over shared [`AppState`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/story", post(write_story))
        .route("/api/tts", post(synthesize))
        .route("/stories", post(create_story).get(list_stories))
        .route("/stories/{id}", get(get_story))
        .route("/stories/{id}/audio", get(story_audio))
        .route("/themes", get(themes))
        .route("/player/select/{id}", post(select))
        .route("/player/toggle", post(toggle))
        .route("/player/next", post(next))
        .route("/player/prev", post(previous))
        .route("/player/mode", post(cycle_mode))
        .route("/player/music", post(toggle_music))
        .route("/player/filter", put(set_filter))
        .route("/player/status", get(status))
        .route(
            "/profile",
            get(load_profile).put(save_profile).delete(clear_profile),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Errors ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Busy => StatusCode::CONFLICT,
            Error::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Error::Network(_) | Error::Malformed(_) | Error::Undecodable(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Config(_) | Error::PlayerGone | Error::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        error_response(status, &self)
    }
}

fn error_response(status: StatusCode, err: &Error) -> Response {
    if status.is_server_error() {
        warn!("api: {err}");
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Error for routes that write stories. A refusal from the vendor is the
/// server's problem here, so it is answered with 502 whatever status the
/// vendor used.
struct StoryError(Error);

impl From<Error> for StoryError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for StoryError {
    fn into_response(self) -> Response {
        match self.0 {
            err @ Error::Upstream { .. } => error_response(StatusCode::BAD_GATEWAY, &err),
            err => err.into_response(),
        }
    }
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(v)| v)
        .map_err(|e| Error::InvalidRequest(e.body_text()))
}

fn settings_from(value: Option<serde_json::Value>) -> Result<StorySettings> {
    let value = value.ok_or_else(|| Error::InvalidRequest("Missing settings".into()))?;
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidRequest(format!("invalid settings payload: {e}")))
}

// ─── Generation ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteStoryRequest {
    #[serde(default)]
    settings: Option<serde_json::Value>,
    #[serde(default)]
    sequel_context: Option<String>,
}

async fn write_story(
    State(state): State<AppState>,
    body: std::result::Result<Json<WriteStoryRequest>, JsonRejection>,
) -> Result<Json<GeneratedStory>, StoryError> {
    let req = json_body(body)?;
    let settings = settings_from(req.settings)?;
    let story = state
        .studio
        .write_text(&settings, req.sequel_context.as_deref())
        .await?;
    Ok(Json(story))
}

#[derive(Deserialize)]
struct TtsRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice: Option<String>,
}

async fn synthesize(
    State(state): State<AppState>,
    body: std::result::Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response> {
    let req = json_body(body)?;
    let audio = state
        .studio
        .synthesize(&req.text, req.voice.as_deref())
        .await?;
    Ok(audio_response(audio))
}

fn audio_response(audio: impl Into<axum::body::Body>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        audio.into(),
    )
        .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoryRequest {
    #[serde(default)]
    settings: Option<serde_json::Value>,
    #[serde(default)]
    sequel_of: Option<String>,
}

async fn create_story(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateStoryRequest>, JsonRejection>,
) -> Result<Json<Story>, StoryError> {
    let req = json_body(body)?;
    let settings = settings_from(req.settings)?;
    let story = state
        .studio
        .generate(settings, req.sequel_of.as_deref())
        .await?;
    Ok(Json(story))
}

// ─── Library ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StoryList {
    stories: Vec<Story>,
    filter: Option<String>,
    themes: Vec<String>,
}

async fn list_stories(State(state): State<AppState>) -> Json<StoryList> {
    let library = state.studio.player().library();
    Json(StoryList {
        stories: library.visible_stories().into_iter().cloned().collect(),
        filter: library.filter,
        themes: library.themes,
    })
}

async fn get_story(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Story>> {
    state
        .studio
        .player()
        .story(&id)
        .map(Json)
        .ok_or(Error::NotFound(id))
}

async fn story_audio(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let audio = state
        .studio
        .assets()
        .bytes(&id)
        .ok_or(Error::NotFound(id))?;
    Ok(audio_response(audio))
}

async fn themes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.studio.player().library().themes)
}

// ─── Player ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

const OK: Json<OkResponse> = Json(OkResponse { ok: true });

async fn select(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<OkResponse>> {
    let player = state.studio.player();
    if player.story(&id).is_none() {
        return Err(Error::NotFound(id));
    }
    player.select(&id)?;
    Ok(OK)
}

async fn toggle(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.studio.player().toggle()?;
    Ok(OK)
}

async fn next(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.studio.player().next()?;
    Ok(OK)
}

async fn previous(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.studio.player().previous()?;
    Ok(OK)
}

async fn cycle_mode(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.studio.player().cycle_mode()?;
    Ok(OK)
}

async fn toggle_music(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.studio.player().toggle_music()?;
    Ok(OK)
}

#[derive(Deserialize)]
struct FilterRequest {
    #[serde(default)]
    theme: Option<String>,
}

async fn set_filter(
    State(state): State<AppState>,
    body: std::result::Result<Json<FilterRequest>, JsonRejection>,
) -> Result<Json<OkResponse>> {
    let req = json_body(body)?;
    state.studio.player().set_filter(req.theme)?;
    Ok(OK)
}

async fn status(State(state): State<AppState>) -> Json<PlayerStatus> {
    Json(state.studio.player().status())
}

// ─── Profile ──────────────────────────────────────────────────────────────

async fn load_profile(State(state): State<AppState>) -> Json<Option<UserProfile>> {
    Json(state.profiles.load().await)
}

async fn save_profile(
    State(state): State<AppState>,
    body: std::result::Result<Json<UserProfile>, JsonRejection>,
) -> Result<Json<OkResponse>> {
    let profile = json_body(body)?;
    state.profiles.save(&profile).await?;
    Ok(OK)
}

async fn clear_profile(State(state): State<AppState>) -> Result<Json<OkResponse>> {
    state.profiles.clear().await?;
    Ok(OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetStore;
    use crate::player::Player;
    use crate::speech::SpeechClient;
    use crate::testing::{FakeOutput, FakeVendor, settings, wav_tone};
    use crate::writer::StoryWriter;
    use axum::body::Body;
    use axum::http::Request;
    use dreamytales_core::types::{PlayerConfig, SpeechConfig, WriterConfig};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Api {
        app: Router,
        state: AppState,
        _dir: std::path::PathBuf,
    }

    fn api(writer: WriterConfig, speech: SpeechConfig) -> Api {
        let assets = AssetStore::new();
        let player = Player::with_outputs(
            PlayerConfig {
                background_enabled: false,
                ..PlayerConfig::default()
            },
            assets.clone(),
            Box::new(FakeOutput::new()),
            Box::new(FakeOutput::new()),
        )
        .unwrap();
        let studio = Studio::new(
            StoryWriter::new(writer).unwrap(),
            SpeechClient::new(speech).unwrap(),
            assets,
            player,
        );
        let dir = std::env::temp_dir().join(format!("dreamytales-api-{}", uuid::Uuid::new_v4()));
        let state = AppState {
            studio,
            profiles: ProfileStore::new(&dir),
        };
        Api {
            app: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    fn unconfigured() -> Api {
        api(WriterConfig::default(), SpeechConfig::default())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn call_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = call(app, method, uri, body).await;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn settings_json() -> Value {
        serde_json::to_value(settings()).unwrap()
    }

    #[tokio::test]
    async fn story_without_settings_is_bad_request() {
        let api = unconfigured();
        let (status, body) = call_json(&api.app, "POST", "/api/story", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing settings");
    }

    #[tokio::test]
    async fn story_without_credentials_is_server_error() {
        let api = unconfigured();
        let (status, body) = call_json(
            &api.app,
            "POST",
            "/api/story",
            Some(json!({ "settings": settings_json() })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("AZURE_OPENAI_ENDPOINT"));
    }

    #[tokio::test]
    async fn story_text_round_trip() {
        let vendor = FakeVendor::start().await;
        vendor.set_chat_content(r#"{"title":"Stars","content":"Twinkle."}"#);
        let api = api(vendor.writer_config(), vendor.speech_config());

        let (status, body) = call_json(
            &api.app,
            "POST",
            "/api/story",
            Some(json!({ "settings": settings_json(), "sequelContext": "Before." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "title": "Stars", "content": "Twinkle." }));
    }

    #[tokio::test]
    async fn story_vendor_refusal_is_bad_gateway() {
        let vendor = FakeVendor::start().await;
        vendor.fail_chat(401, "bad key");
        let api = api(vendor.writer_config(), vendor.speech_config());

        for uri in ["/api/story", "/stories"] {
            let (status, body) = call_json(
                &api.app,
                "POST",
                uri,
                Some(json!({ "settings": settings_json() })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_GATEWAY, "{uri}");
            assert!(body["error"].as_str().unwrap().contains("bad key"), "{uri}");
        }
    }

    #[tokio::test]
    async fn story_narration_refusal_is_bad_gateway() {
        let vendor = FakeVendor::start().await;
        vendor.set_chat_content(r#"{"title":"T","content":"C"}"#);
        vendor.fail_speech(403, "forbidden");
        let api = api(vendor.writer_config(), vendor.speech_config());

        let (status, _) = call_json(
            &api.app,
            "POST",
            "/stories",
            Some(json!({ "settings": settings_json() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn story_errors_keep_their_own_status() {
        let api = unconfigured();
        let (status, _) = call_json(&api.app, "POST", "/stories", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call_json(
            &api.app,
            "POST",
            "/stories",
            Some(json!({ "settings": settings_json(), "sequelOf": "missing" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tts_vendor_status_is_passed_through() {
        let vendor = FakeVendor::start().await;
        vendor.fail_speech(429, "slow down");
        let api = api(vendor.writer_config(), vendor.speech_config());

        let (status, body) =
            call_json(&api.app, "POST", "/api/tts", Some(json!({ "text": "hello" }))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().unwrap().contains("slow down"));
    }

    #[tokio::test]
    async fn tts_returns_uncached_mpeg() {
        let vendor = FakeVendor::start().await;
        vendor.set_audio(b"ID3audio".to_vec());
        let api = api(vendor.writer_config(), vendor.speech_config());

        let req = Request::builder()
            .method("POST")
            .uri("/api/tts")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "text": "hello" }).to_string()))
            .unwrap();
        let resp = api.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ID3audio");
    }

    #[tokio::test]
    async fn tts_without_text_is_bad_request() {
        let api = unconfigured();
        let (status, body) = call_json(&api.app, "POST", "/api/tts", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing text");
    }

    #[tokio::test]
    async fn generated_story_is_listed_and_served() {
        let vendor = FakeVendor::start().await;
        vendor.set_chat_content(r#"{"title":"Owl","content":"Hoot."}"#);
        vendor.set_audio(wav_tone(0.5));
        let api = api(vendor.writer_config(), vendor.speech_config());

        let (status, story) = call_json(
            &api.app,
            "POST",
            "/stories",
            Some(json!({ "settings": settings_json() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = story["id"].as_str().unwrap().to_string();

        // Every lookup works straight after the create call answers.
        let (status, _) = call(&api.app, "POST", &format!("/player/select/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = call_json(&api.app, "GET", "/stories", None).await;
        assert_eq!(list["stories"][0]["id"], id.as_str());
        assert_eq!(list["themes"], json!(["Bravery"]));

        let (status, one) = call_json(&api.app, "GET", &format!("/stories/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["title"], "Owl");

        let (status, audio) = call(&api.app, "GET", &format!("/stories/{id}/audio"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audio, wav_tone(0.5));

        let (status, sequel) = call_json(
            &api.app,
            "POST",
            "/stories",
            Some(json!({ "settings": settings_json(), "sequelOf": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sequel["sequelTo"], id.as_str());
    }

    #[tokio::test]
    async fn unknown_story_is_not_found() {
        let api = unconfigured();
        let (status, _) = call(&api.app, "GET", "/stories/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.app, "GET", "/stories/missing/audio", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&api.app, "POST", "/player/select/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn player_controls_answer_ok() {
        let api = unconfigured();
        for uri in [
            "/player/toggle",
            "/player/next",
            "/player/prev",
            "/player/mode",
            "/player/music",
        ] {
            let (status, body) = call_json(&api.app, "POST", uri, None).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, json!({ "ok": true }));
        }

        let (status, _) = call(
            &api.app,
            "PUT",
            "/player/filter",
            Some(json!({ "theme": "Bravery" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut rx = api.state.studio.player().subscribe_status();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.filter.as_deref() == Some("Bravery")),
        )
        .await
        .unwrap()
        .unwrap();

        let (status, body) = call_json(&api.app, "GET", "/player/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"], "Bravery");
        assert_eq!(body["mode"], "LoopOne");
        assert_eq!(body["backgroundMusic"], true);
        assert_eq!(body["playing"], false);
    }

    #[tokio::test]
    async fn profile_slot_lifecycle() {
        let api = unconfigured();
        let (_, empty) = call_json(&api.app, "GET", "/profile", None).await;
        assert_eq!(empty, Value::Null);

        let profile = json!({ "name": "Mia", "age": 5, "gender": "Girl" });
        let (status, _) = call(&api.app, "PUT", "/profile", Some(profile.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, saved) = call_json(&api.app, "GET", "/profile", None).await;
        assert_eq!(saved, profile);

        let (status, _) = call(&api.app, "DELETE", "/profile", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, cleared) = call_json(&api.app, "GET", "/profile", None).await;
        assert_eq!(cleared, Value::Null);

        let (status, body) = call_json(
            &api.app,
            "PUT",
            "/profile",
            Some(json!({ "name": " ", "age": 5, "gender": "Boy" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        std::fs::remove_dir_all(&api._dir).ok();
    }
}
