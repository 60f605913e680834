//! HTTP request handlers

use super::types::{
    ErrorResponse, OptionsResponse, RefineRequestBody, RefineResponse, SuccessResponse,
    TurnRequestBody, TurnResponse,
};
use super::AppState;
use crate::error::{ErrorKind, StoryError};
use crate::orchestrator::{SessionSummary, TurnRequest};
use crate::prompts;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Story progression
        .route("/api/turn", post(submit_turn))
        .route("/api/refine", post(submit_refinement))
        .route("/api/reset", post(reset_session))
        // Session inspection
        .route("/api/session", get(get_session))
        .route("/api/scene", get(get_scene))
        .route("/api/options", get(list_options))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

async fn submit_turn(
    State(state): State<AppState>,
    Json(body): Json<TurnRequestBody>,
) -> Result<Json<TurnResponse>, AppError> {
    let request = TurnRequest {
        action: body.action,
        theme: body.theme,
        style: body.style,
    };
    let outcome = state.orchestrator.submit_turn(request).await?;
    Ok(Json(TurnResponse::from(outcome)))
}

async fn submit_refinement(
    State(state): State<AppState>,
    Json(body): Json<RefineRequestBody>,
) -> Result<Json<RefineResponse>, AppError> {
    let outcome = state
        .orchestrator
        .submit_refinement(&body.instruction)
        .await?;
    Ok(Json(RefineResponse::from(outcome)))
}

async fn reset_session(State(state): State<AppState>) -> Result<Json<SuccessResponse>, AppError> {
    state.orchestrator.reset()?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_session(State(state): State<AppState>) -> Json<SessionSummary> {
    Json(state.orchestrator.summary())
}

async fn get_scene(State(state): State<AppState>) -> Result<Response, AppError> {
    let (data, mime_type) = state
        .orchestrator
        .scene()
        .ok_or_else(|| AppError::NotFound("No scene has been generated yet".to_string()))?;
    Ok(([(header::CONTENT_TYPE, mime_type)], data.to_vec()).into_response())
}

async fn list_options() -> Json<OptionsResponse> {
    let (theme, style) = prompts::defaults();
    Json(OptionsResponse {
        themes: prompts::theme_names(),
        styles: prompts::style_names(),
        default_theme: theme.name,
        default_style: style.name,
    })
}

async fn get_version() -> &'static str {
    concat!("taleweaver ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Story(StoryError),
    NotFound(String),
}

impl From<StoryError> for AppError {
    fn from(err: StoryError) -> Self {
        AppError::Story(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::ContentBlocked => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transport | ErrorKind::MalformedResponse | ErrorKind::EmptyResult => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::TaskFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Story(err) => {
                let kind = err.kind();
                (
                    status_for(kind),
                    ErrorResponse {
                        error: err.to_string(),
                        kind: kind.as_str(),
                        categories: err.blocked_categories().map(<[String]>::to_vec),
                    },
                )
            }
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: message,
                    kind: "not_found",
                    categories: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::testing::{choices_response, image_response, text_response, tiny_png, ScriptedTransport};
    use crate::transport::TransportError;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        state: AppState,
        transport: Arc<ScriptedTransport>,
        config: AppConfig,
        _scene_dir: TempDir,
    }

    fn fixture() -> Fixture {
        let scene_dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            scene_dir: scene_dir.path().to_path_buf(),
            vision_model: "vision-test".to_string(),
            ..AppConfig::default()
        };
        let transport = Arc::new(ScriptedTransport::new());
        let state = AppState::new(&config, transport.clone());
        Fixture {
            state,
            transport,
            config,
            _scene_dir: scene_dir,
        }
    }

    fn script_first_turn(f: &Fixture) {
        f.transport
            .queue(&f.config.image_endpoint(), image_response(&tiny_png(), Some("A hush falls.")));
        f.transport
            .queue(&f.config.vision_endpoint(), text_response("A quiet harbor at dawn."));
        f.transport.queue(
            &f.config.text_endpoint(),
            choices_response(&["Board the ship", "Ask the harbormaster", "Wait"]),
        );
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn turn_body(action: &str) -> Json<TurnRequestBody> {
        Json(TurnRequestBody {
            action: action.to_string(),
            theme: Some("fantasy".to_string()),
            style: None,
        })
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Busy), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::ContentBlocked),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        for kind in [
            ErrorKind::Transport,
            ErrorKind::MalformedResponse,
            ErrorKind::EmptyResult,
        ] {
            assert_eq!(status_for(kind), StatusCode::BAD_GATEWAY);
        }
        assert_eq!(
            status_for(ErrorKind::TaskFailed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_blocked_error_body_lists_categories() {
        let err = AppError::from(StoryError::ContentBlocked {
            categories: vec!["HARM_CATEGORY_HARASSMENT".to_string()],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "content_blocked");
        assert_eq!(body["categories"][0], "HARM_CATEGORY_HARASSMENT");
    }

    #[tokio::test]
    async fn test_transport_error_body_omits_categories() {
        let err = AppError::from(StoryError::from(
            TransportError::status(503, "unavailable").with_attempts(3),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "transport");
        assert!(body.get("categories").is_none());
        assert!(body["error"].as_str().unwrap().contains("3 attempt"));
    }

    #[tokio::test]
    async fn test_turn_then_scene_and_session() {
        let f = fixture();
        script_first_turn(&f);

        let Json(response) = submit_turn(State(f.state.clone()), turn_body("set sail"))
            .await
            .unwrap();
        assert_eq!(response.turn, 1);
        assert_eq!(response.image.mime_type, "image/png");
        assert_eq!(response.byproduct_text.as_deref(), Some("A hush falls."));
        assert!(response.timings_ms.grounding.is_some());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["choices"].as_array().unwrap().len(), 3);

        let scene = get_scene(State(f.state.clone())).await.unwrap();
        assert_eq!(scene.status(), StatusCode::OK);
        assert_eq!(scene.headers()[header::CONTENT_TYPE], "image/png");

        let Json(summary) = get_session(State(f.state.clone())).await;
        assert!(summary.turn_started);
        assert_eq!(summary.image_thread_len, 2);
        assert_eq!(summary.narrative_thread_len, 3);
        assert!(summary.scene_path.is_some());
    }

    #[tokio::test]
    async fn test_scene_is_not_found_before_first_turn() {
        let f = fixture();
        let response = get_scene(State(f.state)).await.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_action_is_bad_request() {
        let f = fixture();
        let response = submit_turn(State(f.state), turn_body("  "))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_reset_after_turn() {
        let f = fixture();
        script_first_turn(&f);
        submit_turn(State(f.state.clone()), turn_body("set sail"))
            .await
            .unwrap();

        let Json(reset) = reset_session(State(f.state.clone())).await.unwrap();
        assert!(reset.success);
        let Json(summary) = get_session(State(f.state)).await;
        assert!(!summary.turn_started);
        assert_eq!(summary.image_thread_len, 0);
        assert!(summary.choices.is_none());
    }

    #[tokio::test]
    async fn test_options_lists_every_theme_and_style() {
        let Json(options) = list_options().await;
        assert!(options.themes.contains(&"noir"));
        assert!(options.styles.contains(&"pixel-art"));
        assert_eq!(options.themes[0], options.default_theme);
        assert_eq!(options.styles[0], options.default_style);
    }
}
