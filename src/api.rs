//! HTTP API surface for transcription, diarization, and transcript export.
//!
//! This module owns request parsing, input validation, and response
//! formatting while delegating audio decoding and inference to the engine
//! implementations behind [`Transcriber`] and [`Diarizer`].

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::audio::{decode_to_mono_16khz_f32, validate_extension};
use crate::backend::{DiarizeRequest, Diarizer, TranscribeRequest, Transcriber};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::formats::{segments_to_srt, segments_to_text, segments_to_vtt};
use crate::reconcile::{assign_speakers, AnnotatedSegment};

/// Human-readable service name returned by health endpoints.
pub const APP_NAME: &str = "whisper-diarize-server";
/// Service version string returned by health endpoints.
pub const APP_VERSION: &str = "0.1.0";

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// Active transcription engine implementation.
    pub transcriber: Arc<dyn Transcriber>,
    /// Active diarization engine implementation.
    pub diarizer: Arc<dyn Diarizer>,
}

impl AppState {
    /// Constructs shared handler state.
    pub fn new(
        cfg: AppConfig,
        transcriber: Arc<dyn Transcriber>,
        diarizer: Arc<dyn Diarizer>,
    ) -> Self {
        Self {
            cfg,
            transcriber,
            diarizer,
        }
    }
}

/// Builds the Axum router for all public endpoints.
///
/// The router carries a permissive CORS layer so browser frontends served
/// from another origin can call the API directly.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/transcribe", post(transcribe_path))
        .route("/transcribe/upload", post(transcribe_upload))
        .route("/export/txt", post(export_txt))
        .route("/export/srt", post(export_srt))
        .route("/export/vtt", post(export_vtt))
        .layer(cors)
        .with_state(state)
}

/// Root status endpoint (`GET /`).
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": APP_NAME,
        "version": APP_VERSION,
    }))
}

/// Alias status endpoint (`GET /health`).
pub async fn health() -> Json<serde_json::Value> {
    root().await
}

/// JSON body accepted by `POST /transcribe`.
#[derive(Debug, Deserialize)]
pub struct TranscribeBody {
    /// Path to an audio file readable by the server process.
    pub file_path: String,
    /// Enables speaker diarization for this request.
    #[serde(default)]
    pub enable_diarization: bool,
    /// Hugging Face token used to fetch diarization models on first use.
    #[serde(default)]
    pub hf_token: Option<String>,
}

/// Transcribes an audio file already on the server's filesystem
/// (`POST /transcribe`).
pub async fn transcribe_path(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TranscribeBody>,
) -> Result<Response, AppError> {
    match tokio::fs::metadata(&body.file_path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(AppError::not_found(format!(
                "file not found: {}",
                body.file_path
            )));
        }
    }

    let hf_token = resolve_diarization_token(&state.cfg, body.enable_diarization, body.hf_token)?;

    let bytes = tokio::fs::read(&body.file_path)
        .await
        .map_err(|err| AppError::internal(format!("failed to read {}: {err}", body.file_path)))?;
    let extension_hint = Path::new(&body.file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    run_transcription(state, bytes, extension_hint, hf_token).await
}

/// Transcribes an uploaded audio file (`POST /transcribe/upload`).
pub async fn transcribe_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let form = parse_upload_form(&mut multipart).await?;
    let hf_token = resolve_diarization_token(&state.cfg, form.enable_diarization, form.hf_token)?;

    run_transcription(state, form.bytes, form.extension, hf_token).await
}

struct UploadForm {
    extension: String,
    bytes: Vec<u8>,
    enable_diarization: bool,
    hf_token: Option<String>,
}

/// Parses and validates multipart form fields for the upload endpoint.
async fn parse_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut enable_diarization = false;
    let mut hf_token: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| AppError::bad_multipart("file field is missing filename"))?;
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::bad_multipart(format!("failed to read file bytes: {err}"))
                })?;
                file_name = Some(filename);
                file_bytes = Some(bytes.to_vec());
            }
            "enable_diarization" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| {
                        AppError::bad_multipart(format!("invalid enable_diarization field: {err}"))
                    })?
                    .trim()
                    .to_ascii_lowercase();

                if !raw.is_empty() {
                    enable_diarization = match raw.as_str() {
                        "1" | "true" | "yes" | "on" => true,
                        "0" | "false" | "no" | "off" => false,
                        _ => {
                            return Err(AppError::invalid_request(
                                format!("invalid enable_diarization={raw:?}; expected a boolean"),
                                Some("enable_diarization"),
                                Some("invalid_enable_diarization"),
                            ));
                        }
                    };
                }
            }
            "hf_token" => {
                hf_token = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| {
                            AppError::bad_multipart(format!("invalid hf_token field: {err}"))
                        })?
                        .trim()
                        .to_string(),
                )
                .filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }

    let filename = file_name.ok_or_else(|| {
        AppError::invalid_request("missing required multipart field: file", Some("file"), None)
    })?;
    let extension = validate_extension(&filename)?;
    let bytes = file_bytes
        .ok_or_else(|| AppError::invalid_request("missing file content", Some("file"), None))?;
    if bytes.is_empty() {
        return Err(AppError::invalid_request(
            "uploaded file is empty",
            Some("file"),
            Some("empty_file"),
        ));
    }

    Ok(UploadForm {
        extension,
        bytes,
        enable_diarization,
        hf_token,
    })
}

/// Resolves the Hugging Face token for a request that asked for diarization.
///
/// The request token wins over the configured `HF_TOKEN` fallback. When
/// diarization is enabled and neither is present, the request fails before
/// any audio work happens.
fn resolve_diarization_token(
    cfg: &AppConfig,
    enable_diarization: bool,
    request_token: Option<String>,
) -> Result<Option<String>, AppError> {
    if !enable_diarization {
        return Ok(None);
    }

    request_token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| cfg.hf_token.clone())
        .map(Some)
        .ok_or_else(|| {
            AppError::invalid_request(
                "diarization requires a Hugging Face token; pass hf_token or set HF_TOKEN",
                Some("hf_token"),
                Some("missing_hf_token"),
            )
        })
}

/// Decodes, transcribes, optionally diarizes, and renders the JSON response.
///
/// A transcription failure aborts the request. A diarization failure does
/// not: the finished transcript is returned with every segment labeled
/// `Unknown`.
async fn run_transcription(
    state: Arc<AppState>,
    bytes: Vec<u8>,
    extension_hint: String,
    hf_token: Option<String>,
) -> Result<Response, AppError> {
    let audio_16khz_mono_f32 =
        tokio::task::spawn_blocking(move || decode_to_mono_16khz_f32(&bytes, &extension_hint))
            .await
            .map_err(|err| AppError::internal(format!("audio decode task failed: {err}")))??;

    let diarize_audio = hf_token.is_some().then(|| audio_16khz_mono_f32.clone());

    let result = state
        .transcriber
        .transcribe(TranscribeRequest {
            audio_16khz_mono_f32,
        })
        .await?;

    let mut turns = Vec::new();
    if let (Some(hf_token), Some(audio_16khz_mono_f32)) = (hf_token, diarize_audio) {
        match state
            .diarizer
            .diarize(DiarizeRequest {
                audio_16khz_mono_f32,
                hf_token,
            })
            .await
        {
            Ok(diarized) => turns = diarized,
            Err(err) => {
                warn!(error = %err, "diarization failed; labeling all segments Unknown");
            }
        }
    }

    let annotated = assign_speakers(&result.segments, &turns);
    let language = result.language.unwrap_or_else(|| "unknown".to_string());
    let segments = annotated
        .into_iter()
        .enumerate()
        .map(|(idx, seg)| {
            json!({
                "id": idx,
                "start": seg.start,
                "end": seg.end,
                "text": seg.text,
                "speaker": seg.speaker,
            })
        })
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "text": result.text,
        "language": language,
        "segments": segments,
    }))
    .into_response())
}

/// Wire shape accepted by the export endpoints.
#[derive(Debug, Deserialize)]
pub struct ExportBody {
    /// Annotated segments to render; missing fields default individually.
    #[serde(default)]
    pub segments: Vec<AnnotatedSegment>,
}

/// Renders segments as a plain-text transcript (`POST /export/txt`).
pub async fn export_txt(Json(body): Json<ExportBody>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        segments_to_text(&body.segments),
    )
        .into_response()
}

/// Renders segments as SRT subtitles (`POST /export/srt`).
pub async fn export_srt(Json(body): Json<ExportBody>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/x-subrip; charset=utf-8")],
        segments_to_srt(&body.segments),
    )
        .into_response()
}

/// Renders segments as WebVTT subtitles (`POST /export/vtt`).
pub async fn export_vtt(Json(body): Json<ExportBody>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/vtt; charset=utf-8")],
        segments_to_vtt(&body.segments),
    )
        .into_response()
}
