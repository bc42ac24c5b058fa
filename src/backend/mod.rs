//! Backend abstractions for the speech models.
//!
//! The HTTP layer depends on the [`Transcriber`] and [`Diarizer`] traits
//! instead of concrete implementations, which keeps request handling
//! decoupled from inference code.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, BackendKind};
use crate::error::AppError;
use crate::reconcile::{DiarizationTurn, TranscriptSegment};

pub mod pyannote;
pub mod whisper_rs;

/// Input payload consumed by a transcription backend.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    /// Audio samples as 16 kHz mono PCM in `f32` range `[-1.0, 1.0]`.
    pub audio_16khz_mono_f32: Vec<f32>,
}

/// Input payload consumed by a diarization backend.
#[derive(Debug, Clone)]
pub struct DiarizeRequest {
    /// Audio samples as 16 kHz mono PCM in `f32` range `[-1.0, 1.0]`.
    pub audio_16khz_mono_f32: Vec<f32>,
    /// Hugging Face token authorizing model access for this call.
    pub hf_token: String,
}

/// Full inference result returned by a transcription backend.
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    /// Concatenated normalized transcript text.
    pub text: String,
    /// Detected language if available.
    pub language: Option<String>,
    /// Segment-level timing and text details.
    pub segments: Vec<TranscriptSegment>,
}

/// Backend contract implemented by speech-to-text engines.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Runs inference and returns a transcript result.
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscriptResult, AppError>;
}

/// Backend contract implemented by speaker diarization engines.
#[async_trait]
pub trait Diarizer: Send + Sync {
    /// Runs diarization and returns labeled speaker turns.
    async fn diarize(&self, req: DiarizeRequest) -> Result<Vec<DiarizationTurn>, AppError>;
}

/// Builds the configured transcription backend.
pub fn build_transcriber(cfg: &AppConfig) -> Result<Arc<dyn Transcriber>, AppError> {
    match cfg.backend_kind {
        BackendKind::WhisperRs => Ok(Arc::new(whisper_rs::WhisperRsBackend::new(cfg)?)),
    }
}

/// Builds the diarization backend. Model loading is deferred to first use.
pub fn build_diarizer(cfg: &AppConfig) -> Arc<dyn Diarizer> {
    Arc::new(pyannote::PyannoteBackend::new(cfg.clone()))
}
