//! `whisper-rs` backend implementation.
//!
//! This backend keeps a pool of Whisper contexts in memory and runs inference
//! on blocking worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task;
use tracing::{info, warn};
use whisper_rs::{
    get_lang_str, FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
};

use crate::backend::{TranscribeRequest, Transcriber, TranscriptResult};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::formats::normalize_text;
use crate::reconcile::TranscriptSegment;

/// Local inference backend powered by `whisper-rs`.
pub struct WhisperRsBackend {
    model_path: String,
    contexts: Vec<Arc<Mutex<WhisperContext>>>,
    next_context_idx: AtomicUsize,
}

impl WhisperRsBackend {
    /// Loads the configured Whisper model and prepares reusable contexts.
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let model_path = cfg.whisper_model.clone();
        let contexts = build_contexts(&model_path, cfg.whisper_parallelism)?;

        info!(
            model = %model_path,
            whisper_parallelism = cfg.whisper_parallelism,
            "initialized whisper contexts"
        );

        Ok(Self {
            model_path,
            contexts,
            next_context_idx: AtomicUsize::new(0),
        })
    }
}

fn build_contexts(
    model_path: &str,
    whisper_parallelism: usize,
) -> Result<Vec<Arc<Mutex<WhisperContext>>>, AppError> {
    let mut contexts = Vec::with_capacity(whisper_parallelism);
    for worker_idx in 0..whisper_parallelism {
        let params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(model_path, params).map_err(|err| {
            AppError::transcription(format!(
                "failed to load model at {model_path:?} for worker {}: {err}",
                worker_idx + 1,
            ))
        })?;

        contexts.push(Arc::new(Mutex::new(context)));
    }

    Ok(contexts)
}

#[async_trait]
impl Transcriber for WhisperRsBackend {
    async fn transcribe(&self, req: TranscribeRequest) -> Result<TranscriptResult, AppError> {
        let model_path = self.model_path.clone();
        let context_idx =
            self.next_context_idx.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        let context = Arc::clone(&self.contexts[context_idx]);
        task::spawn_blocking(move || run_whisper_rs(req, &model_path, context))
            .await
            .map_err(|err| {
                AppError::transcription(format!("whisper-rs worker task failed: {err}"))
            })?
    }
}

fn run_whisper_rs(
    req: TranscribeRequest,
    model_path: &str,
    context: Arc<Mutex<WhisperContext>>,
) -> Result<TranscriptResult, AppError> {
    let context_guard = context
        .lock()
        .map_err(|_| AppError::transcription("failed to lock whisper model context"))?;

    let mut state = context_guard
        .create_state()
        .map_err(|err| AppError::transcription(format!("failed to create whisper state: {err}")))?;

    let mut params = base_params();
    params.set_detect_language(true);

    state
        .full(params, &req.audio_16khz_mono_f32)
        .map_err(|err| {
            AppError::transcription(format!(
                "whisper inference failed using {model_path:?}: {err}"
            ))
        })?;

    let (mut count, mut segments) = extract_segments(&state)?;

    if count == 0 {
        let mut fallback = base_params();
        fallback.set_language(Some("en"));

        state
            .full(fallback, &req.audio_16khz_mono_f32)
            .map_err(|err| {
                AppError::transcription(format!(
                    "whisper fallback inference failed using {model_path:?}: {err}"
                ))
            })?;
        let (fallback_count, fallback_segments) = extract_segments(&state)?;
        if fallback_count > 0 {
            warn!(
                audio_samples = req.audio_16khz_mono_f32.len(),
                segment_count = fallback_count,
                "whisper fallback used fixed language after empty auto-detect output"
            );
            count = fallback_count;
            segments = fallback_segments;
        }
    }

    let text = normalize_text(
        &segments
            .iter()
            .map(|seg| seg.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    );

    if text.is_empty() {
        warn!(
            audio_samples = req.audio_16khz_mono_f32.len(),
            segment_count = count,
            "whisper inference completed with empty transcript"
        );
    }

    let language = get_lang_str(state.full_lang_id_from_state()).map(ToOwned::to_owned);

    Ok(TranscriptResult {
        text,
        language,
        segments,
    })
}

fn base_params() -> FullParams<'static, 'static> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_no_timestamps(false);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_max_initial_ts(5.0);
    params
}

fn extract_segments(
    state: &whisper_rs::WhisperState,
) -> Result<(i32, Vec<TranscriptSegment>), AppError> {
    let count = state.full_n_segments();
    let mut segments = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Some(seg) = state.get_segment(i) else {
            continue;
        };
        let text = seg
            .to_str_lossy()
            .map_err(|err| AppError::transcription(format!("failed to read segment text: {err}")))?
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }

        // Whisper reports timestamps in centisecond ticks.
        segments.push(TranscriptSegment {
            start: (seg.start_timestamp() as f64) * 0.01,
            end: (seg.end_timestamp() as f64) * 0.01,
            text,
        });
    }

    Ok((count, segments))
}
