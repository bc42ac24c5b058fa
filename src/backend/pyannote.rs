//! `pyannote-rs` diarization backend.
//!
//! Speaker turns come from two ONNX models run locally: a segmentation model
//! for voice activity and an embedding model whose vectors cluster into
//! speaker labels. The pipeline loads at most once per process, on first
//! use, because the model files may need an authenticated download.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pyannote_rs::{get_segments, EmbeddingExtractor};
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{debug, info};

use crate::audio::{f32_to_i16_samples, TARGET_SAMPLE_RATE};
use crate::backend::{DiarizeRequest, Diarizer};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::model_store;
use crate::reconcile::DiarizationTurn;

const SPEAKER_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Local diarization backend powered by `pyannote-rs`.
pub struct PyannoteBackend {
    cfg: AppConfig,
    pipeline: OnceCell<Arc<Pipeline>>,
}

struct Pipeline {
    segmentation_model: String,
    extractor: Mutex<EmbeddingExtractor>,
}

impl PyannoteBackend {
    /// Creates the backend without touching the model files yet.
    pub fn new(cfg: AppConfig) -> Self {
        Self {
            cfg,
            pipeline: OnceCell::new(),
        }
    }

    /// Returns the loaded pipeline, initializing it on first call.
    ///
    /// Concurrent first calls are serialized by the cell; a failed load
    /// leaves it empty so a later request can retry, possibly with a
    /// different token.
    async fn pipeline(&self, hf_token: &str) -> Result<&Arc<Pipeline>, AppError> {
        if let Some(pipeline) = self.pipeline.get() {
            return Ok(pipeline);
        }

        let cfg = self.cfg.clone();
        let token = hf_token.to_string();
        self.pipeline
            .get_or_try_init(move || async move {
                task::spawn_blocking(move || Pipeline::load(&cfg, &token).map(Arc::new))
                    .await
                    .map_err(|err| {
                        AppError::diarization(format!(
                            "diarization pipeline load task failed: {err}"
                        ))
                    })?
            })
            .await
    }
}

#[async_trait]
impl Diarizer for PyannoteBackend {
    async fn diarize(&self, req: DiarizeRequest) -> Result<Vec<DiarizationTurn>, AppError> {
        let pipeline = Arc::clone(self.pipeline(&req.hf_token).await?);
        let audio = req.audio_16khz_mono_f32;
        task::spawn_blocking(move || {
            let samples = f32_to_i16_samples(&audio);
            pipeline.run(&samples, TARGET_SAMPLE_RATE)
        })
        .await
        .map_err(|err| AppError::diarization(format!("diarization worker task failed: {err}")))?
    }
}

impl Pipeline {
    fn load(cfg: &AppConfig, hf_token: &str) -> Result<Self, AppError> {
        let segmentation_model = model_store::ensure_segmentation_model(cfg, hf_token)?;
        let embedding_model = model_store::ensure_embedding_model(cfg, hf_token)?;

        let extractor = EmbeddingExtractor::new(&embedding_model).map_err(|err| {
            AppError::diarization(format!(
                "failed to load embedding model at {embedding_model:?}: {err}"
            ))
        })?;

        info!(
            segmentation_model = %segmentation_model,
            embedding_model = %embedding_model,
            "initialized diarization pipeline"
        );

        Ok(Self {
            segmentation_model,
            extractor: Mutex::new(extractor),
        })
    }

    fn run(&self, samples: &[i16], sample_rate: u32) -> Result<Vec<DiarizationTurn>, AppError> {
        let segment_iter =
            get_segments(samples, sample_rate, &self.segmentation_model).map_err(|err| {
                AppError::diarization(format!(
                    "speech segmentation failed using {:?}: {err}",
                    self.segmentation_model
                ))
            })?;

        let mut vad_segments = Vec::new();
        for segment in segment_iter {
            match segment {
                Ok(segment) => vad_segments.push(segment),
                Err(err) => debug!(error = %err, "skipping unusable speech segment"),
            }
        }

        let mut extractor = self
            .extractor
            .lock()
            .map_err(|_| AppError::diarization("failed to lock embedding extractor"))?;

        let mut speaker_embeddings: Vec<Vec<f32>> = Vec::new();
        let mut turns = Vec::with_capacity(vad_segments.len());
        for segment in &vad_segments {
            let embedding: Vec<f32> = extractor
                .compute(&segment.samples)
                .map_err(|err| {
                    AppError::diarization(format!("failed to compute speaker embedding: {err}"))
                })?
                .collect();

            let speaker = assign_speaker_label(&embedding, &mut speaker_embeddings);
            turns.push(DiarizationTurn {
                start: segment.start,
                end: segment.end,
                speaker,
            });
        }

        debug!(
            turns = turns.len(),
            speakers = speaker_embeddings.len(),
            "diarization inference complete"
        );

        Ok(turns)
    }
}

/// Matches an embedding to the closest known speaker above the similarity
/// threshold, registering a new speaker when none qualifies. Labels follow
/// first appearance: `SPEAKER_00`, `SPEAKER_01`, ...
fn assign_speaker_label(embedding: &[f32], speaker_embeddings: &mut Vec<Vec<f32>>) -> String {
    let mut best_match: Option<(usize, f32)> = None;
    for (idx, existing) in speaker_embeddings.iter().enumerate() {
        let similarity = cosine_similarity(embedding, existing);
        if similarity > SPEAKER_SIMILARITY_THRESHOLD
            && best_match.map_or(true, |(_, best)| similarity > best)
        {
            best_match = Some((idx, similarity));
        }
    }

    let idx = match best_match {
        Some((idx, _)) => idx,
        None => {
            speaker_embeddings.push(embedding.to_vec());
            speaker_embeddings.len() - 1
        }
    };
    format!("SPEAKER_{idx:02}")
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identity_and_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
    }

    #[test]
    fn repeated_embedding_reuses_speaker_label() {
        let mut speakers = Vec::new();
        let first = assign_speaker_label(&[1.0, 0.0], &mut speakers);
        let second = assign_speaker_label(&[0.99, 0.01], &mut speakers);

        assert_eq!(first, "SPEAKER_00");
        assert_eq!(second, "SPEAKER_00");
        assert_eq!(speakers.len(), 1);
    }

    #[test]
    fn dissimilar_embeddings_get_new_labels() {
        let mut speakers = Vec::new();
        let first = assign_speaker_label(&[1.0, 0.0, 0.0], &mut speakers);
        let second = assign_speaker_label(&[0.0, 1.0, 0.0], &mut speakers);
        let third = assign_speaker_label(&[0.0, 0.0, 1.0], &mut speakers);

        assert_eq!(first, "SPEAKER_00");
        assert_eq!(second, "SPEAKER_01");
        assert_eq!(third, "SPEAKER_02");
    }

    #[test]
    fn closest_known_speaker_wins() {
        let mut speakers = Vec::new();
        assign_speaker_label(&[1.0, 0.0], &mut speakers);
        assign_speaker_label(&[0.0, 1.0], &mut speakers);

        let label = assign_speaker_label(&[0.2, 0.98], &mut speakers);
        assert_eq!(label, "SPEAKER_01");
    }
}
