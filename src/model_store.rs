//! Model path resolution and optional Hugging Face download support.
//!
//! Startup guarantees that `cfg.whisper_model` points to a readable local
//! file before backend initialization. The diarization pipeline calls back
//! in on first use for its two ONNX files, authenticating the download with
//! the caller's token.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;

const LOCK_TIMEOUT: Duration = Duration::from_secs(120);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything needed to locate one model file and fetch it when missing.
struct ModelSpec<'a> {
    configured_path: &'a str,
    explicit: bool,
    auto_download: bool,
    cache_dir: &'a str,
    hf_repo: &'a str,
    hf_filename: &'a str,
    /// Remedy appended to the not-found error, naming the relevant settings.
    missing_hint: &'a str,
}

/// Ensures a local Whisper model file exists, downloading from Hugging Face if needed.
///
/// On success `cfg.whisper_model` holds the resolved path.
pub fn ensure_whisper_model(cfg: &mut AppConfig) -> Result<(), AppError> {
    let resolved = ensure_model_file(
        &ModelSpec {
            configured_path: &cfg.whisper_model,
            explicit: cfg.whisper_model_explicit,
            auto_download: cfg.whisper_auto_download,
            cache_dir: &cfg.whisper_cache_dir,
            hf_repo: &cfg.whisper_hf_repo,
            hf_filename: &cfg.whisper_hf_filename,
            missing_hint: "set WHISPER_MODEL to an existing file or enable WHISPER_AUTO_DOWNLOAD",
        },
        cfg.hf_token.as_deref(),
    )?;
    cfg.whisper_model = resolved;
    Ok(())
}

/// Ensures the diarization segmentation model exists, returning its path.
pub fn ensure_segmentation_model(cfg: &AppConfig, hf_token: &str) -> Result<String, AppError> {
    ensure_model_file(
        &ModelSpec {
            configured_path: &cfg.segmentation_model,
            explicit: cfg.segmentation_model_explicit,
            auto_download: cfg.diarize_auto_download,
            cache_dir: &cfg.diarize_cache_dir,
            hf_repo: &cfg.diarize_hf_repo,
            hf_filename: &cfg.segmentation_hf_filename,
            missing_hint:
                "set DIARIZE_SEGMENTATION_MODEL to an existing file or enable DIARIZE_AUTO_DOWNLOAD",
        },
        Some(hf_token),
    )
}

/// Ensures the speaker embedding model exists, returning its path.
pub fn ensure_embedding_model(cfg: &AppConfig, hf_token: &str) -> Result<String, AppError> {
    ensure_model_file(
        &ModelSpec {
            configured_path: &cfg.embedding_model,
            explicit: cfg.embedding_model_explicit,
            auto_download: cfg.diarize_auto_download,
            cache_dir: &cfg.diarize_cache_dir,
            hf_repo: &cfg.diarize_hf_repo,
            hf_filename: &cfg.embedding_hf_filename,
            missing_hint:
                "set DIARIZE_EMBEDDING_MODEL to an existing file or enable DIARIZE_AUTO_DOWNLOAD",
        },
        Some(hf_token),
    )
}

fn ensure_model_file(spec: &ModelSpec<'_>, hf_token: Option<&str>) -> Result<String, AppError> {
    if model_file_exists(spec.configured_path) {
        return Ok(spec.configured_path.to_string());
    }

    if !spec.auto_download {
        return Err(AppError::internal(format!(
            "model file not found at {:?}; {}",
            spec.configured_path, spec.missing_hint
        )));
    }

    let target_path = model_target_path(spec);
    if model_file_exists(&target_path.to_string_lossy()) {
        return Ok(target_path.to_string_lossy().to_string());
    }

    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::internal(format!(
                "failed to create model cache directory {:?}: {err}",
                parent
            ))
        })?;
    }

    let lock_path = lock_path_for(&target_path);
    let _guard = acquire_lock(&lock_path)?;

    // Another process may have finished the download while we waited.
    if model_file_exists(&target_path.to_string_lossy()) {
        return Ok(target_path.to_string_lossy().to_string());
    }

    download_model_to_path(spec, hf_token, &target_path)?;
    Ok(target_path.to_string_lossy().to_string())
}

fn model_file_exists(path: &str) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn model_target_path(spec: &ModelSpec<'_>) -> PathBuf {
    if spec.explicit {
        return PathBuf::from(spec.configured_path);
    }
    Path::new(spec.cache_dir).join(spec.hf_filename)
}

fn lock_path_for(target_path: &Path) -> PathBuf {
    let lock_name = format!(
        "{}.lock",
        target_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("model")
    );
    target_path.with_file_name(lock_name)
}

fn acquire_lock(path: &Path) -> Result<LockGuard, AppError> {
    let start = Instant::now();
    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "pid={}", std::process::id());
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if start.elapsed() >= LOCK_TIMEOUT {
                    return Err(AppError::internal(format!(
                        "timed out waiting for model download lock at {:?}",
                        path
                    )));
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed to acquire model download lock at {:?}: {err}",
                    path
                )));
            }
        }
    }
}

fn download_model_to_path(
    spec: &ModelSpec<'_>,
    hf_token: Option<&str>,
    target_path: &Path,
) -> Result<(), AppError> {
    let url = hf_resolve_url(spec.hf_repo, spec.hf_filename);
    info!(url = %url, target = %target_path.display(), "downloading model");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|err| AppError::internal(format!("failed to create HTTP client: {err}")))?;

    let mut request = client.get(&url);
    if let Some(token) = hf_token {
        request = request.bearer_auth(token);
    }

    let mut response = request.send().map_err(|err| {
        AppError::internal(format!(
            "failed to download model from {url}: {err}; check network connectivity"
        ))
    })?;

    if !response.status().is_success() {
        return match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::internal(format!(
                "Hugging Face rejected model download from {url} with {}; provide a valid Hugging Face token",
                response.status()
            ))),
            StatusCode::NOT_FOUND => Err(AppError::internal(format!(
                "model not found at {url}; verify the configured repository and filename"
            ))),
            status => Err(AppError::internal(format!(
                "model download failed from {url} with HTTP status {status}"
            ))),
        };
    }

    let tmp_path = target_path.with_extension("part");
    let mut out = File::create(&tmp_path).map_err(|err| {
        AppError::internal(format!(
            "failed to create temporary model file {:?}: {err}",
            tmp_path
        ))
    })?;
    std::io::copy(&mut response, &mut out).map_err(|err| {
        AppError::internal(format!(
            "failed writing downloaded model to {:?}: {err}",
            tmp_path
        ))
    })?;
    out.flush().map_err(|err| {
        AppError::internal(format!(
            "failed to flush downloaded model file {:?}: {err}",
            tmp_path
        ))
    })?;

    let size = out.metadata().map(|m| m.len()).unwrap_or_default();
    if size == 0 {
        let _ = fs::remove_file(&tmp_path);
        return Err(AppError::internal(format!(
            "downloaded empty model file from {url}; refusing to continue"
        )));
    }

    fs::rename(&tmp_path, target_path).map_err(|err| {
        AppError::internal(format!(
            "failed to move model from {:?} to {:?}: {err}",
            tmp_path, target_path
        ))
    })?;

    info!(target = %target_path.display(), bytes = size, "model download complete");
    Ok(())
}

fn hf_resolve_url(repo: &str, filename: &str) -> String {
    format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo.trim_matches('/'),
        filename.trim_matches('/')
    )
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::{hf_resolve_url, lock_path_for, model_target_path, ModelSpec};
    use std::path::Path;

    fn spec<'a>(configured_path: &'a str, explicit: bool) -> ModelSpec<'a> {
        ModelSpec {
            configured_path,
            explicit,
            auto_download: true,
            cache_dir: "/var/cache/models",
            hf_repo: "thewh1teagle/pyannote-rs",
            hf_filename: "segmentation-3.0.onnx",
            missing_hint: "",
        }
    }

    #[test]
    fn resolve_url_normalizes_edges() {
        assert_eq!(
            hf_resolve_url("/ggerganov/whisper.cpp/", "/ggml-base.bin/"),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin"
        );
    }

    #[test]
    fn lock_path_uses_sibling_file() {
        let path = Path::new("/tmp/ggml-base.bin");
        assert_eq!(
            lock_path_for(path).to_string_lossy(),
            "/tmp/ggml-base.bin.lock"
        );
    }

    #[test]
    fn explicit_path_wins_over_cache_dir() {
        let explicit = spec("/opt/models/custom.onnx", true);
        assert_eq!(
            model_target_path(&explicit).to_string_lossy(),
            "/opt/models/custom.onnx"
        );

        let derived = spec("/var/cache/models/segmentation-3.0.onnx", false);
        assert_eq!(
            model_target_path(&derived).to_string_lossy(),
            "/var/cache/models/segmentation-3.0.onnx"
        );
    }
}
