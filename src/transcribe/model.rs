use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const MODEL_REPO: &str = "ggerganov/whisper.cpp";

/// Model names accepted on the command line and their ggml files.
const MODELS: &[(&str, &str)] = &[
    ("tiny", "ggml-tiny.bin"),
    ("tiny.en", "ggml-tiny.en.bin"),
    ("base", "ggml-base.bin"),
    ("base.en", "ggml-base.en.bin"),
    ("small", "ggml-small.bin"),
    ("small.en", "ggml-small.en.bin"),
    ("medium", "ggml-medium.bin"),
    ("medium.en", "ggml-medium.en.bin"),
    ("large", "ggml-large-v3-turbo.bin"),
];

fn model_file(name: &str) -> Option<&'static str> {
    MODELS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// An existing path is used as-is; a model name is looked up in the local
/// cache and fetched from Hugging Face on first use.
pub fn resolve(model: &str) -> Result<PathBuf> {
    let path = Path::new(model);
    if path.is_file() {
        log::info!("Using Whisper model {}", path.display());
        return Ok(path.to_path_buf());
    }

    let file = model_file(model).with_context(|| {
        let names: Vec<&str> = MODELS.iter().map(|(n, _)| *n).collect();
        format!(
            "Unknown Whisper model '{}' (expected a file or one of: {})",
            model,
            names.join(", ")
        )
    })?;

    let cached = cache_dir()?.join(file);
    if cached.is_file() {
        log::info!("Using cached Whisper model {}", cached.display());
        return Ok(cached);
    }

    log::info!("Fetching Whisper model '{}' from {}", model, MODEL_REPO);
    let api = hf_hub::api::sync::Api::new().context("Failed to initialize Hugging Face API")?;
    let fetched = api
        .model(MODEL_REPO.to_string())
        .get(file)
        .with_context(|| format!("Failed to download {}", file))?;
    std::fs::copy(&fetched, &cached)
        .with_context(|| format!("Failed to store model at {}", cached.display()))?;
    log::info!("Model saved to {}", cached.display());
    Ok(cached)
}

fn cache_dir() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine cache directory")?
        .join("pulsepoint")
        .join("models");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}
