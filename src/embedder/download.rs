/// Fetches embedding model files from HuggingFace on first use.
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Files the ONNX embedder needs: local name and path inside the repository.
pub const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
];

/// Resolve the download URL of `file` in HuggingFace repository `repo`.
#[must_use]
pub fn file_url(repo: &str, file: &str) -> String {
    format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo.trim_matches('/'),
        file
    )
}

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download any missing model files from `repo` into `model_dir`.
pub fn download_model_files(repo: &str, model_dir: &Path) -> Result<()> {
    if all_files_present(model_dir) {
        return Ok(());
    }

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory: {}", model_dir.display()))?;

    for &(name, remote) in MODEL_FILES {
        let dest = model_dir.join(name);
        if dest.exists() {
            continue;
        }
        let url = file_url(repo, remote);
        info!("Downloading {name} from {url}");
        download_file(&dest, &url).with_context(|| format!("failed to download {name}"))?;
    }

    info!("Model files ready in {}", model_dir.display());
    Ok(())
}

/// Stream `url` into `dest` through a `.part` file so an interrupted
/// download never leaves a truncated model behind.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let resp = reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
            {
                pb.set_style(style.progress_chars("█▓░"));
            }
            pb
        }
        _ => ProgressBar::new_spinner(),
    };

    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create file: {}", partial.display()))?;

    let mut reader = pb.wrap_read(resp);
    io::copy(&mut reader, &mut file).context("failed to write model file")?;
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_files_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!all_files_present(dir.path()));

        fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        assert!(!all_files_present(dir.path()));

        fs::write(dir.path().join("model.onnx"), "dummy").unwrap();
        assert!(all_files_present(dir.path()));
    }

    #[test]
    fn test_download_skipped_when_present() {
        let dir = tempfile::tempdir().unwrap();
        for &(name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), "dummy").unwrap();
        }
        // No network access needed
        download_model_files("invalid/repo", dir.path()).unwrap();
    }

    #[test]
    fn test_file_url() {
        assert_eq!(
            file_url("sentence-transformers/all-MiniLM-L6-v2/", "onnx/model.onnx"),
            "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx"
        );
    }
}
