use super::process::run_capture;
use super::strategy::{Job, Strategy};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Secondary strategy: gallery-dl, which handles image posts and carousels
/// that yt-dlp reports as metadata-only.
pub struct GalleryDlStrategy {
    pub timeout: Duration,
}

impl GalleryDlStrategy {
    fn build_args(&self, job: &Job) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(cookie_file) = &job.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookie_file.to_string_lossy().into_owned());
        }

        // -D writes straight into the scratch dir, no per-site subfolders.
        args.push("-D".to_string());
        args.push(job.scratch_dir.to_string_lossy().into_owned());
        args.push(job.link.url.clone());
        args
    }

    pub async fn is_available() -> bool {
        match run_capture(
            "gallery-dl",
            &["--version".to_string()],
            Duration::from_secs(15),
        )
        .await
        {
            Ok(output) if output.success => {
                info!("gallery-dl is available, version: {}", output.text.trim());
                true
            }
            Ok(_) => {
                warn!("gallery-dl version check failed");
                false
            }
            Err(e) => {
                warn!("gallery-dl not found: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Strategy for GalleryDlStrategy {
    fn name(&self) -> &'static str {
        "gallery-dl"
    }

    async fn fetch(&self, job: &Job) -> Result<()> {
        let args = self.build_args(job);
        let output = run_capture("gallery-dl", &args, self.timeout).await?;
        debug!("gallery-dl output for job {}: {}", job.id, output.text);

        if !output.success {
            anyhow::bail!("gallery-dl failed: {}", output.last_line());
        }

        Ok(())
    }
}
