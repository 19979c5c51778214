use super::process::run_capture;
use super::strategy::{Job, Strategy};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Primary strategy: general-purpose extraction with yt-dlp, normalized to a
/// single mp4 container.
pub struct YtDlpStrategy {
    pub user_agent: String,
    pub ffmpeg_path: Option<String>,
    /// Skips TLS verification in yt-dlp. Some target platforms serve media
    /// through hosts that fail strict verification; configurable trade-off.
    pub no_check_certificates: bool,
    pub timeout: Duration,
}

impl YtDlpStrategy {
    fn build_args(&self, job: &Job) -> Vec<String> {
        let output_template = job
            .scratch_dir
            .join(format!("{}_%(title).200B.%(ext)s", job.id));

        let mut args = vec![
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            job.format_selector.clone(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
        ];

        if self.no_check_certificates {
            args.push("--no-check-certificates".to_string());
        }

        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.clone());
        }

        if let Some(cookie_file) = &job.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookie_file.to_string_lossy().into_owned());
        }

        args.push(job.link.url.clone());
        args
    }

    pub async fn is_available() -> bool {
        match run_capture("yt-dlp", &["--version".to_string()], Duration::from_secs(15)).await {
            Ok(output) if output.success => {
                info!("yt-dlp is available, version: {}", output.text.trim());
                true
            }
            Ok(_) => {
                warn!("yt-dlp version check failed");
                false
            }
            Err(e) => {
                warn!("yt-dlp not found: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Strategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, job: &Job) -> Result<()> {
        let args = self.build_args(job);
        let output = run_capture("yt-dlp", &args, self.timeout).await?;
        debug!("yt-dlp output for job {}: {}", job.id, output.text);

        if !output.success {
            anyhow::bail!("yt-dlp failed: {}", output.last_line());
        }

        Ok(())
    }
}
