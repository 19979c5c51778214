mod fresh;
mod gallery_dl;
mod process;
mod remote;
mod strategy;
mod types;
mod ytdlp;

pub use fresh::files_created_after;
pub use types::{MediaFile, MediaKind, Retrieval};

use crate::config::Config;
use crate::links::{Link, Platform};
use anyhow::{Context, Result};
use gallery_dl::GalleryDlStrategy;
use remote::RemoteApiStrategy;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use strategy::{Job, Strategy};
use tracing::{info, warn};
use ytdlp::YtDlpStrategy;

/// Quality cap policy for yt-dlp's format selector. YouTube is the heaviest
/// traffic source, so it gets a resolution cap; everything else downloads the
/// best available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Best,
    MaxHeight(u32),
}

impl Quality {
    pub fn format_selector(&self) -> String {
        match self {
            Quality::Best => "bestvideo+bestaudio/best".to_string(),
            Quality::MaxHeight(height) => {
                format!("bestvideo[height<={height}]+bestaudio/best[height<={height}]/best")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
    YtDlp,
    GalleryDl,
    RemoteApi,
}

/// Per-platform retrieval policy: which strategies to try, in order, and the
/// quality cap for the primary tool.
struct PlatformPolicy {
    quality: Quality,
    strategies: &'static [StrategyKind],
}

fn policy_for(platform: Platform) -> PlatformPolicy {
    use StrategyKind::*;

    match platform {
        Platform::YouTube => PlatformPolicy {
            quality: Quality::MaxHeight(720),
            strategies: &[YtDlp, GalleryDl, RemoteApi],
        },
        Platform::Instagram => PlatformPolicy {
            quality: Quality::Best,
            strategies: &[YtDlp, GalleryDl, RemoteApi],
        },
        Platform::TikTok
        | Platform::Pinterest
        | Platform::Facebook
        | Platform::Twitter => PlatformPolicy {
            quality: Quality::Best,
            strategies: &[YtDlp, GalleryDl],
        },
        Platform::Unknown => PlatformPolicy {
            quality: Quality::Best,
            strategies: &[],
        },
    }
}

/// Extensions the downloaders leave behind that are never media: metadata
/// dumps and partial downloads. These never count toward a strategy's
/// success and are never handed to the relay.
const NON_MEDIA_EXTENSIONS: &[&str] = &["json", "part", "ytdl", "txt", "description", "tmp"];

fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return true;
    };
    !NON_MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Media files a job has produced so far: fresh in its scratch dir, filtered
/// to real media, sorted.
fn media_files_since(scratch_dir: &Path, cutoff: SystemTime) -> Vec<MediaFile> {
    files_created_after(scratch_dir, cutoff)
        .into_iter()
        .filter(|path| is_media_file(path))
        .map(MediaFile::new)
        .collect()
}

/// The fallback chain engine: tries each of a platform's strategies in order
/// and stops at the first one that actually puts media on disk.
pub struct Engine {
    downloads_dir: PathBuf,
    cookies_dir: PathBuf,
    job_seq: AtomicU64,
    ytdlp: YtDlpStrategy,
    gallery_dl: GalleryDlStrategy,
    remote_api: Option<RemoteApiStrategy>,
}

impl Engine {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        let timeout = Duration::from_secs(config.job_timeout_secs);

        let remote_api = config.media_api.as_ref().map(|api| {
            RemoteApiStrategy::new(client, api.endpoint.clone(), api.api_key.clone())
        });

        Self {
            downloads_dir: config.downloads_dir.clone(),
            cookies_dir: config.cookies_dir.clone(),
            job_seq: AtomicU64::new(1),
            ytdlp: YtDlpStrategy {
                user_agent: config.user_agent.clone(),
                ffmpeg_path: config.ffmpeg_path.clone(),
                no_check_certificates: config.no_check_certificates,
                timeout,
            },
            gallery_dl: GalleryDlStrategy { timeout },
            remote_api,
        }
    }

    /// Probe the external tools at startup. Missing tools are only fatal when
    /// none of them is available.
    pub async fn check_tools(&self) -> Result<()> {
        let ytdlp = YtDlpStrategy::is_available().await;
        let gallery_dl = GalleryDlStrategy::is_available().await;

        if ytdlp || gallery_dl {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "no downloaders available; install yt-dlp and/or gallery-dl"
            ))
        }
    }

    fn strategies_for(&self, platform: Platform) -> Vec<&dyn Strategy> {
        policy_for(platform)
            .strategies
            .iter()
            .filter_map(|kind| -> Option<&dyn Strategy> {
                match kind {
                    StrategyKind::YtDlp => Some(&self.ytdlp),
                    StrategyKind::GalleryDl => Some(&self.gallery_dl),
                    StrategyKind::RemoteApi => self
                        .remote_api
                        .as_ref()
                        .map(|remote| remote as &dyn Strategy),
                }
            })
            .collect()
    }

    fn cookie_file_for(&self, platform: Platform) -> Option<PathBuf> {
        let path = self.cookies_dir.join(platform.cookie_file_name()?);
        path.exists().then_some(path)
    }

    /// Run the fallback chain for one link. On success the caller owns the
    /// scratch directory and its files; on failure it has already been
    /// cleaned up.
    pub async fn download(&self, link: &Link) -> Result<Retrieval> {
        let id = self.job_seq.fetch_add(1, Ordering::Relaxed);
        let scratch_dir = self.downloads_dir.join(format!("job-{id}"));
        std::fs::create_dir_all(&scratch_dir)
            .with_context(|| format!("failed to create {}", scratch_dir.display()))?;

        let job = Job {
            id,
            link: link.clone(),
            started: SystemTime::now(),
            format_selector: policy_for(link.platform).quality.format_selector(),
            cookie_file: self.cookie_file_for(link.platform),
            scratch_dir: scratch_dir.clone(),
        };

        info!(
            "Job {} started: {} ({})",
            job.id, job.link.url, job.link.platform
        );

        let strategies = self.strategies_for(link.platform);
        match run_chain(&job, &strategies).await {
            Ok(files) => Ok(Retrieval {
                link: link.clone(),
                files,
                scratch_dir,
            }),
            Err(e) => {
                // Partial output from failed strategies must not leak out.
                if let Err(cleanup_err) = std::fs::remove_dir_all(&scratch_dir) {
                    warn!(
                        "Failed to clean up {}: {}",
                        scratch_dir.display(),
                        cleanup_err
                    );
                }
                Err(e)
            }
        }
    }
}

/// Try each strategy in order; the first one that leaves at least one media
/// file in the scratch dir wins. Exit codes alone do not decide success --
/// a tool can exit non-zero after writing usable output, and can exit zero
/// having written nothing but metadata.
async fn run_chain(job: &Job, strategies: &[&dyn Strategy]) -> Result<Vec<MediaFile>> {
    if strategies.is_empty() {
        anyhow::bail!("no retrieval strategies for platform {}", job.link.platform);
    }

    let mut errors = Vec::new();

    for strategy in strategies {
        let failure = match strategy.fetch(job).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Job {}: {} failed: {}", job.id, strategy.name(), e);
                Some(format!("{}: {e}", strategy.name()))
            }
        };

        let files = media_files_since(&job.scratch_dir, job.started);
        if !files.is_empty() {
            info!(
                "Job {}: {} produced {} file(s)",
                job.id,
                strategy.name(),
                files.len()
            );
            return Ok(files);
        }

        errors.push(
            failure.unwrap_or_else(|| format!("{}: produced no media files", strategy.name())),
        );
    }

    Err(anyhow::anyhow!(
        "media retrieval failed: {}",
        errors.join(". ")
    ))
}
