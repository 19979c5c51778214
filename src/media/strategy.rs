use crate::links::Link;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::SystemTime;

/// One retrieval job: a single link being fetched into its own scratch
/// directory. The job id is a process-wide monotonic counter, embedded in the
/// scratch directory name and the output templates so concurrent jobs never
/// step on each other's files.
#[derive(Debug)]
pub struct Job {
    pub id: u64,
    pub link: Link,
    pub scratch_dir: PathBuf,
    pub started: SystemTime,
    /// yt-dlp format selector for this platform.
    pub format_selector: String,
    /// Cookie file for this platform, only set when it exists on disk.
    pub cookie_file: Option<PathBuf>,
}

/// One concrete attempt to retrieve media for a link: an external tool or a
/// remote API call. Strategies drop whatever they fetch into the job's
/// scratch directory; the engine decides success by what actually landed
/// there, not by what the strategy claims.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Human-readable name, used in logs and aggregate errors.
    fn name(&self) -> &'static str;

    async fn fetch(&self, job: &Job) -> Result<()>;
}
