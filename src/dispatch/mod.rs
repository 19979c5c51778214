use crate::config::Config;
use crate::links::{self, Link};
use crate::media::{Engine, MediaFile, Retrieval};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

/// Fixed-size pool bounding how many retrieval jobs run at once, process
/// wide. Every acquire is matched by exactly one release via the RAII permit.
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
}

pub struct Permit(#[allow(dead_code)] OwnedSemaphorePermit);

impl PermitPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Suspends until a permit is free. The pool is never closed, so
    /// acquisition cannot fail.
    pub async fn acquire(&self) -> Permit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("permit pool semaphore closed");
        Permit(permit)
    }
}

/// Where a job's results go back to: a channel, optionally replying to the
/// triggering message. Plain ids keep the coordinator transport-agnostic.
#[derive(Debug, Clone, Copy)]
pub struct RelayTarget {
    pub channel_id: u64,
    pub reply_to: Option<u64>,
}

/// Handle to a transient "working on it" notice, cleared when the job ends.
pub type NoticeHandle = u64;

/// The chat-side collaborator: posts progress notices, media files, and
/// failure messages. Implemented by the Discord bot; faked in tests.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn notify_started(&self, target: &RelayTarget, link: &Link)
        -> Result<Option<NoticeHandle>>;

    async fn clear_notice(&self, target: &RelayTarget, notice: NoticeHandle) -> Result<()>;

    async fn send_media(&self, target: &RelayTarget, file: &MediaFile, link: &Link) -> Result<()>;

    async fn send_error(&self, target: &RelayTarget, link: &Link) -> Result<()>;
}

/// Top-level per-message flow: extract links, then one independent task per
/// link, each gated by the shared permit pool. A link's failure never touches
/// its siblings.
pub struct Dispatcher {
    engine: Arc<Engine>,
    pool: Arc<PermitPool>,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            engine: Arc::new(Engine::new(config, client.clone())),
            pool: Arc::new(PermitPool::new(config.max_concurrent_jobs)),
            client,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Extract supported links from message text, resolving shortened URLs
    /// that carry no platform marker of their own.
    pub async fn collect_links(&self, text: &str) -> Vec<Link> {
        let mut out = Vec::new();

        for url in links::extract_urls(text) {
            let mut link = Link::new(url);

            if !link.is_supported() && links::is_short_link(&link.url) {
                match links::resolve_short_link(&self.client, &link.url).await {
                    Ok(resolved) => link = Link::new(resolved),
                    Err(e) => warn!("{}", e),
                }
            }

            if link.is_supported() {
                out.push(link);
            }
        }

        out
    }

    /// Launch one detached task per link. Returns immediately; jobs are
    /// rate-limited by the permit pool, not by the caller.
    pub fn dispatch<R: Relay + 'static>(
        &self,
        relay: Arc<R>,
        target: RelayTarget,
        links: Vec<Link>,
    ) {
        for link in links {
            let engine = Arc::clone(&self.engine);
            let pool = Arc::clone(&self.pool);
            let relay = Arc::clone(&relay);

            tokio::spawn(async move {
                run_job(engine, pool, relay, target, link).await;
            });
        }
    }
}

async fn run_job<R: Relay>(
    engine: Arc<Engine>,
    pool: Arc<PermitPool>,
    relay: Arc<R>,
    target: RelayTarget,
    link: Link,
) {
    let notice = match relay.notify_started(&target, &link).await {
        Ok(notice) => notice,
        Err(e) => {
            warn!("Failed to post progress notice: {}", e);
            None
        }
    };

    let result = {
        let _permit = pool.acquire().await;
        engine.download(&link).await
        // permit released here, before any relay traffic
    };

    if let Some(notice) = notice {
        if let Err(e) = relay.clear_notice(&target, notice).await {
            warn!("Failed to clear progress notice: {}", e);
        }
    }

    deliver(relay.as_ref(), &target, &link, result).await;
}

/// Hand a finished job's outcome to the relay. On success the scratch dir is
/// deleted whether or not transmission worked, to bound disk usage; a failed
/// job gets a failure notice and nothing else.
async fn deliver<R: Relay + ?Sized>(
    relay: &R,
    target: &RelayTarget,
    link: &Link,
    result: Result<Retrieval>,
) {
    match result {
        Ok(retrieval) => {
            relay_files(relay, target, &retrieval).await;
            if let Err(e) = tokio::fs::remove_dir_all(&retrieval.scratch_dir).await {
                warn!(
                    "Failed to remove {}: {}",
                    retrieval.scratch_dir.display(),
                    e
                );
            }
        }
        Err(e) => {
            warn!("Download failed for {}: {}", link.url, e);
            if let Err(send_err) = relay.send_error(target, link).await {
                error!("Failed to report download failure: {}", send_err);
            }
        }
    }
}

async fn relay_files<R: Relay + ?Sized>(relay: &R, target: &RelayTarget, retrieval: &Retrieval) {
    info!(
        "Relaying {} file(s) for {}",
        retrieval.files.len(),
        retrieval.link.url
    );

    for file in &retrieval.files {
        if let Err(e) = relay.send_media(target, file, &retrieval.link).await {
            error!("Failed to send {}: {}", file.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_admits_up_to_capacity_immediately() {
        let pool = Arc::new(PermitPool::new(3));

        let p1 = pool.acquire().await;
        let _p2 = pool.acquire().await;
        let _p3 = pool.acquire().await;

        // Fourth acquisition must not complete while all permits are held.
        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());

        drop(p1);
        let admitted = tokio::time::timeout(Duration::from_millis(200), pool.acquire()).await;
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn test_pool_serializes_jobs_with_capacity_one() {
        let pool = Arc::new(PermitPool::new(1));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_all_paths() {
        let pool = Arc::new(PermitPool::new(1));

        // Simulated failing job: the permit must come back regardless.
        {
            let _permit = pool.acquire().await;
            let failed: Result<()> = Err(anyhow::anyhow!("boom"));
            assert!(failed.is_err());
        }

        let reacquired = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
        assert!(reacquired.is_ok());
    }

    /// Counting fake for the chat side of a job.
    struct RecordingRelay {
        notices_posted: AtomicUsize,
        notices_cleared: AtomicUsize,
        media_sent: AtomicUsize,
        errors_sent: AtomicUsize,
        fail_media: bool,
    }

    impl RecordingRelay {
        fn new(fail_media: bool) -> Self {
            Self {
                notices_posted: AtomicUsize::new(0),
                notices_cleared: AtomicUsize::new(0),
                media_sent: AtomicUsize::new(0),
                errors_sent: AtomicUsize::new(0),
                fail_media,
            }
        }
    }

    #[async_trait]
    impl Relay for RecordingRelay {
        async fn notify_started(
            &self,
            _target: &RelayTarget,
            _link: &Link,
        ) -> Result<Option<NoticeHandle>> {
            self.notices_posted.fetch_add(1, Ordering::SeqCst);
            Ok(Some(7))
        }

        async fn clear_notice(&self, _target: &RelayTarget, _notice: NoticeHandle) -> Result<()> {
            self.notices_cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_media(
            &self,
            _target: &RelayTarget,
            _file: &MediaFile,
            _link: &Link,
        ) -> Result<()> {
            self.media_sent.fetch_add(1, Ordering::SeqCst);
            if self.fail_media {
                anyhow::bail!("simulated transmission failure");
            }
            Ok(())
        }

        async fn send_error(&self, _target: &RelayTarget, _link: &Link) -> Result<()> {
            self.errors_sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn target() -> RelayTarget {
        RelayTarget {
            channel_id: 1,
            reply_to: Some(2),
        }
    }

    #[tokio::test]
    async fn test_failed_job_reports_error_and_leaves_no_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.downloads_dir = dir.path().to_path_buf();

        let engine = Arc::new(Engine::new(&config, reqwest::Client::new()));
        let pool = Arc::new(PermitPool::new(1));
        let relay = Arc::new(RecordingRelay::new(false));

        // Unknown platform means an empty strategy chain, so the job fails
        // without touching any external tool.
        let link = Link::new("https://example.com/watch?v=1");
        run_job(engine, pool, Arc::clone(&relay), target(), link).await;

        assert_eq!(relay.notices_posted.load(Ordering::SeqCst), 1);
        assert_eq!(relay.notices_cleared.load(Ordering::SeqCst), 1);
        assert_eq!(relay.errors_sent.load(Ordering::SeqCst), 1);
        assert_eq!(relay.media_sent.load(Ordering::SeqCst), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_scratch_deleted_even_when_transmission_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scratch_dir = dir.path().join("job-9");
        std::fs::create_dir_all(&scratch_dir).unwrap();
        std::fs::write(scratch_dir.join("clip.mp4"), b"data").unwrap();

        let link = Link::new("https://youtu.be/abc123DEFGH");
        let retrieval = Retrieval {
            link: link.clone(),
            files: vec![MediaFile::new(scratch_dir.join("clip.mp4"))],
            scratch_dir: scratch_dir.clone(),
        };

        let relay = RecordingRelay::new(true);
        deliver(&relay, &target(), &link, Ok(retrieval)).await;

        // Transmission was attempted, its failure is a delivery error rather
        // than a job failure, and the local copy is gone either way.
        assert_eq!(relay.media_sent.load(Ordering::SeqCst), 1);
        assert_eq!(relay.errors_sent.load(Ordering::SeqCst), 0);
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_successful_delivery_sends_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch_dir = dir.path().join("job-5");
        std::fs::create_dir_all(&scratch_dir).unwrap();
        for name in ["1.jpg", "2.jpg", "3.jpg"] {
            std::fs::write(scratch_dir.join(name), b"data").unwrap();
        }

        let link = Link::new("https://www.instagram.com/p/xyz/");
        let retrieval = Retrieval {
            link: link.clone(),
            files: [
                scratch_dir.join("1.jpg"),
                scratch_dir.join("2.jpg"),
                scratch_dir.join("3.jpg"),
            ]
            .into_iter()
            .map(MediaFile::new)
            .collect(),
            scratch_dir: scratch_dir.clone(),
        };

        let relay = RecordingRelay::new(false);
        deliver(&relay, &target(), &link, Ok(retrieval)).await;

        assert_eq!(relay.media_sent.load(Ordering::SeqCst), 3);
        assert_eq!(relay.errors_sent.load(Ordering::SeqCst), 0);
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_collect_links_ignores_unsupported_urls() {
        let config = Config::default();
        let dispatcher = Dispatcher::new(&config, reqwest::Client::new());

        // No recognized platform marker and not a known shortener, so no
        // network traffic and no jobs.
        let links = dispatcher
            .collect_links("look at https://example.com/watch?v=1")
            .await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_collect_links_finds_supported_platforms() {
        let config = Config::default();
        let dispatcher = Dispatcher::new(&config, reqwest::Client::new());

        let links = dispatcher
            .collect_links("check this https://youtu.be/abc123DEFGH out")
            .await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].platform, crate::links::Platform::YouTube);
    }
}
