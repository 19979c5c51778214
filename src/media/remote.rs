use super::strategy::{Job, Strategy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Tertiary strategy: a third-party metadata API that resolves a page URL to
/// direct media URLs. Only wired up when an endpoint and key are configured.
pub struct RemoteApiStrategy {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    /// Single direct media URL.
    url: Option<String>,
    /// Per-item URLs for carousel posts.
    #[serde(default)]
    medias: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    url: String,
}

impl ApiResponse {
    fn media_urls(self) -> Vec<String> {
        if !self.medias.is_empty() {
            return self.medias.into_iter().map(|media| media.url).collect();
        }
        self.url.into_iter().collect()
    }
}

impl RemoteApiStrategy {
    pub fn new(client: reqwest::Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    async fn download_to_file(&self, job: &Job, media_url: &str, index: usize) -> Result<()> {
        let response = self
            .client
            .get(media_url)
            .send()
            .await
            .context("failed to fetch media URL")?;

        if !response.status().is_success() {
            anyhow::bail!("media URL returned HTTP {}", response.status());
        }

        let data = response.bytes().await.context("failed to read media body")?;

        let ext = if media_url.contains(".mp4") { "mp4" } else { "jpg" };
        let path = job
            .scratch_dir
            .join(format!("{}_api_{}.{}", job.id, index + 1, ext));
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl Strategy for RemoteApiStrategy {
    fn name(&self) -> &'static str {
        "media-api"
    }

    async fn fetch(&self, job: &Job) -> Result<()> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", job.link.url.as_str())])
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("media API request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("media API returned HTTP {}", response.status());
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .context("failed to parse media API response")?;

        let media_urls = parsed.media_urls();
        if media_urls.is_empty() {
            anyhow::bail!("media API returned no media URLs");
        }

        debug!("Media API returned {} URL(s) for job {}", media_urls.len(), job.id);

        for (index, media_url) in media_urls.iter().enumerate() {
            if let Err(e) = self.download_to_file(job, media_url, index).await {
                warn!("Failed to download {}: {}", media_url, e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_url_response() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"url": "https://cdn.example/video.mp4"}"#).unwrap();
        assert_eq!(parsed.media_urls(), vec!["https://cdn.example/video.mp4"]);
    }

    #[test]
    fn test_carousel_response_takes_precedence() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"url": "https://cdn.example/cover.jpg",
                "medias": [{"url": "https://cdn.example/1.jpg"}, {"url": "https://cdn.example/2.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.media_urls(),
            vec!["https://cdn.example/1.jpg", "https://cdn.example/2.jpg"]
        );
    }

    #[test]
    fn test_empty_response() {
        let parsed: ApiResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.media_urls().is_empty());
    }
}
