use anyhow::{Context, Result};
use tracing::debug;

/// Hosting platforms the bot knows how to pull media from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Instagram,
    TikTok,
    Pinterest,
    Facebook,
    Twitter,
    Unknown,
}

/// URL substrings that mark a link as belonging to a platform. Matching is
/// case-insensitive and purely containment-based.
const PLATFORM_MARKERS: &[(&str, Platform)] = &[
    ("youtube", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("instagram", Platform::Instagram),
    ("instagr", Platform::Instagram),
    ("tiktok.com", Platform::TikTok),
    ("pinterest", Platform::Pinterest),
    ("pin.it", Platform::Pinterest),
    ("facebook.com", Platform::Facebook),
    ("fb.watch", Platform::Facebook),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
];

/// Generic URL shorteners that carry no platform marker of their own. These
/// have to be resolved to their final destination before classification.
const SHORTENER_HOSTS: &[&str] = &["t.co", "bit.ly", "tinyurl.com", "goo.gl", "shorturl.at"];

impl Platform {
    pub fn classify(url: &str) -> Self {
        let lowered = url.to_lowercase();
        for (marker, platform) in PLATFORM_MARKERS {
            if lowered.contains(marker) {
                return *platform;
            }
        }
        Platform::Unknown
    }

    /// Name of the cookie file used for this platform, relative to the
    /// configured cookies directory.
    pub fn cookie_file_name(&self) -> Option<&'static str> {
        match self {
            Platform::YouTube => Some("youtube.txt"),
            Platform::Instagram => Some("instagram.txt"),
            Platform::TikTok => Some("tiktok.txt"),
            Platform::Pinterest => Some("pinterest.txt"),
            Platform::Facebook => Some("facebook.txt"),
            Platform::Twitter => Some("twitter.txt"),
            Platform::Unknown => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Pinterest => "pinterest",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A URL pulled out of a message, tagged with the platform it points at.
#[derive(Debug, Clone)]
pub struct Link {
    pub url: String,
    pub platform: Platform,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let platform = Platform::classify(&url);
        Self { url, platform }
    }

    pub fn is_supported(&self) -> bool {
        self.platform != Platform::Unknown
    }
}

/// Pull every `http(s)://` URL out of free-form text, in order of first
/// occurrence, duplicates preserved. A URL runs to the next whitespace.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut consumed_to = 0;

    for (start, _) in text.match_indices("http") {
        if start < consumed_to {
            continue;
        }
        let rest = &text[start..];
        if !rest.starts_with("http://") && !rest.starts_with("https://") {
            continue;
        }
        let end = rest
            .find(char::is_whitespace)
            .map(|offset| start + offset)
            .unwrap_or(text.len());
        urls.push(text[start..end].to_string());
        consumed_to = end;
    }

    urls
}

/// Extract URLs and keep only the ones pointing at a supported platform.
pub fn extract_links(text: &str) -> Vec<Link> {
    extract_urls(text)
        .into_iter()
        .map(Link::new)
        .filter(Link::is_supported)
        .collect()
}

pub fn is_short_link(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    SHORTENER_HOSTS.contains(&host)
}

/// Follow redirects on a shortened URL and return the final destination, so
/// the platform can be classified from the real host.
pub async fn resolve_short_link(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to resolve short link {url}"))?;

    let resolved = response.url().to_string();
    debug!("Resolved short link {} -> {}", url, resolved);
    Ok(resolved)
}
