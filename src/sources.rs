// src/sources.rs
//! Span providers: where raw text blocks come from.
//!
//! The pipeline only needs the [`SpanProvider`] contract; concrete fetching
//! stays thin. `WebProvider` pulls a page body over HTTP, the fixture provider
//! replays embedded samples for local runs and tests.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::types::{RawSpan, SourceType};

pub const ENV_SOURCES_PATH: &str = "MONITOR_SOURCES_PATH";
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

/// One configured source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
}

#[derive(Debug, Default, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    source: Vec<SourceSpec>,
}

/// Load the source list; absent file means an empty list (the scheduler then
/// falls back to fixtures when that feature is on).
pub fn load_sources() -> Result<Vec<SourceSpec>> {
    let path = std::env::var(ENV_SOURCES_PATH).unwrap_or_else(|_| DEFAULT_SOURCES_PATH.to_string());
    let path = Path::new(&path);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources at {}", path.display()))?;
    let file: SourcesFile = toml::from_str(&content).context("parsing sources config")?;
    Ok(file.source)
}

#[async_trait::async_trait]
pub trait SpanProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawSpan>>;
    fn name(&self) -> &str;
}

/// Fetches one page body per tick; the normalizer does all the cleaning.
pub struct WebProvider {
    spec: SourceSpec,
    http: reqwest::Client,
}

impl WebProvider {
    pub fn new(spec: SourceSpec) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("municipal-monitor/0.1")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { spec, http }
    }
}

#[async_trait::async_trait]
impl SpanProvider for WebProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawSpan>> {
        let body = self
            .http
            .get(&self.spec.url)
            .send()
            .await
            .with_context(|| format!("fetching {}", self.spec.url))?
            .error_for_status()
            .with_context(|| format!("non-success from {}", self.spec.url))?
            .text()
            .await
            .context("reading response body")?;
        Ok(vec![RawSpan {
            source_url: self.spec.url.clone(),
            source_type: self.spec.source_type,
            fetched_at: Utc::now(),
            text: body,
        }])
    }

    fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Replays embedded sample spans, separated by `---` lines.
#[cfg(feature = "ingest-fixtures")]
pub struct FixtureProvider {
    name: &'static str,
    source_url: String,
    source_type: SourceType,
    raw: &'static str,
}

#[cfg(feature = "ingest-fixtures")]
impl FixtureProvider {
    pub fn web_news() -> Self {
        Self {
            name: "fixture-web",
            source_url: "https://fixtures.local/web".to_string(),
            source_type: SourceType::Web,
            raw: include_str!("../tests/fixtures/web_news.txt"),
        }
    }

    pub fn channel_posts() -> Self {
        Self {
            name: "fixture-channel",
            source_url: "https://fixtures.local/channel".to_string(),
            source_type: SourceType::Channel,
            raw: include_str!("../tests/fixtures/channel_posts.txt"),
        }
    }
}

#[cfg(feature = "ingest-fixtures")]
#[async_trait::async_trait]
impl SpanProvider for FixtureProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawSpan>> {
        let now = Utc::now();
        Ok(self
            .raw
            .split("\n---\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|text| RawSpan {
                source_url: self.source_url.clone(),
                source_type: self.source_type,
                fetched_at: now,
                text: text.to_string(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Build providers for the configured specs; fixture providers when the list
/// is empty and the feature is on.
pub fn build_providers(specs: &[SourceSpec]) -> Vec<Box<dyn SpanProvider>> {
    if !specs.is_empty() {
        return specs
            .iter()
            .map(|s| Box::new(WebProvider::new(s.clone())) as Box<dyn SpanProvider>)
            .collect();
    }
    #[cfg(feature = "ingest-fixtures")]
    {
        return vec![
            Box::new(FixtureProvider::web_news()),
            Box::new(FixtureProvider::channel_posts()),
        ];
    }
    #[cfg(not(feature = "ingest-fixtures"))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_toml_parses() {
        let file: SourcesFile = toml::from_str(
            r#"
[[source]]
name = "e1"
url = "https://www.e1.ru/text/"
source_type = "WEB"

[[source]]
name = "channel-mirror"
url = "https://t.me/s/example"
source_type = "CHANNEL"
"#,
        )
        .unwrap();
        assert_eq!(file.source.len(), 2);
        assert_eq!(file.source[1].source_type, SourceType::Channel);
    }

    #[cfg(feature = "ingest-fixtures")]
    #[tokio::test]
    async fn fixture_provider_yields_spans() {
        let spans = FixtureProvider::web_news().fetch_latest().await.unwrap();
        assert!(!spans.is_empty());
        assert!(spans.iter().all(|s| !s.text.trim().is_empty()));
    }
}
