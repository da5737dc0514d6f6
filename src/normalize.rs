// src/normalize.rs
//! Text Normalizer: strips boilerplate lines from raw scraped spans and
//! enforces length bounds. Pure text transform over a data-driven rule table;
//! no network, no per-source branches.
//!
//! Idempotent on the text level: running `clean_text` over already-clean text
//! returns it unchanged (every pass is a line filter or a whitespace collapse,
//! both stable under repetition). HTML entity decoding is the one step that
//! is not a fixpoint (`&amp;lt;` decodes to `&lt;`, then to `<`), so it runs
//! exactly once, on the raw span in [`Normalizer::normalize`], never inside
//! `clean_text`.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::NormalizerConfig;
use crate::types::{CleanSpan, RawSpan};

/// Built-in boilerplate line patterns: copyright and media-registration
/// notices, contact lines, cookie/consent language, app-store mentions,
/// subscription prompts. Sourced from the noise observed on regional news
/// sites and channel mirrors.
const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)©\s*\d{4}",
    r"(?i)^версия\s+\S+",
    r"(?i)свидетельство о регистрации",
    r"(?i)сетевое издание",
    r"(?i)зарегистрировано",
    r"(?i)^учредитель",
    r"(?i)главный редактор",
    r"(?i)адрес электронной почты",
    r"(?i)^телефон[:\s]",
    r"(?i)фс\d{2}-\d{4,6}",
    r"(?i)роскомнадзор",
    r"(?i)информационное агентство",
    r"(?i)в\s+appstore",
    r"(?i)в\s+rustore",
    r"(?i)правила (использования|применения)",
    r"(?i)cookies?",
    r"(?i)\bкуки\b",
    r"(?i)персональн\w* данн",
    r"(?i)принимаю условия",
    r"(?i)согласие на обработку",
    r"(?i)подписаться|подписка|рассылк",
    r"(?i)^реклама\b",
    r"^\d{1,2}\s+[а-яё]+\s+\d{4}\s+года",
];

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
// Bare dates ("12.05.2024 ...") and bare reference numbers ("№ 123") carry no
// report content on their own.
static RE_BARE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}[./]\d{1,2}[./]\d{4}").unwrap());
static RE_BARE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^№?\s*\d+$").unwrap());

#[derive(Debug)]
pub struct Normalizer {
    patterns: Vec<Regex>,
    min_chars: usize,
    max_chars: usize,
}

impl Normalizer {
    /// Compile the built-in pattern table plus any configured extras.
    pub fn new(cfg: &NormalizerConfig) -> Result<Self> {
        let mut patterns = Vec::with_capacity(DEFAULT_PATTERNS.len() + cfg.extra_patterns.len());
        for p in DEFAULT_PATTERNS {
            patterns.push(Regex::new(p).expect("built-in boilerplate pattern"));
        }
        for p in &cfg.extra_patterns {
            let re =
                Regex::new(p).with_context(|| format!("compiling extra pattern `{}`", p))?;
            patterns.push(re);
        }
        Ok(Self {
            patterns,
            min_chars: cfg.min_chars,
            max_chars: cfg.max_chars,
        })
    }

    /// Strip boilerplate and collapse whitespace. Does not enforce length
    /// bounds and does not decode entities; see [`Normalizer::normalize`].
    pub fn clean_text(&self, text: &str) -> String {
        let untagged = RE_TAGS.replace_all(text, " ");

        let mut kept: Vec<String> = Vec::new();
        for line in untagged.lines() {
            let line = RE_WS.replace_all(line.trim(), " ").to_string();
            if line.is_empty() {
                continue;
            }
            if self.is_boilerplate_line(&line) {
                continue;
            }
            kept.push(line);
        }
        kept.join("\n")
    }

    fn is_boilerplate_line(&self, line: &str) -> bool {
        if self.patterns.iter().any(|re| re.is_match(line)) {
            return true;
        }
        // Contact lines: an email-looking token or a phone marker.
        if (line.contains('@') && (line.contains(".ru") || line.contains(".com")))
            || line.to_lowercase().contains("тел.")
        {
            return true;
        }
        RE_BARE_DATE.is_match(line) || RE_BARE_REF.is_match(line)
    }

    /// Full contract: clean, then reject spans whose remaining text falls
    /// outside the configured bounds (too short to be informative, or an
    /// implausibly long non-report dump).
    pub fn normalize(&self, span: &RawSpan) -> Option<CleanSpan> {
        // Entities decode once here, on raw ingress; channel mirrors leak
        // both entities and stray tags.
        let decoded = html_escape::decode_html_entities(&span.text);
        let text = self.clean_text(&decoded);
        let len = text.chars().count();
        if len < self.min_chars || len > self.max_chars {
            return None;
        }
        Some(CleanSpan {
            text,
            source_url: span.source_url.clone(),
            fetched_at: span.fetched_at,
        })
    }
}
