// src/content.rs
//! Content Classifier: a cheap, local keyword heuristic that labels a span's
//! content type for telemetry.
//!
//! The admission decision is deliberately separate and length-only. Keyword
//! lists are a poor proxy for relevance on short colloquial text, and
//! keyword-based pre-filtering produced false negatives in production, so the
//! heuristic never gates a span — the oracle stays authoritative and every
//! long-enough span goes through. Downstream consumers filter on oracle
//! categories instead.

use metrics::counter;
use serde::Deserialize;

use crate::config::ContentConfig;

/// Content type assigned by the heuristic. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    MunicipalProblem,
    Commercial,
    Event,
    General,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::MunicipalProblem => "municipal_problem",
            ContentType::Commercial => "commercial",
            ContentType::Event => "event",
            ContentType::General => "general",
        }
    }
}

/// Three disjoint keyword sets; data, overridable from config.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSets {
    pub municipal: Vec<String>,
    pub commercial: Vec<String>,
    pub event: Vec<String>,
}

impl Default for KeywordSets {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            municipal: list(&[
                "авария",
                "прорыв",
                "затопление",
                "отключение",
                "не работает",
                "свалка",
                "мусор",
                "яма",
                "дорог",
                "светофор",
                "лифт",
                "отопление",
                "вода",
                "свет",
                "электричество",
                "тепло",
                "жалоба",
                "обращение",
                "проблема",
                "инцидент",
                "дтп",
                "уборка",
                "благоустройство",
                "жкх",
                "коммуналка",
                "крыша",
                "труба",
                "канализация",
                "утечка",
                "засор",
            ]),
            commercial: list(&[
                "акция",
                "скидка",
                "распродажа",
                "открытие",
                "запуск",
                "новинка",
                "коллекция",
                "магазин",
                "ресторан",
                "продукт",
                "услуга",
                "цена",
                "купить",
                "заказ",
            ]),
            event: list(&[
                "фестиваль",
                "концерт",
                "выставка",
                "мероприятие",
                "праздник",
                "соревнование",
                "турнир",
                "шоу",
                "спектакль",
            ]),
        }
    }
}

#[derive(Debug)]
pub struct ContentClassifier {
    keywords: KeywordSets,
    min_chars: usize,
}

impl ContentClassifier {
    pub fn new(cfg: &ContentConfig) -> Self {
        Self {
            keywords: cfg.keywords.clone(),
            min_chars: cfg.min_chars,
        }
    }

    /// Length-only admission gate. Never rejects on keyword type.
    pub fn admit(&self, text: &str) -> bool {
        text.chars().count() >= self.min_chars
    }

    /// Classify the span's content type from keyword-set match counts.
    pub fn classify(&self, text: &str) -> ContentType {
        let lower = text.to_lowercase();
        let count = |set: &[String]| set.iter().filter(|w| lower.contains(w.as_str())).count();

        let municipal = count(&self.keywords.municipal);
        let commercial = count(&self.keywords.commercial);
        let event = count(&self.keywords.event);

        if municipal >= 2 {
            ContentType::MunicipalProblem
        } else if commercial >= 2 {
            ContentType::Commercial
        } else if event >= 1 {
            ContentType::Event
        } else {
            ContentType::General
        }
    }

    /// Classify and record the content-type counter for telemetry.
    pub fn classify_and_count(&self, text: &str) -> ContentType {
        let ty = self.classify(text);
        counter!("ingest_content_type_total", "content_type" => ty.as_str()).increment(1);
        ty
    }
}
