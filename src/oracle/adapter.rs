// src/oracle/adapter.rs
//! Classification Result Adapter: validates and repairs the oracle's
//! loosely-typed output into persisted [`Report`] records.
//!
//! The oracle drifts: fields go missing, `category` comes back null,
//! `criticality` arrives as a string. Every such case degrades to a fallback
//! value or to `None` (skip) — nothing here ever propagates an error past the
//! boundary, because one bad response must not abort a batch.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::AdapterConfig;
use crate::location::extract_location;
use crate::oracle::RawClassification;
use crate::types::{stable_id, Report, Sentiment};

/// Adapt one oracle result bag into a Report. Always succeeds: missing or
/// malformed fields get fallbacks, never rejections. `ordinal` is the bag's
/// position within the oracle response; it keeps ids distinct when one span
/// yields several classifications.
pub fn adapt(
    raw: &RawClassification,
    ordinal: usize,
    original_text: &str,
    source_url: &str,
    fetched_at: DateTime<Utc>,
    cfg: &AdapterConfig,
) -> Report {
    let empty_bag = is_empty_bag(raw);

    let text = match raw.summary.as_deref() {
        Some(s) if !s.trim().is_empty() => truncate_chars(s.trim(), cfg.max_text_chars),
        _ => truncate_chars(original_text, cfg.max_text_chars),
    };

    // Category is never empty in a persisted record. A bag with no usable
    // fields at all gets the generic news label; a merely-missing category
    // gets the narrower fallback. Downstream consumers filter on the label
    // instead of the pipeline dropping the record.
    let category = match coerce_string(raw.category.as_ref()) {
        Some(c) => c,
        None if empty_bag => cfg.null_bag_category.clone(),
        None => cfg.fallback_category.clone(),
    };

    let priority = coerce_priority(raw.criticality.as_ref());
    let sentiment = map_sentiment(raw.sentiment.as_deref());

    let location = match raw.location.as_deref() {
        Some(l) if !l.trim().is_empty() => l.trim().to_string(),
        _ => extract_location(original_text).unwrap_or_else(|| cfg.fallback_location.clone()),
    };

    // Verbatim oracle output survives coercion, for audit.
    let metadata = serde_json::json!({
        "oracle_response": serde_json::to_value(raw).unwrap_or(Value::Null),
        "source_url": source_url,
        "fetched_at": fetched_at.to_rfc3339(),
    });

    let comparison = crate::dedup::normalize_for_comparison(original_text);
    let key_prefix: String = comparison.chars().take(200).collect();
    // Ordinal zero keeps the plain key so the common single-result case
    // produces the same id across runs.
    let id = if ordinal == 0 {
        stable_id(&[&key_prefix, source_url])
    } else {
        stable_id(&[&key_prefix, source_url, &ordinal.to_string()])
    };

    Report {
        id,
        text,
        category,
        location,
        sentiment,
        priority,
        metadata,
        created_at: fetched_at,
        acknowledged: false,
    }
}

/// Adapt a full oracle response. Empty input means the oracle had nothing
/// parseable; the caller logs and moves on.
pub fn adapt_all(
    results: &[RawClassification],
    original_text: &str,
    source_url: &str,
    fetched_at: DateTime<Utc>,
    cfg: &AdapterConfig,
) -> Option<Vec<Report>> {
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .enumerate()
            .map(|(i, r)| adapt(r, i, original_text, source_url, fetched_at, cfg))
            .collect(),
    )
}

fn is_empty_bag(raw: &RawClassification) -> bool {
    raw.summary.as_deref().map_or(true, |s| s.trim().is_empty())
        && coerce_string(raw.category.as_ref()).is_none()
        && raw
            .criticality
            .as_ref()
            .map_or(true, |v| v.is_null())
        && raw.sentiment.as_deref().map_or(true, |s| s.trim().is_empty())
        && raw.location.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Non-empty string out of a Value that may be a string, null, or junk.
fn coerce_string(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Integer 0..=5 out of an int, a float, or a numeric string. Anything else
/// is 0 — a non-integer priority never reaches downstream.
fn coerce_priority(v: Option<&Value>) -> i64 {
    let n = match v {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    n.unwrap_or(0).clamp(0, 5)
}

/// Fixed source-language vocabulary to the three-way enum. Unrecognized
/// values are neutral.
fn map_sentiment(s: Option<&str>) -> Sentiment {
    let Some(s) = s else {
        return Sentiment::Neutral;
    };
    let lower = s.trim().to_lowercase();
    if lower.starts_with("негатив") {
        Sentiment::Negative
    } else if lower.starts_with("позитив") {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    }
}

/// Char-boundary-safe truncation.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> AdapterConfig {
        AdapterConfig::default()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 9, 0, 0).unwrap()
    }

    #[test]
    fn null_category_and_string_criticality_are_repaired() {
        let raw: RawClassification =
            serde_json::from_str(r#"{"category": null, "criticality": "3"}"#).unwrap();
        let report = adapt(
            &raw,
            0,
            "Во дворе дома на Ленина прорвало трубу, вода залила парковку.",
            "https://example.ru/1",
            at(),
            &cfg(),
        );
        assert_eq!(report.category, "Другое");
        assert_eq!(report.priority, 3);
        assert_eq!(report.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn empty_response_list_adapts_to_none() {
        assert!(adapt_all(&[], "текст", "https://example.ru", at(), &cfg()).is_none());
    }

    #[test]
    fn multi_result_response_yields_distinct_report_ids() {
        let results: Vec<RawClassification> = serde_json::from_str(
            r#"[{"category": "ЖКХ", "criticality": 3},
                {"category": "Дороги", "criticality": 2}]"#,
        )
        .unwrap();
        let text = "Прорыв трубы на Ленина размыл дорогу, перекрыто движение и отключена вода.";
        let reports = adapt_all(&results, text, "https://example.ru/3", at(), &cfg()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_ne!(reports[0].id, reports[1].id);
        // The first bag keeps the plain span key.
        let single = adapt(&results[0], 0, text, "https://example.ru/3", at(), &cfg());
        assert_eq!(reports[0].id, single.id);
    }

    #[test]
    fn empty_bag_gets_news_label() {
        let raw = RawClassification::default();
        let report = adapt(&raw, 0, "Просто текст без полей.", "u", at(), &cfg());
        assert_eq!(report.category, "Новости");
        assert!(!report.category.is_empty());
    }

    #[test]
    fn sentiment_vocabulary_mapping() {
        assert_eq!(map_sentiment(Some("негативная")), Sentiment::Negative);
        assert_eq!(map_sentiment(Some("Позитивная")), Sentiment::Positive);
        assert_eq!(map_sentiment(Some("нейтральная")), Sentiment::Neutral);
        assert_eq!(map_sentiment(Some("восторг")), Sentiment::Neutral);
        assert_eq!(map_sentiment(None), Sentiment::Neutral);
    }

    #[test]
    fn priority_out_of_range_is_clamped() {
        assert_eq!(coerce_priority(Some(&serde_json::json!(9))), 5);
        assert_eq!(coerce_priority(Some(&serde_json::json!(-2))), 0);
        assert_eq!(coerce_priority(Some(&serde_json::json!("мусор"))), 0);
        assert_eq!(coerce_priority(Some(&Value::Null)), 0);
        assert_eq!(coerce_priority(None), 0);
    }

    #[test]
    fn location_falls_back_to_extraction_then_city() {
        let raw = RawClassification {
            summary: Some("Яма на дороге".into()),
            ..Default::default()
        };
        let from_text = adapt(
            &raw,
            0,
            "Большая яма на улице Мира мешает проезду.",
            "u",
            at(),
            &cfg(),
        );
        assert_eq!(from_text.location, "ул. Мира");

        let nowhere = adapt(&raw, 0, "Яма на дороге мешает всем.", "u", at(), &cfg());
        assert_eq!(nowhere.location, "Екатеринбург");
    }

    #[test]
    fn summary_preferred_and_text_truncated() {
        let mut c = cfg();
        c.max_text_chars = 10;
        let raw = RawClassification {
            summary: Some("Краткая выжимка события в городе".into()),
            ..Default::default()
        };
        let report = adapt(&raw, 0, "оригинал", "u", at(), &c);
        assert_eq!(report.text.chars().count(), 10);

        let bare = RawClassification::default();
        let report = adapt(&bare, 0, "оригинальный текст новости", "u", at(), &c);
        assert_eq!(report.text, "оригинальн");
    }

    #[test]
    fn metadata_keeps_verbatim_response() {
        let raw: RawClassification =
            serde_json::from_str(r#"{"category": "ЖКХ", "emotion": "тревога"}"#).unwrap();
        let report = adapt(&raw, 0, "текст", "https://example.ru/2", at(), &cfg());
        assert_eq!(report.metadata["oracle_response"]["emotion"], "тревога");
        assert_eq!(report.metadata["source_url"], "https://example.ru/2");
    }
}
