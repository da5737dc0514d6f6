// src/location.rs
//! Location extraction fallback: when the oracle omits `location`, try to pull
//! a street or district mention out of the report text before falling back to
//! the city-wide label.
//!
//! Deliberately shallow — a couple of street-prefix regexes plus a fixed list
//! of district names. No geocoding, no fuzzy matching.

use once_cell::sync::Lazy;
use regex::Regex;

// Street mentions: "ул. Ленина", "улице Малышева, 31", "проспект Космонавтов",
// "пер. Банковский". Capture the name (and an optional house number). No (?i):
// the name must be capitalized, otherwise the capture swallows the following
// lowercase word.
static RE_STREET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:[Уу]л\.?|[Уу]лиц[аеыу]|[Пп]росп\.?|[Пп]роспект[аеу]?|пр-т|[Пп]ер\.?|[Пп]ереулок|[Бб]ульвар[аеу]?|б-р)\s+([А-ЯЁ][а-яё]+(?:\s[А-ЯЁ][а-яё]+)?)(?:[,\s]+(\d{1,3}[а-я]?))?",
    )
    .unwrap()
});

// "в районе Уралмаша", "микрорайон Солнечный".
static RE_DISTRICT_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[Мм]икрорайон[ае]?|[Рр]айон[ае]?)\s+([А-ЯЁ][а-яё]+(?:\s[Рр]ечка)?)").unwrap()
});

// Colloquial district names used without the word "район".
const DISTRICTS: &[&str] = &[
    "Уралмаш",
    "Эльмаш",
    "Ботаника",
    "ВИЗ",
    "Химмаш",
    "Академический",
    "Пионерский",
    "Компрессорный",
    "Втузгородок",
    "ЖБИ",
    "Широкая Речка",
    "Солнечный",
    "Сортировка",
    "Юго-Западный",
];

/// Best-effort location from free text. `None` when nothing matches.
pub fn extract_location(text: &str) -> Option<String> {
    if let Some(caps) = RE_STREET.captures(text) {
        let name = caps.get(1)?.as_str();
        let loc = match caps.get(2) {
            Some(num) => format!("ул. {}, {}", name, num.as_str()),
            None => format!("ул. {}", name),
        };
        return Some(loc);
    }
    if let Some(caps) = RE_DISTRICT_WORD.captures(text) {
        return Some(caps.get(1)?.as_str().to_string());
    }
    for d in DISTRICTS {
        if text.contains(d) {
            return Some((*d).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_street_with_house_number() {
        let loc = extract_location("Прорыв трубы на улице Малышева, 31 — двор затоплен.");
        assert_eq!(loc.as_deref(), Some("ул. Малышева, 31"));
    }

    #[test]
    fn finds_abbreviated_street() {
        let loc = extract_location("Яма на ул. Ленина мешает проезду автобусов.");
        assert_eq!(loc.as_deref(), Some("ул. Ленина"));
    }

    #[test]
    fn finds_bare_district_name() {
        let loc = extract_location("На Уралмаше снова отключили горячую воду.");
        assert_eq!(loc.as_deref(), Some("Уралмаш"));
    }

    #[test]
    fn none_when_no_place_mentioned() {
        assert!(extract_location("Городская дума утвердила бюджет на следующий год.").is_none());
    }
}
