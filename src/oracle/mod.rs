// src/oracle/mod.rs
//! Oracle boundary: the external NLP classification service, treated as an
//! untrusted, sometimes-wrong collaborator.
//!
//! Provider abstraction + file cache + daily call quota. The remote call is
//! blocking-with-timeout and has no retry loop; a failed call yields an empty
//! result and the pipeline moves on.

pub mod adapter;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::stable_id;

/// Loosely-typed field bag returned by the oracle. Field shapes drift; the
/// adapter owns all validation and coercion. Unknown fields are preserved in
/// `extra` so the verbatim response survives into report metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawClassification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// May be a string, null, or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<serde_json::Value>,
    /// May be an integer, a numeric string, null, or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Public client trait used by the pipeline. Returns an empty vec on any
/// failure — the oracle boundary never raises.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        source_url: &str,
        source_name: &str,
        parse_time: &str,
    ) -> Vec<RawClassification>;
    fn provider_name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Runtime config loaded from `config/classifier.json`. Parse failures fall
/// back to the disabled default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub enabled: bool,
    /// "remote" is the only real provider; anything else disables.
    pub provider: Option<String>,
    /// Per-day call quota; defaults to 200 if absent.
    pub daily_limit: Option<u32>,
    /// Chat-completions style endpoint.
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            daily_limit: Some(200),
            endpoint: None,
            model: None,
        }
    }
}

pub fn load_classifier_config() -> ClassifierConfig {
    let path = Path::new("config/classifier.json");
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ClassifierConfig::default(),
    }
}

/// Factory: build a client according to config and environment.
///
/// * `CLASSIFIER_TEST_MODE=mock` returns a deterministic mock.
/// * `enabled==false` returns a disabled client.
/// * Otherwise the remote provider wrapped with caching + daily quota.
pub fn build_classifier_from_config(config: &ClassifierConfig) -> DynClassifier {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider {
            fixed: vec![RawClassification {
                summary: Some("Тестовая выжимка".to_string()),
                category: Some(serde_json::Value::String("ЖКХ".to_string())),
                criticality: Some(serde_json::json!(1)),
                sentiment: Some("нейтральная".to_string()),
                location: None,
                extra: serde_json::Map::new(),
            }],
        };
        let client =
            CachingClassifier::new(mock, default_cache_dir(), config.daily_limit.unwrap_or(200));
        return Arc::new(client);
    }

    if !config.enabled {
        return Arc::new(DisabledClassifier);
    }

    match config.provider.as_deref() {
        Some("remote") => {
            let provider = RemoteProvider::new(config.endpoint.clone(), config.model.clone());
            let client = CachingClassifier::new(
                provider,
                default_cache_dir(),
                config.daily_limit.unwrap_or(200),
            );
            Arc::new(client)
        }
        _ => Arc::new(DisabledClassifier),
    }
}

pub fn build_classifier() -> DynClassifier {
    let cfg = load_classifier_config();
    build_classifier_from_config(&cfg)
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider doing the real remote call, separated so the same
/// caching wrapper serves production and tests.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn fetch(&self, input: &str) -> Vec<RawClassification>;
    fn name(&self) -> &'static str;
}

/// Remote chat-completions provider. Requires `CLASSIFIER_API_KEY`.
pub struct RemoteProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

const DEFAULT_ENDPOINT: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "GigaChat";

const SYSTEM_PROMPT: &str = "Ты помощник дашборда Главы города. Верни ОДИН JSON объект с краткой выжимкой новости.\n\
Поля JSON:\n\
- summary: краткое описание (1-2 предложения) — ЧТО произошло\n\
- category: одна категория (ЖКХ, Транспорт, Дороги, Благоустройство, Образование, Здравоохранение, Безопасность, Другое)\n\
- criticality: целое число от 0 до 5\n\
- sentiment: 'негативная', 'позитивная' или 'нейтральная'\n\
- location: улица/район/место из текста, иначе null";

impl RemoteProvider {
    pub fn new(endpoint: Option<String>, model: Option<String>) -> Self {
        let api_key = std::env::var("CLASSIFIER_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("municipal-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for RemoteProvider {
    async fn fetch(&self, input: &str) -> Vec<RawClassification> {
        if self.api_key.is_empty() {
            return Vec::new();
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.1,
            max_tokens: 500,
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, "classifier request failed");
                return Vec::new();
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "classifier returned non-success");
            return Vec::new();
        }
        let body: Resp = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = ?e, "classifier response body unreadable");
                return Vec::new();
            }
        };
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        extract_json_objects(content)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Returns empty always; used when the classifier is disabled.
pub struct DisabledClassifier;

#[async_trait::async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _: &str, _: &str, _: &str, _: &str) -> Vec<RawClassification> {
        Vec::new()
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: Vec<RawClassification>,
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn fetch(&self, _input: &str) -> Vec<RawClassification> {
        self.fixed.clone()
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Brace-scanning JSON extraction
// ------------------------------------------------------------

/// Pull balanced `{...}` objects out of a free-form completion. The model
/// wraps its JSON in prose or code fences often enough that plain
/// `serde_json::from_str` on the whole reply is a losing game; malformed
/// objects are skipped, not fatal.
pub fn extract_json_objects(text: &str) -> Vec<RawClassification> {
    let mut out = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, &ch) in bytes.iter().enumerate() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        let candidate: String = bytes[start..=i].iter().collect();
                        if let Ok(obj) = serde_json::from_str::<RawClassification>(&candidate) {
                            out.push(obj);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily quota)
// ------------------------------------------------------------

pub struct CachingClassifier<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClassifier<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir);
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn classify_impl(&self, input: &str) -> Vec<RawClassification> {
        // Cache first: hits are free and ignore the quota.
        let key = cache_key(input);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return hit;
        }

        // Only real calls count against the daily quota.
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                tracing::warn!("classifier daily quota exhausted");
                return Vec::new();
            }
        }

        let fresh = self.inner.fetch(input).await;
        if !fresh.is_empty() {
            let _ = write_cache_file(&self.cache_dir, &key, &fresh);
            let mut g = self.counter.lock().expect("poisoned counter");
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        fresh
    }
}

#[async_trait::async_trait]
impl<P: Provider> Classifier for CachingClassifier<P> {
    async fn classify(
        &self,
        text: &str,
        _source_url: &str,
        _source_name: &str,
        _parse_time: &str,
    ) -> Vec<RawClassification> {
        self.classify_impl(text).await
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/classifier")
}

fn cache_key(input: &str) -> String {
    // sha2-based so keys are stable across runs (DefaultHasher output is not).
    stable_id(&[input])
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Vec<RawClassification>> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &[RawClassification]) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    Ok(serde_json::from_str(&s)?)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
