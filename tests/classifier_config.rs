// tests/classifier_config.rs
//
// Factory behavior for the classifier client. Tests that touch the
// CLASSIFIER_TEST_MODE environment variable run serially.

use municipal_monitor::oracle::{build_classifier_from_config, Classifier as _, ClassifierConfig};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn disabled_config_yields_disabled_client() {
    std::env::remove_var("CLASSIFIER_TEST_MODE");
    let cfg = ClassifierConfig {
        enabled: false,
        ..ClassifierConfig::default()
    };
    let client = build_classifier_from_config(&cfg);
    assert_eq!(client.provider_name(), "disabled");
    assert!(client.classify("текст", "", "", "").await.is_empty());
}

#[tokio::test]
#[serial]
async fn unknown_provider_falls_back_to_disabled() {
    std::env::remove_var("CLASSIFIER_TEST_MODE");
    let cfg = ClassifierConfig {
        enabled: true,
        provider: Some("carrier-pigeon".to_string()),
        ..ClassifierConfig::default()
    };
    let client = build_classifier_from_config(&cfg);
    assert_eq!(client.provider_name(), "disabled");
}

#[tokio::test]
#[serial]
async fn test_mode_env_overrides_config() {
    std::env::set_var("CLASSIFIER_TEST_MODE", "mock");
    let cfg = ClassifierConfig {
        enabled: false,
        ..ClassifierConfig::default()
    };
    let client = build_classifier_from_config(&cfg);
    assert_eq!(client.provider_name(), "mock");
    let results = client.classify("тестовый текст запроса", "", "", "").await;
    assert!(!results.is_empty());
    std::env::remove_var("CLASSIFIER_TEST_MODE");
}
