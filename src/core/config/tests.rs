use super::*;
use crate::test_support::{env_lock, set_test_env};

#[tokio::test]
async fn defaults_load_without_any_configuration() {
    let _guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    assert_eq!(settings.server_addr(), "0.0.0.0:8000");
    assert_eq!(settings.runtime().environment, Environment::Test);
    assert_eq!(settings.api().api_v1_str, "/api/v1");
    assert_eq!(settings.ai().grading_model, "gemini-2.5-flash");
    assert_eq!(settings.ai().image_model, "imagen-4.0-generate-001");
    assert_eq!(settings.ai().max_retries, 3);
    assert!(settings.ai().visual_aid_enabled);
    assert_eq!(settings.grading().concurrency, 1);
    assert_eq!(settings.grading().default_context, "Grade this math problem.");
    assert_eq!(settings.storage().max_submissions, 200);
    assert_eq!(settings.storage().max_upload_bytes(), 10 * 1024 * 1024);
    assert_eq!(
        settings.storage().allowed_image_extensions,
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string(), "webp".to_string()]
    );
}

#[tokio::test]
async fn strict_mode_requires_api_key() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("GRADER_STRICT_CONFIG", "1");

    let err = Settings::load().unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecret("GEMINI_API_KEY")));

    std::env::set_var("GEMINI_API_KEY", "test-key");
    assert!(Settings::load().is_ok());
    set_test_env();
}

#[tokio::test]
async fn production_implies_strict() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("GRADER_ENV", "prod");

    let err = Settings::load().unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecret(_)));
    set_test_env();
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("GRADING_CONCURRENCY", "0");

    let err = Settings::load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "GRADING_CONCURRENCY", .. }));
    set_test_env();
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("ALLOWED_IMAGE_EXTENSIONS", "png,pdf");

    let err = Settings::load().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue { field: "ALLOWED_IMAGE_EXTENSIONS", ref value } if value == "pdf"
    ));
    set_test_env();
}

#[tokio::test]
async fn invalid_port_is_rejected() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("GRADER_PORT", "0");

    assert!(matches!(Settings::load().unwrap_err(), ConfigError::InvalidPort(_)));
    set_test_env();
}

#[tokio::test]
async fn retry_count_is_bounded() {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("AI_MAX_RETRIES", "40");

    let err = Settings::load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "AI_MAX_RETRIES", .. }));

    std::env::set_var("AI_MAX_RETRIES", "10");
    assert_eq!(Settings::load().expect("settings").ai().max_retries, 10);
    set_test_env();
}
