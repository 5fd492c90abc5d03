use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.gemini.embedding_model, "embedding-001");
    assert_eq!(config.gemini.chat_model, "gemini-1.5-flash");
    assert_eq!(config.gemini.embedding_dimension, 768);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.overlap, 100);
    assert_eq!(config.store.index_name, "coach-index-1");
    assert_eq!(config.store.similarity, Similarity::Cosine);
    assert_eq!(config.retrieval.top_k, 4);
    assert_eq!(config.server.allowed_origin, "http://localhost:3000");
    assert!(config.gemini.api_key.is_none());
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.gemini.base_url = "ftp://example.com".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.chat_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.batch_size = 101;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.gemini.embedding_dimension = 10;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.store.index_name = "bad name".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.server.bind = "not an address".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.server.allowed_origin = "localhost".to_string();
    assert!(invalid_config.validate().is_err());
}

#[test]
fn chunking_validation() {
    let mut config = Config::default();

    config.chunking.chunk_size = 10;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkSize(10))
    ));

    config.chunking.chunk_size = 200;
    config.chunking.overlap = 101;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(101, 200))
    ));

    config.chunking.overlap = 100;
    assert!(config.validate().is_ok());
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn api_key_is_never_serialized() {
    let mut config = Config::default();
    config.gemini.api_key = Some("secret-key".to_string());

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(!toml_str.contains("secret-key"));
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [store]
        index_name = "test-index"

        [retrieval]
        top_k = 8
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.store.index_name, "test-index");
    assert_eq!(parsed.store.similarity, Similarity::Cosine);
    assert_eq!(parsed.retrieval.top_k, 8);
    assert_eq!(parsed.gemini, GeminiConfig::default());
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.gemini, GeminiConfig::default());
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.retrieval.top_k = 6;
    config.answer.overflow_policy = OverflowPolicy::Reject;
    config.save().expect("should save config");

    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(reloaded.retrieval.top_k, 6);
    assert_eq!(reloaded.answer.overflow_policy, OverflowPolicy::Reject);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 100\noverlap = 90\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn environment_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        (API_KEY_ENV, "test-api-key"),
        (STORE_URI_ENV, "/tmp/other-vectors"),
    ]);

    let mut config = Config::default();
    config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

    assert_eq!(config.require_api_key().ok(), Some("test-api-key"));
    assert_eq!(config.store_uri(), "/tmp/other-vectors");
}

#[test]
fn mongodb_cluster_uri_is_flagged_without_store_uri() {
    let legacy: HashMap<&str, &str> =
        HashMap::from([(LEGACY_STORE_URI_ENV, "mongodb+srv://cluster.example.net")]);
    let lookup = |key: &str| legacy.get(key).map(|v| (*v).to_string());
    assert!(legacy_store_uri_ignored(&lookup));

    let mut config = Config::default();
    config.apply_overrides(lookup);
    assert!(config.store.uri.is_none());

    let both: HashMap<&str, &str> = HashMap::from([
        (LEGACY_STORE_URI_ENV, "mongodb+srv://cluster.example.net"),
        (STORE_URI_ENV, "/tmp/other-vectors"),
    ]);
    assert!(!legacy_store_uri_ignored(&|key: &str| both
        .get(key)
        .map(|v| (*v).to_string())));
}

#[test]
fn blank_environment_values_are_ignored() {
    let mut config = Config::default();
    config.apply_overrides(|_| Some("   ".to_string()));

    assert!(matches!(
        config.require_api_key(),
        Err(ConfigError::MissingApiKey)
    ));
    assert!(config.store.uri.is_none());
}

#[test]
fn default_store_uri_lives_under_base_dir() {
    let config = Config {
        base_dir: PathBuf::from("/data/docs-qa"),
        ..Config::default()
    };
    assert_eq!(config.store_uri(), "/data/docs-qa/vectors");
}

#[test]
fn call_timeout_uses_seconds() {
    let mut config = Config::default();
    config.timeouts.call_secs = 5;
    assert_eq!(config.call_timeout(), Duration::from_secs(5));
}
