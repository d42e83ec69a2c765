// Config loading and validation.
//
// Loads culvert.yaml, validates the contract version, applies environment
// overrides for the upstream endpoint, and computes a deterministic
// contract hash so a running instance can be tied back to the exact file
// it loaded.

use serde::Deserialize;
use sha2::{Digest, Sha256};

mod error;
mod source;

pub use error::ConfigError;
pub use source::{ConfigSource, FileSource, StringSource};

/// Environment variable that overrides `upstream.endpoint`.
pub const ENDPOINT_ENV: &str = "CULVERT_ENDPOINT";

// ---------------------------------------------------------------------------
// Raw deserialization shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    /// Contract version marker; must be "v1".
    culvert: String,
    #[serde(default)]
    upstream: RawUpstream,
    #[serde(default)]
    stream: RawStream,
    #[serde(default)]
    retry: RawRetry,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpstream {
    endpoint: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStream {
    first_event_timeout_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Typed config
// ---------------------------------------------------------------------------

/// Typed, validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub stream: StreamConfig,
    pub retry: RetryConfig,
    /// SHA-256 of the raw YAML bytes. Logged at startup.
    pub contract_hash: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Full URL of the backend generation endpoint.
    pub endpoint: String,
    /// Timeout for sending the request and receiving response headers.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// How long to wait for the first decoded event.
    pub first_event_timeout_ms: u64,
    /// How long to wait between transport chunks once streaming.
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total request attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a culvert config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA-256 contract hash
/// 3. Parse and validate the contract version
/// 4. Apply the `CULVERT_ENDPOINT` environment override
/// 5. Fill defaults and build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let contract_hash = compute_hash(&raw_yaml);

    let raw: RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.culvert != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported contract version \"{}\", expected \"v1\"",
            raw.culvert
        )));
    }

    let endpoint = std::env::var(ENDPOINT_ENV)
        .ok()
        .or(raw.upstream.endpoint)
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "upstream.endpoint is required (or set {ENDPOINT_ENV})"
            ))
        })?;

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "upstream.endpoint must be an http(s) URL, got \"{endpoint}\""
        )));
    }

    let retry = RetryConfig {
        max_attempts: raw.retry.max_attempts.unwrap_or(3),
        backoff_base_ms: raw.retry.backoff_base_ms.unwrap_or(250),
        backoff_cap_ms: raw.retry.backoff_cap_ms.unwrap_or(4_000),
    };
    if retry.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(Config {
        upstream: UpstreamConfig {
            endpoint,
            request_timeout_ms: raw.upstream.request_timeout_ms.unwrap_or(30_000),
        },
        stream: StreamConfig {
            first_event_timeout_ms: raw.stream.first_event_timeout_ms.unwrap_or(30_000),
            idle_timeout_ms: raw.stream.idle_timeout_ms.unwrap_or(60_000),
        },
        retry,
        contract_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}
