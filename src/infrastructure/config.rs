use std::time::Duration;

const ENV_VAR: &str = "DAYBOOK_ENV";
const API_URL_VAR: &str = "DAYBOOK_API_URL";
const CANVAS_TIMEOUT_VAR: &str = "DAYBOOK_CANVAS_TIMEOUT_SECS";

const DEV_BASE_URL: &str = "http://localhost:3000";
const PROD_BASE_URL: &str = "https://api.daybook.app";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

// Upper bound for the external-data link operation; the backend performs
// server-side batch work, so this is deliberately order-of-minutes.
const DEFAULT_CANVAS_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_VAR).ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("production") => Self::Production,
            Some(value) if value.eq_ignore_ascii_case("test") => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u8,
    pub retry_base_delay: Duration,
}

impl ApiConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self::resolve(environment, std::env::var(API_URL_VAR).ok())
    }

    pub fn resolve(environment: Environment, base_url_override: Option<String>) -> Self {
        let base_url = base_url_override
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default_base_url(environment).to_string());

        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: default_retries(environment),
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }

    /// Profile for the external-account linking endpoints: no retries (the
    /// operation is not idempotent) and a much longer timeout ceiling.
    pub fn canvas_profile(environment: Environment) -> Self {
        let timeout_secs = std::env::var(CANVAS_TIMEOUT_VAR)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CANVAS_TIMEOUT_SECS);

        Self {
            timeout: Duration::from_secs(timeout_secs),
            retries: 0,
            ..Self::for_environment(environment)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
}

fn default_base_url(environment: Environment) -> &'static str {
    match environment {
        Environment::Development | Environment::Test => DEV_BASE_URL,
        Environment::Production => PROD_BASE_URL,
    }
}

fn default_retries(environment: Environment) -> u8 {
    match environment {
        Environment::Development => 3,
        Environment::Production => 2,
        Environment::Test => 1,
    }
}
