//! M-Pesa credentials and endpoint selection.

use std::env;
use std::time::Duration;

const SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_URL: &str = "https://api.safaricom.co.ke";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(MpesaEnvironment::Sandbox),
            "production" => Some(MpesaEnvironment::Production),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => SANDBOX_URL,
            MpesaEnvironment::Production => PRODUCTION_URL,
        }
    }
}

/// Credentials and endpoints for STK push.
#[derive(Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
    pub base_url: String,
    pub timeout: Duration,
}

// Secrets stay out of logs.
impl std::fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("short_code", &self.short_code)
            .field("callback_url", &self.callback_url)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MpesaConfig {
    /// Loads configuration from environment variables.
    ///
    /// Returns `None` when any required variable is missing or blank.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let required = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match lookup("MPESA_ENVIRONMENT") {
            Some(raw) => MpesaEnvironment::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown MPESA_ENVIRONMENT, using sandbox");
                MpesaEnvironment::Sandbox
            }),
            None => MpesaEnvironment::Sandbox,
        };

        let timeout_secs = lookup("MPESA_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Some(Self {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            short_code: required("MPESA_SHORTCODE")?,
            passkey: required("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
            base_url: environment.base_url().to_string(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
