//! Environment-driven configuration for the OAuth/MCP core.
//!
//! Follows the same `from_env` + production-guardrail shape the rest of
//! the application uses for its session configuration: read once at
//! startup, panic loudly on a misconfigured production deployment
//! rather than silently falling back to something insecure.

use std::env;

use tracing::warn;

/// The development placeholder bind address. Treated as "unset" when
/// deriving the public base URL so discovery metadata never advertises
/// an unroutable address.
pub const PLACEHOLDER_BASE_URL: &str = "http://0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Configured public base URL, already normalized: `None` if unset
    /// or equal to `PLACEHOLDER_BASE_URL`.
    pub public_base_url: Option<String>,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://oauth_gateway.db".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|v| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty() && v != PLACEHOLDER_BASE_URL);

        Self {
            database_url,
            public_base_url,
            environment,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// The base URL discovery metadata should advertise: the configured
    /// public URL if set, else derived from the request's own scheme and
    /// host (§4.6, §9).
    pub fn resolve_base_url(&self, request_scheme: &str, request_host: &str) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("{request_scheme}://{request_host}"))
    }

    /// Panics on an insecure production configuration. Call once at startup.
    pub fn validate_production(&self) {
        if !self.is_production() {
            return;
        }

        if self.public_base_url.is_none() {
            panic!("FATAL: PUBLIC_BASE_URL must be set to a real, routable URL in production");
        }

        if let Some(base) = &self.public_base_url {
            if !base.starts_with("https://") {
                warn!(base_url = %base, "production PUBLIC_BASE_URL is not https://; OAuth redirects will not be secure");
            }
        }
    }
}
