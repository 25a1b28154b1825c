use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Backend ledger gateway
    pub gateway_url: String,
    pub gateway_timeout_secs: u64,

    // Security
    pub session_secret: Secret<String>,
    pub token_salt: String,
    pub secure_cookies: bool,

    // Paging windows
    pub cards_page_size: u64,
    pub requests_page_size: u64,
    pub pending_scan_window: u64,
    pub pending_count_window: u64,
    pub stats_window: u64,

    // Session-scoped guards and caches
    pub submitted_ttl_secs: u64,
    pub submitted_capacity: usize,
    pub counters_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("gateway_timeout_secs", 30)?
            .set_default("token_salt", "cardconsole")?
            .set_default("secure_cookies", false)?
            .set_default("cards_page_size", 5)?
            .set_default("requests_page_size", 10)?
            .set_default("pending_scan_window", 1000)?
            .set_default("pending_count_window", 100)?
            .set_default("stats_window", 1000)?
            .set_default("submitted_ttl_secs", 120)?
            .set_default("submitted_capacity", 256)?
            .set_default("counters_ttl_secs", 30)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            host: config.get("host")?,
            port: config.get("port")?,

            gateway_url: config.get("gateway_url")?,
            gateway_timeout_secs: config.get("gateway_timeout_secs")?,

            session_secret: Secret::new(config.get("session_secret")?),
            token_salt: config.get("token_salt")?,
            secure_cookies: config.get("secure_cookies")?,

            cards_page_size: config.get("cards_page_size")?,
            requests_page_size: config.get("requests_page_size")?,
            pending_scan_window: config.get("pending_scan_window")?,
            pending_count_window: config.get("pending_count_window")?,
            stats_window: config.get("stats_window")?,

            submitted_ttl_secs: config.get("submitted_ttl_secs")?,
            submitted_capacity: config.get("submitted_capacity")?,
            counters_ttl_secs: config.get("counters_ttl_secs")?,
        })
    }

    /// Defaults for everything except the gateway location and secret
    pub fn with_gateway(gateway_url: impl Into<String>, session_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            gateway_url: gateway_url.into(),
            gateway_timeout_secs: 30,
            session_secret: Secret::new(session_secret.into()),
            token_salt: "cardconsole".to_string(),
            secure_cookies: false,
            cards_page_size: 5,
            requests_page_size: 10,
            pending_scan_window: 1000,
            pending_count_window: 100,
            stats_window: 1000,
            submitted_ttl_secs: 120,
            submitted_capacity: 256,
            counters_ttl_secs: 30,
        }
    }
}
