//! Application configuration loaded from environment variables.
//!
//! Both endpoints default to the public Bitfinex API and can be overridden:
//! - `BITFINEX_WEBSOCKET_URL`: WebSocket V2 endpoint
//! - `BITFINEX_REST_URL`: REST V2 base URL

/// Default public WebSocket endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://api.bitfinex.com/ws/2";

/// Default public REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api-pub.bitfinex.com/v2";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub bitfinex: BitfinexConfig,
}

/// Bitfinex endpoint configuration.
#[derive(Debug)]
pub struct BitfinexConfig {
    pub websocket_url: String,
    pub rest_url: String,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`BitfeedError::Config`](crate::BitfeedError::Config) if the
/// WebSocket URL is not `ws://`/`wss://` or the REST URL is not
/// `http://`/`https://`.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("BITFINEX_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let rest_url =
        non_empty_var("BITFINEX_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string());

    if !has_scheme(&websocket_url, &["ws://", "wss://"]) {
        return Err(crate::BitfeedError::Config(format!(
            "BITFINEX_WEBSOCKET_URL must start with ws:// or wss://, got {websocket_url}"
        )));
    }
    if !has_scheme(&rest_url, &["http://", "https://"]) {
        return Err(crate::BitfeedError::Config(format!(
            "BITFINEX_REST_URL must start with http:// or https://, got {rest_url}"
        )));
    }

    Ok(AppConfig {
        bitfinex: BitfinexConfig {
            websocket_url,
            rest_url,
        },
    })
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes.iter().any(|scheme| url.starts_with(scheme))
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
