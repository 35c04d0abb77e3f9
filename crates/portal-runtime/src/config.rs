//! Runtime configuration.

use portal_realtime::ChannelConfig;

const DEFAULT_API_URL: &str = "https://api.portal.app";

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// REST API root.
    pub api_base_url: String,
    /// Realtime channel settings.
    pub channel: ChannelConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            channel: ChannelConfig::default(),
        }
    }
}

impl PortalConfig {
    /// Build the default configuration with `PORTAL_API_URL` and
    /// `PORTAL_CHANNEL_URL` environment overrides applied.
    ///
    /// When only the API URL is overridden, the channel URL follows it
    /// (`https://host` becomes `wss://host/ws`).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = env_override("PORTAL_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
            if let Some(channel_url) = channel_url_for(&config.api_base_url) {
                config.channel.url = channel_url;
            }
        }
        if let Some(url) = env_override("PORTAL_CHANNEL_URL") {
            config.channel.url = url;
        }

        config
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Derive the websocket endpoint for an API root.
fn channel_url_for(api_base_url: &str) -> Option<String> {
    let mut parsed = url::Url::parse(api_base_url).ok()?;
    let scheme = match parsed.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    parsed.set_scheme(scheme).ok()?;
    parsed.set_path("/ws");
    Some(parsed.to_string())
}
