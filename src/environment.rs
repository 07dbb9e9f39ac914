//! Decides where requests go and whether the API key may travel with them.
//!
//! A deployed instance talks to a same-origin proxy that holds the key
//! server-side. A local instance calls the Gemini API directly with the
//! locally configured key.

use reqwest::Url;
use tracing::{debug, warn};

use crate::config::Config;

pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
pub const PROXY_PATH: &str = "/api/generate";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
}

impl Mode {
    pub fn resolve(host: &str, scheme: &str) -> Self {
        let local = host.is_empty()
            || host == "localhost"
            || host.contains("127.0.0.1")
            || scheme.contains("file");

        if local {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Production => "production",
            Mode::Development => "development",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mode: Mode,
    pub url: String,
    /// Only ever set in development mode
    pub api_key: Option<String>,
}

impl Endpoint {
    pub fn resolve(config: &Config) -> Self {
        let (host, scheme, origin) = match config.origin.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match Url::parse(raw) {
                Ok(url) => (
                    url.host_str().unwrap_or_default().to_string(),
                    url.scheme().to_string(),
                    Some(url),
                ),
                Err(e) => {
                    warn!(origin = raw, error = %e, "Unparsable origin, assuming local");
                    (String::new(), String::new(), None)
                }
            },
            // No origin behaves like a page opened straight from disk
            _ => (String::new(), "file".to_string(), None),
        };

        let mode = Mode::resolve(&host, &scheme);

        let endpoint = match (mode, origin) {
            (Mode::Production, Some(origin)) => {
                let url = origin
                    .join(PROXY_PATH)
                    .map(String::from)
                    .unwrap_or_else(|_| format!("{}{}", origin.as_str().trim_end_matches('/'), PROXY_PATH));
                Self { mode, url, api_key: None }
            }
            _ => Self {
                mode: Mode::Development,
                url: config
                    .api_url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                api_key: config
                    .gemini_api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty()),
            },
        };

        debug!(mode = endpoint.mode.as_str(), url = %endpoint.url, "Resolved endpoint");
        endpoint
    }

    /// Development without a key cannot reach the API at all
    pub fn is_missing_key(&self) -> bool {
        self.mode == Mode::Development && self.api_key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hosts_are_development() {
        assert_eq!(Mode::resolve("localhost", "http"), Mode::Development);
        assert_eq!(Mode::resolve("127.0.0.1", "http"), Mode::Development);
        assert_eq!(Mode::resolve("", "https"), Mode::Development);
        assert_eq!(Mode::resolve("homework.example.com", "file"), Mode::Development);
    }

    #[test]
    fn test_unknown_hosts_are_production() {
        assert_eq!(Mode::resolve("homework.example.com", "https"), Mode::Production);
        assert_eq!(Mode::resolve("my-app.vercel.app", "https"), Mode::Production);
    }

    #[test]
    fn test_production_uses_proxy_without_key() {
        let config = Config {
            origin: Some("https://homework.example.com".to_string()),
            gemini_api_key: Some("secret".to_string()),
            ..Config::default()
        };
        let endpoint = Endpoint::resolve(&config);

        assert_eq!(endpoint.mode, Mode::Production);
        assert_eq!(endpoint.url, "https://homework.example.com/api/generate");
        assert!(endpoint.api_key.is_none());
        assert!(!endpoint.is_missing_key());
    }

    #[test]
    fn test_no_origin_is_development_with_default_url() {
        let config = Config {
            gemini_api_key: Some("secret".to_string()),
            ..Config::default()
        };
        let endpoint = Endpoint::resolve(&config);

        assert_eq!(endpoint.mode, Mode::Development);
        assert_eq!(endpoint.url, DEFAULT_API_URL);
        assert_eq!(endpoint.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_localhost_origin_honours_api_url_override() {
        let config = Config {
            origin: Some("http://localhost:3000".to_string()),
            api_url: Some("http://127.0.0.1:9000/generate".to_string()),
            ..Config::default()
        };
        let endpoint = Endpoint::resolve(&config);

        assert_eq!(endpoint.mode, Mode::Development);
        assert_eq!(endpoint.url, "http://127.0.0.1:9000/generate");
        assert!(endpoint.is_missing_key());
    }

    #[test]
    fn test_garbage_origin_falls_back_to_development() {
        let config = Config {
            origin: Some("not a url".to_string()),
            ..Config::default()
        };
        assert_eq!(Endpoint::resolve(&config).mode, Mode::Development);
    }
}
