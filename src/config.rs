//! Service settings.
//!
//! Sources, lowest to highest precedence: built-in defaults, a YAML file,
//! `A3S_SERP_*` environment variables, then command-line flags (applied by
//! the binary). Settings are not mutated once the service is running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{EngineOptions, Result, SearchError};

/// Environment variable naming the YAML file.
pub const CONFIG_ENV: &str = "A3S_SERP_CONFIG";

/// File looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const ENV_HOST: &str = "A3S_SERP_HOST";
const ENV_PORT: &str = "A3S_SERP_PORT";
const ENV_PROXY: &str = "A3S_SERP_PROXY";
const ENV_INSECURE: &str = "A3S_SERP_INSECURE";
const ENV_RAW: &str = "A3S_SERP_RAW";

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on how long shutdown waits for in-flight requests.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7000,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Scraping behaviour shared by every engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Skip the browser and fetch result pages over the raw transport.
    pub raw_requests: bool,
    pub headless: bool,
    pub stealth: bool,
    /// Kill the browser process on release instead of trusting it to exit.
    pub leakless: bool,
    /// Keep result pages open after extraction, for debugging.
    pub leave_page_open: bool,
    pub proxy_url: Option<String>,
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    pub chrome_path: Option<String>,
    /// Concurrently open browser pages.
    pub max_pages: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            raw_requests: false,
            headless: true,
            stealth: true,
            leakless: true,
            leave_page_open: false,
            proxy_url: None,
            insecure: false,
            chrome_path: None,
            max_pages: 8,
        }
    }
}

/// External CAPTCHA solver credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaSettings {
    pub api_key: Option<String>,
}

/// Complete service settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub app: AppSettings,
    pub captcha: CaptchaSettings,
    /// Per-engine overrides keyed by engine name.
    pub engines: HashMap<String, EngineOptions>,
}

impl Settings {
    /// Parses settings from YAML. Missing sections keep their defaults.
    pub fn from_yaml(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(source).map_err(|e| SearchError::Config(e.to_string()))
    }

    /// Reads settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_yaml(&source)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    /// Loads the file (if any) and applies environment overrides.
    ///
    /// An explicitly named file must exist; the working-directory default is
    /// optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut settings = match config_path(explicit, env_path.as_deref()) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Applies `A3S_SERP_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            self.server.port = port
                .parse()
                .map_err(|_| SearchError::Config(format!("{} is not a port: {}", ENV_PORT, port)))?;
        }
        if let Some(proxy) = lookup(ENV_PROXY) {
            self.app.proxy_url = Some(proxy).filter(|v| !v.is_empty());
        }
        if let Some(value) = lookup(ENV_INSECURE) {
            self.app.insecure = parse_flag(ENV_INSECURE, &value)?;
        }
        if let Some(value) = lookup(ENV_RAW) {
            self.app.raw_requests = parse_flag(ENV_RAW, &value)?;
        }
        Ok(())
    }

    /// Checks values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.app.max_pages == 0 {
            return Err(SearchError::Config("app.max_pages must be at least 1".into()));
        }
        if let Some(proxy) = &self.app.proxy_url {
            let url = url::Url::parse(proxy)?;
            if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(SearchError::Config(format!(
                    "unsupported proxy scheme: {}",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Browser session parameters derived from the `app` section.
    #[cfg(feature = "headless")]
    pub fn session_config(&self) -> crate::browser::BrowserSessionConfig {
        crate::browser::BrowserSessionConfig {
            headless: self.app.headless,
            stealth: self.app.stealth,
            leakless: self.app.leakless,
            leave_page_open: self.app.leave_page_open,
            proxy_url: self.app.proxy_url.clone(),
            insecure: self.app.insecure,
            chrome_path: self.app.chrome_path.clone(),
            max_pages: self.app.max_pages,
            ..Default::default()
        }
    }
}

fn config_path(explicit: Option<&Path>, env_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit.or(env_path) {
        return Some(path.to_path_buf());
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.is_file().then_some(fallback)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(SearchError::Config(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.addr(), "127.0.0.1:7000");
        assert_eq!(settings.server.shutdown_grace(), Duration::from_secs(10));
        assert!(!settings.app.raw_requests);
        assert!(settings.app.headless);
        assert!(settings.app.leakless);
        assert_eq!(settings.app.max_pages, 8);
        assert!(settings.captcha.api_key.is_none());
        assert!(settings.engines.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 8080
app:
  raw_requests: true
  proxy_url: socks5://127.0.0.1:1080
engines:
  brave:
    rate_burst: 2
    timeout_ms: 15000
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.app.raw_requests);
        assert!(settings.app.stealth);
        assert_eq!(settings.app.proxy_url.as_deref(), Some("socks5://127.0.0.1:1080"));

        let brave = settings.engines["brave"];
        assert_eq!(brave.rate_burst, 2);
        assert_eq!(brave.timeout_ms, 15_000);
        assert_eq!(brave.rate_interval_ms, 0);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml("").unwrap(), Settings::default());
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = Settings::from_yaml("server: [1, 2").unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                (ENV_HOST, "0.0.0.0"),
                (ENV_PORT, "9000"),
                (ENV_PROXY, "http://proxy:3128"),
                (ENV_INSECURE, "true"),
                (ENV_RAW, "1"),
            ]))
            .unwrap();
        assert_eq!(settings.server.addr(), "0.0.0.0:9000");
        assert_eq!(settings.app.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert!(settings.app.insecure);
        assert!(settings.app.raw_requests);
    }

    #[test]
    fn test_env_empty_proxy_clears() {
        let mut settings = Settings::default();
        settings.app.proxy_url = Some("http://from-file:1".into());
        settings.apply_env(env(&[(ENV_PROXY, "")])).unwrap();
        assert!(settings.app.proxy_url.is_none());
    }

    #[test]
    fn test_env_bad_values() {
        let mut settings = Settings::default();
        assert!(settings.apply_env(env(&[(ENV_PORT, "seventy")])).is_err());
        assert!(settings.apply_env(env(&[(ENV_RAW, "maybe")])).is_err());
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        assert_ok!(settings.validate());

        settings.app.proxy_url = Some("ftp://proxy:21".into());
        assert_err!(settings.validate());

        settings.app.proxy_url = Some("socks5://proxy:1080".into());
        assert_ok!(settings.validate());

        settings.app.max_pages = 0;
        assert_err!(settings.validate());
    }

    #[test]
    fn test_config_path_precedence() {
        let explicit = Path::new("/etc/a3s/explicit.yaml");
        let from_env = Path::new("/etc/a3s/env.yaml");
        assert_eq!(
            config_path(Some(explicit), Some(from_env)).as_deref(),
            Some(explicit)
        );
        assert_eq!(config_path(None, Some(from_env)).as_deref(), Some(from_env));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Settings::from_file(Path::new("/nonexistent/a3s.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/a3s.yaml"));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("a3s-serp-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "captcha:\n  api_key: k-123\n").unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.captcha.api_key.as_deref(), Some("k-123"));
        let _ = std::fs::remove_file(path);
    }

    #[cfg(feature = "headless")]
    #[test]
    fn test_session_config_follows_app_section() {
        let mut settings = Settings::default();
        settings.app.headless = false;
        settings.app.max_pages = 3;
        settings.app.proxy_url = Some("http://proxy:3128".into());
        let config = settings.session_config();
        assert!(!config.headless);
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert!(config.leakless);
    }
}
