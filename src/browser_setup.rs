//! Chrome/Chromium executable discovery.
//!
//! Lookup order: the configured path, the `CHROME_PATH` environment
//! variable, well-known command names in `PATH`, then well-known install
//! locations. Nothing is downloaded; a missing browser is a startup error.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{Result, SearchError};

/// Environment variable naming the browser executable.
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

#[cfg(target_os = "macos")]
const KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(all(unix, not(target_os = "macos")))]
const KNOWN_PATHS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

#[cfg(not(unix))]
const KNOWN_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

const KNOWN_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

fn existing(path: &Path) -> Option<PathBuf> {
    path.is_file().then(|| path.to_path_buf())
}

/// Searches `PATH` and the well-known install locations.
pub fn detect_system_chrome() -> Option<PathBuf> {
    for cmd in KNOWN_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            debug!("Chrome found in PATH: {}", path.display());
            return Some(path);
        }
    }
    KNOWN_PATHS
        .iter()
        .find_map(|p| existing(Path::new(p)))
        .inspect(|p| debug!("Chrome found at known path: {}", p.display()))
}

/// Resolves the executable from an explicit path and an environment value,
/// falling back to system detection.
///
/// An explicit path that does not exist is an error rather than a silent
/// fallback.
pub fn resolve_chrome(explicit: Option<&str>, env_value: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
        return existing(Path::new(path)).ok_or_else(|| {
            SearchError::Browser(format!("Configured Chrome path does not exist: {}", path))
        });
    }
    if let Some(path) = env_value.and_then(|p| existing(Path::new(p))) {
        debug!("Chrome found via {}: {}", CHROME_PATH_ENV, path.display());
        return Ok(path);
    }
    detect_system_chrome().ok_or_else(|| {
        SearchError::Browser(format!(
            "No Chrome/Chromium installation found; install one or set {}",
            CHROME_PATH_ENV
        ))
    })
}

/// Finds the browser to launch.
pub fn find_chrome(explicit: Option<&str>) -> Result<PathBuf> {
    let env_value = std::env::var(CHROME_PATH_ENV).ok();
    let path = resolve_chrome(explicit, env_value.as_deref())?;
    info!("Using Chrome at {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_executable(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("a3s-serp-{}-{}", name, std::process::id()));
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        path
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = temp_executable("explicit");
        let env = temp_executable("env");
        let resolved = resolve_chrome(explicit.to_str(), env.to_str()).unwrap();
        assert_eq!(resolved, explicit);
        let _ = std::fs::remove_file(explicit);
        let _ = std::fs::remove_file(env);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let err = resolve_chrome(Some("/nonexistent/chrome"), None).unwrap_err();
        assert!(matches!(err, SearchError::Browser(_)));
        assert!(err.to_string().contains("/nonexistent/chrome"));
    }

    #[test]
    fn test_env_path_used_when_no_explicit() {
        let env = temp_executable("env-only");
        assert_eq!(resolve_chrome(None, env.to_str()).unwrap(), env);
        assert_eq!(resolve_chrome(Some("  "), env.to_str()).unwrap(), env);
        let _ = std::fs::remove_file(env);
    }

    #[test]
    fn test_missing_env_path_falls_through() {
        match resolve_chrome(None, Some("/nonexistent/env/chrome")) {
            Ok(path) => assert_ne!(path, PathBuf::from("/nonexistent/env/chrome")),
            Err(e) => assert!(e.to_string().contains(CHROME_PATH_ENV)),
        }
    }

    #[test]
    fn test_detect_system_chrome_returns_existing_path() {
        if let Some(path) = detect_system_chrome() {
            assert!(path.exists());
        }
    }

    #[test]
    fn test_known_tables_not_empty() {
        assert!(!KNOWN_PATHS.is_empty());
        assert!(!KNOWN_COMMANDS.is_empty());
    }
}
