//! `~/.caselog/config.toml` loading.
//!
//! ```toml
//! [api_keys]
//! google = "${GEMINI_API_KEY}"
//!
//! [vision]
//! model = "gemini-3-flash-preview"
//! cooldown_secs = 45
//!
//! [scanner]
//! tick_interval_ms = 200
//! sound = false
//!
//! [suggestions]
//! debounce_ms = 600
//! custom_procedures = ["Robotic Prostatectomy"]
//! ```
//!
//! Every section is optional; absent values fall back to component defaults.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use caselog_capture::{FeedbackConfig, ScannerConfig};
use caselog_suggest::SuggestionConfig;
use caselog_types::ApiKey;
use caselog_vision::{RetryConfig, VisionConfig};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable consulted when no key is configured.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CaselogConfig {
    pub api_keys: Option<ApiKeys>,
    pub vision: Option<VisionSection>,
    pub scanner: Option<ScannerSection>,
    pub suggestions: Option<SuggestionsSection>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub google: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let google = if self.google.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("google", &google).finish()
    }
}

/// Remote vision service settings.
#[derive(Debug, Deserialize)]
pub struct VisionSection {
    /// Set to false to run scanner and suggestions fully offline.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            base_url: None,
            timeout_secs: None,
            cooldown_secs: None,
            max_retries: None,
            initial_backoff_ms: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScannerSection {
    pub tick_interval_ms: Option<u64>,
    pub haptics: Option<bool>,
    pub sound: Option<bool>,
    pub jpeg_quality: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestionsSection {
    pub debounce_ms: Option<u64>,
    pub max_results: Option<usize>,
    #[serde(default)]
    pub custom_procedures: Vec<String>,
}

impl CaselogConfig {
    /// Load the user config. `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        toml::from_str(&content).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to parse config");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn vision_enabled(&self) -> bool {
        self.vision.as_ref().is_none_or(|v| v.enabled)
    }

    /// Configured key, `${VAR}`-expanded, else [`GEMINI_API_KEY_ENV`].
    #[must_use]
    pub fn api_key(&self) -> Option<ApiKey> {
        self.api_key_with(|name| env::var(name).ok())
    }

    fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.google.as_deref())
            .map(|raw| expand_env_vars_with(raw, &lookup))
            .and_then(ApiKey::new)
            .or_else(|| lookup(GEMINI_API_KEY_ENV).and_then(ApiKey::new))
    }

    #[must_use]
    pub fn vision_config(&self) -> VisionConfig {
        let mut config = VisionConfig {
            api_key: self.api_key(),
            ..VisionConfig::default()
        };
        let Some(section) = &self.vision else {
            return config;
        };
        if let Some(model) = &section.model {
            config.model.clone_from(model);
        }
        if let Some(base_url) = &section.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = section.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = section.cooldown_secs {
            config.cooldown = Duration::from_secs(secs);
        }
        let defaults = RetryConfig::default();
        config.extract_retry = RetryConfig {
            max_retries: section.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: section
                .initial_backoff_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: defaults.max_delay,
        };
        config
    }

    #[must_use]
    pub fn scanner_config(&self) -> ScannerConfig {
        let mut config = ScannerConfig::default();
        let Some(section) = &self.scanner else {
            return config;
        };
        if let Some(ms) = section.tick_interval_ms {
            // Zero would spin the decode loop.
            config.tick_interval = Duration::from_millis(ms.max(1));
        }
        config.feedback = FeedbackConfig {
            haptics: section.haptics.unwrap_or(config.feedback.haptics),
            sound: section.sound.unwrap_or(config.feedback.sound),
        };
        if let Some(quality) = section.jpeg_quality {
            config.jpeg_quality = quality.clamp(1, 100);
        }
        config
    }

    #[must_use]
    pub fn suggestion_config(&self) -> SuggestionConfig {
        let mut config = SuggestionConfig::default();
        let Some(section) = &self.suggestions else {
            return config;
        };
        if let Some(ms) = section.debounce_ms {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(max) = section.max_results {
            config.max_results = max;
        }
        config.custom_procedures.clone_from(&section.custom_procedures);
        config
    }
}

/// Replace `${VAR}` references with environment values. Unset variables
/// expand to nothing; an unterminated `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_env_vars_with(value, &|name| env::var(name).ok())
}

fn expand_env_vars_with(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        if !name.is_empty()
            && let Some(replacement) = lookup(name)
        {
            out.push_str(&replacement);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".caselog"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
