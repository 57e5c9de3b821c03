//! Client configuration from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a default so a bare environment talks to a local backend.
//! Values that are present but unparseable are errors rather than silently
//! replaced by the default. `from_lookup` takes the variable source as a
//! closure so tests never touch the process environment.

use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;

use frames::{GenerationSettings, Stack};
use tracing::warn;

use crate::channel::RetryPolicy;
use crate::selection::DEFAULT_MAX_SELECTED;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:7001";
pub const DEFAULT_HTTP_URL: &str = "http://127.0.0.1:7001";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_STATE_FILE: &str = ".pixelforge/state.json";
pub const DEFAULT_VARIANT_CAPACITY: usize = 4;

const GENERATE_PATH: &str = "/generate-code";
const LIVE_EDITOR_PATH: &str = "/ws/live-editor";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unknown stack {0:?}")]
    UnknownStack(String),
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub ws_base_url: String,
    pub http_base_url: String,
    pub retry: RetryPolicy,
    pub max_selected_elements: usize,
    pub variant_capacity: usize,
    pub state_file: PathBuf,
    pub settings: GenerationSettings,
}

impl ClientConfig {
    /// Build the configuration from the process environment.
    ///
    /// - `PIXELFORGE_WS_URL`, `PIXELFORGE_HTTP_URL`: backend base URLs
    /// - `PIXELFORGE_SEND_RETRIES`, `PIXELFORGE_SEND_RETRY_DELAY_MS`: send retry policy
    /// - `PIXELFORGE_MAX_SELECTED_ELEMENTS`, `PIXELFORGE_VARIANT_CAPACITY`
    /// - `PIXELFORGE_STATE_FILE`: where session state is persisted
    /// - `PIXELFORGE_MODEL`, `PIXELFORGE_STACK`, `PIXELFORGE_IMAGE_GENERATION`
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `ANTHROPIC_API_KEY`: credential overrides
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_var)
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retries = parse_or(&var, "PIXELFORGE_SEND_RETRIES", 1_u32)?;
        let delay_ms = parse_or(&var, "PIXELFORGE_SEND_RETRY_DELAY_MS", 500_u64)?;
        let max_selected_elements = parse_positive(&var, "PIXELFORGE_MAX_SELECTED_ELEMENTS", DEFAULT_MAX_SELECTED)?;
        let variant_capacity = parse_positive(&var, "PIXELFORGE_VARIANT_CAPACITY", DEFAULT_VARIANT_CAPACITY)?;
        let is_image_generation_enabled = parse_bool(&var, "PIXELFORGE_IMAGE_GENERATION", true)?;

        let stack = match var("PIXELFORGE_STACK") {
            Some(name) => Stack::from_name(name.trim()).ok_or(ConfigError::UnknownStack(name))?,
            None => Stack::default(),
        };

        Ok(Self {
            ws_base_url: trim_base(var("PIXELFORGE_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_owned())),
            http_base_url: trim_base(var("PIXELFORGE_HTTP_URL").unwrap_or_else(|| DEFAULT_HTTP_URL.to_owned())),
            retry: RetryPolicy { retries, delay: Duration::from_millis(delay_ms) },
            max_selected_elements,
            variant_capacity,
            state_file: var("PIXELFORGE_STATE_FILE").map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from),
            settings: GenerationSettings {
                code_generation_model: var("PIXELFORGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
                generated_code_config: stack,
                is_image_generation_enabled,
                open_ai_api_key: var("OPENAI_API_KEY"),
                open_ai_base_url: var("OPENAI_BASE_URL"),
                anthropic_api_key: var("ANTHROPIC_API_KEY"),
            },
        })
    }

    #[must_use]
    pub fn generate_url(&self) -> String {
        format!("{}{GENERATE_PATH}", self.ws_base_url)
    }

    #[must_use]
    pub fn live_editor_url(&self) -> String {
        format!("{}{LIVE_EDITOR_PATH}", self.ws_base_url)
    }
}

/// Read one variable directly. Other variables are never decoded, so a
/// non-UTF-8 value elsewhere in the environment cannot affect startup.
fn env_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(raw)) => {
            warn!(key, value = ?raw, "config: ignoring non-UTF-8 value");
            None
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_positive(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(var, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue { key, value: "0".to_owned() });
    }
    Ok(value)
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
