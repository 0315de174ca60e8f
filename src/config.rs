//! Session configuration loaded from YAML or JSON, with environment overrides
//! for token prices.

use crate::types::options::SessionOptions;
use crate::usage::TokenPrices;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_TEXT_INPUT_PRICE: &str = "AI_REALTIME_TEXT_INPUT_PRICE";
pub const ENV_TEXT_OUTPUT_PRICE: &str = "AI_REALTIME_TEXT_OUTPUT_PRICE";
pub const ENV_AUDIO_INPUT_PRICE: &str = "AI_REALTIME_AUDIO_INPUT_PRICE";
pub const ENV_AUDIO_OUTPUT_PRICE: &str = "AI_REALTIME_AUDIO_OUTPUT_PRICE";
pub const ENV_PARTIAL_ARGUMENTS: &str = "AI_REALTIME_PARTIAL_ARGUMENTS";

/// Configuration consumed by [`RealtimeSessionBuilder`](crate::session::RealtimeSessionBuilder).
///
/// ```yaml
/// model: gpt-4o-realtime-preview
/// prices:
///   text_input: 0.000005
///   audio_output: 0.0002
/// session:
///   voice: verse
///   instructions: Keep answers short.
/// partial_arguments: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Model name, used to pick preset prices when `prices` is unset.
    pub model: Option<String>,
    pub prices: Option<TokenPrices>,
    /// Overrides merged over the built-in session defaults.
    pub session: SessionOptions,
    /// Parse tool-call arguments in partial mode.
    pub partial_arguments: bool,
}

impl RealtimeConfig {
    /// Load from a file; `.json` files are parsed as JSON, everything else as YAML.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("Invalid YAML config: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))
    }

    /// Apply `AI_REALTIME_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let price = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let overrides = [
            price(ENV_TEXT_INPUT_PRICE),
            price(ENV_TEXT_OUTPUT_PRICE),
            price(ENV_AUDIO_INPUT_PRICE),
            price(ENV_AUDIO_OUTPUT_PRICE),
        ];
        if overrides.iter().any(Option::is_some) {
            let mut prices = self.resolved_prices();
            let [ti, to, ai, ao] = overrides;
            prices.text_input = ti.unwrap_or(prices.text_input);
            prices.text_output = to.unwrap_or(prices.text_output);
            prices.audio_input = ai.unwrap_or(prices.audio_input);
            prices.audio_output = ao.unwrap_or(prices.audio_output);
            self.prices = Some(prices);
        }
        if let Some(flag) = lookup(ENV_PARTIAL_ARGUMENTS) {
            self.partial_arguments = matches!(flag.trim(), "1" | "true" | "TRUE" | "yes");
        }
        self
    }

    /// Explicit prices, else the model's preset, else zero.
    pub fn resolved_prices(&self) -> TokenPrices {
        self.prices
            .or_else(|| self.model.as_deref().and_then(TokenPrices::for_model))
            .unwrap_or_default()
    }
}
