//! Per-token prices and cost computation.

use super::UsageSnapshot;
use serde::{Deserialize, Serialize};

/// Unit price of one token of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPrices {
    pub text_input: f64,
    pub text_output: f64,
    pub audio_input: f64,
    pub audio_output: f64,
}

impl TokenPrices {
    pub fn new(text_input: f64, text_output: f64, audio_input: f64, audio_output: f64) -> Self {
        Self {
            text_input,
            text_output,
            audio_input,
            audio_output,
        }
    }

    /// Prices quoted per million tokens.
    pub fn per_million(text_input: f64, text_output: f64, audio_input: f64, audio_output: f64) -> Self {
        const M: f64 = 1_000_000.0;
        Self::new(text_input / M, text_output / M, audio_input / M, audio_output / M)
    }

    pub fn gpt_4o_realtime_preview() -> Self {
        Self::per_million(5.0, 20.0, 100.0, 200.0)
    }

    pub fn gpt_4o_mini_realtime_preview() -> Self {
        Self::per_million(0.6, 2.4, 10.0, 20.0)
    }

    pub fn for_model(model: &str) -> Option<Self> {
        let m = model.to_lowercase();
        if m.contains("gpt-4o-mini-realtime") {
            Some(Self::gpt_4o_mini_realtime_preview())
        } else if m.contains("gpt-4o-realtime") {
            Some(Self::gpt_4o_realtime_preview())
        } else {
            None
        }
    }

    /// Cost of `usage`. Missing detail groups count as zero tokens.
    pub fn cost_of(&self, usage: &UsageSnapshot) -> CostBreakdown {
        let input = usage.input_token_details.unwrap_or_default();
        let output = usage.output_token_details.unwrap_or_default();
        let text_input = input.text_tokens as f64 * self.text_input;
        let audio_input = input.audio_tokens as f64 * self.audio_input;
        let text_output = output.text_tokens as f64 * self.text_output;
        let audio_output = output.audio_tokens as f64 * self.audio_output;
        CostBreakdown {
            text_input,
            audio_input,
            text_output,
            audio_output,
            total: text_input + audio_input + text_output + audio_output,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub text_input: f64,
    pub audio_input: f64,
    pub text_output: f64,
    pub audio_output: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn format(&self) -> String {
        if self.total < 0.01 {
            format!("{:.4}¢", self.total * 100.0)
        } else {
            format!("${:.4}", self.total)
        }
    }
}
