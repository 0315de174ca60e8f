//! 用量与费用模块：从响应完成事件中提取令牌用量并计算总费用
//!
//! Usage and cost accounting. Each finished response carries a usage record at
//! `response.usage`; the tracker keeps the latest distinct record and the cost
//! derived from it in two observable state cells.

pub mod pricing;

pub use pricing::{CostBreakdown, TokenPrices};

use crate::types::events::ResponseFinished;
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenDetails {
    pub cached_tokens: u64,
    pub text_tokens: u64,
    pub audio_tokens: u64,
}

/// Token usage of one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSnapshot {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_token_details: Option<TokenDetails>,
    pub output_token_details: Option<TokenDetails>,
}

impl UsageSnapshot {
    /// Read the usage record of a `response.done` event.
    ///
    /// `Ok(None)` when the record is absent or unreadable. A payload that is not
    /// an object or lacks the `response` object is an extraction error.
    pub fn from_response_event(raw: &Value) -> Result<Option<Self>> {
        let root = raw.as_object().ok_or_else(|| {
            Error::extraction_with_context(
                "Response payload is not a JSON object",
                ErrorContext::new().with_source("usage_tracker"),
            )
        })?;
        let response = root
            .get("response")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::extraction_with_context(
                    "Response payload has no 'response' object",
                    ErrorContext::new()
                        .with_field_path("response")
                        .with_source("usage_tracker"),
                )
            })?;

        Ok(response
            .get("usage")
            .filter(|u| !u.is_null())
            .and_then(|u| serde_json::from_value(u.clone()).ok()))
    }
}

/// Tracks the latest usage snapshot and total cost.
#[derive(Debug)]
pub struct UsageCostTracker {
    prices: ArcSwap<TokenPrices>,
    usage: watch::Sender<UsageSnapshot>,
    total_cost: watch::Sender<f64>,
}

impl UsageCostTracker {
    pub fn new(prices: TokenPrices) -> Self {
        let (usage, _) = watch::channel(UsageSnapshot::default());
        let (total_cost, _) = watch::channel(0.0);
        Self {
            prices: ArcSwap::from_pointee(prices),
            usage,
            total_cost,
        }
    }

    /// Replace the unit prices. Takes effect from the next distinct snapshot.
    pub fn set_prices(&self, prices: TokenPrices) {
        self.prices.store(std::sync::Arc::new(prices));
    }

    pub fn prices(&self) -> TokenPrices {
        **self.prices.load()
    }

    /// Observe the latest usage snapshot. Starts at all zeros.
    pub fn usage(&self) -> watch::Receiver<UsageSnapshot> {
        self.usage.subscribe()
    }

    /// Observe the total cost of the latest snapshot. Starts at zero.
    pub fn total_cost(&self) -> watch::Receiver<f64> {
        self.total_cost.subscribe()
    }

    pub fn latest_usage(&self) -> UsageSnapshot {
        *self.usage.borrow()
    }

    pub fn latest_cost(&self) -> f64 {
        *self.total_cost.borrow()
    }

    /// Fold one finished response in. Returns whether a new snapshot was published.
    pub fn on_response_finished(&self, update: &ResponseFinished) -> Result<bool> {
        match UsageSnapshot::from_response_event(&update.raw)? {
            Some(snapshot) => Ok(self.record(snapshot)),
            None => Ok(false),
        }
    }

    /// Publish `snapshot` and its cost unless it equals the latest snapshot.
    pub fn record(&self, snapshot: UsageSnapshot) -> bool {
        let changed = self.usage.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        if changed {
            let cost = self.prices.load().cost_of(&snapshot);
            debug!(
                total_tokens = snapshot.total_tokens,
                total_cost = cost.total,
                "Usage updated"
            );
            self.total_cost.send_replace(cost.total);
        }
        changed
    }
}

impl Default for UsageCostTracker {
    fn default() -> Self {
        Self::new(TokenPrices::default())
    }
}
