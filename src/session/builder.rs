use super::core::RealtimeSession;
use crate::config::RealtimeConfig;
use crate::tools::{CallableRegistry, Dispatcher};
use crate::transport::RealtimeTransport;
use crate::types::options::SessionOptions;
use crate::usage::TokenPrices;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;

/// Builder for [`RealtimeSession`].
///
/// Precedence, highest first: explicit builder settings, `AI_REALTIME_*`
/// environment overrides, the [`RealtimeConfig`], built-in defaults.
pub struct RealtimeSessionBuilder {
    transport: Option<Arc<dyn RealtimeTransport>>,
    config: RealtimeConfig,
    registry: Option<Arc<CallableRegistry>>,
    default_options: Option<SessionOptions>,
    prices: Option<TokenPrices>,
    partial_arguments: Option<bool>,
    env_overrides: bool,
}

impl RealtimeSessionBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: RealtimeConfig::default(),
            registry: None,
            default_options: None,
            prices: None,
            partial_arguments: None,
            env_overrides: true,
        }
    }

    /// Set the realtime service. Required.
    pub fn transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a registry with other components. A fresh one is created otherwise.
    pub fn registry(mut self, registry: Arc<CallableRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Options merged over the built-in defaults and the config's session section.
    pub fn default_options(mut self, options: SessionOptions) -> Self {
        self.default_options = Some(options);
        self
    }

    pub fn token_prices(mut self, prices: TokenPrices) -> Self {
        self.prices = Some(prices);
        self
    }

    /// Parse tool-call arguments in partial mode.
    pub fn partial_arguments(mut self, enable: bool) -> Self {
        self.partial_arguments = Some(enable);
        self
    }

    /// Read `AI_REALTIME_*` environment overrides at build time. On by default.
    pub fn env_overrides(mut self, enable: bool) -> Self {
        self.env_overrides = enable;
        self
    }

    pub fn build(self) -> Result<RealtimeSession> {
        let transport = self.transport.ok_or_else(|| {
            Error::configuration_with_context(
                "No transport configured",
                ErrorContext::new()
                    .with_field_path("transport")
                    .with_source("session_builder"),
            )
        })?;

        let config = if self.env_overrides {
            self.config.with_env_overrides()
        } else {
            self.config
        };

        let mut options = SessionOptions::defaults().merge(config.session.clone());
        if let Some(overrides) = self.default_options {
            options = options.merge(overrides);
        }
        let prices = self.prices.unwrap_or_else(|| config.resolved_prices());
        let partial = self.partial_arguments.unwrap_or(config.partial_arguments);

        let registry = self.registry.unwrap_or_default();
        let dispatcher = Dispatcher::new(registry).with_partial_arguments(partial);
        Ok(RealtimeSession::new(transport, dispatcher, options, prices))
    }
}

impl Default for RealtimeSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[test]
    fn test_transport_is_required() {
        let err = RealtimeSessionBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("No transport configured"));
    }

    #[test]
    fn test_precedence() {
        let config = RealtimeConfig::from_yaml_str(
            "model: gpt-4o-realtime-preview\nsession:\n  voice: verse\n  temperature: 0.9\n",
        )
        .unwrap();
        let session = RealtimeSessionBuilder::new()
            .transport(Arc::new(InMemoryTransport::new()))
            .config(config)
            .default_options(SessionOptions::default().with_temperature(0.7))
            .env_overrides(false)
            .build()
            .unwrap();

        let options = session.default_options();
        assert_eq!(options.voice.as_deref(), Some("verse"));
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(
            options.input_audio_transcription,
            SessionOptions::defaults().input_audio_transcription
        );
        assert_eq!(session.token_prices(), TokenPrices::gpt_4o_realtime_preview());
    }
}
