// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model backends for aicoder.
//!
//! Every backend is reached through [`openai::OpenAIProvider`], which speaks
//! the Chat Completions API with function calling:
//!
//! - **Gemini** through its OpenAI-compatible endpoint (default)
//! - **OpenAI**
//! - **Ollama** running locally
//! - any other OpenAI-compatible server
//!
//! # Quick Start
//!
//! ```bash
//! # Gemini (default)
//! export GEMINI_API_KEY=your-key
//!
//! # OpenAI
//! export AICODER_PROVIDER=openai OPENAI_API_KEY=your-key
//!
//! # Ollama (no key needed, just have it running)
//! export AICODER_PROVIDER=ollama
//! ```
//!
//! ```rust,ignore
//! use aicoder::providers::create_provider_from_env;
//!
//! let provider = create_provider_from_env()?;
//! let response = provider.chat(&messages, Some(&tools), None).await?;
//! ```

pub mod openai;

pub use openai::OpenAIProvider;

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::error::ProviderError;
use crate::types::{ProviderConfig, SharedProvider};

/// Supported provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Google Gemini models via the OpenAI-compatible endpoint
    Gemini,
    /// OpenAI GPT models
    OpenAI,
    /// Ollama local models
    Ollama,
    /// Any OpenAI-compatible API
    OpenAICompatible,
}

impl ProviderType {
    /// Get the default model for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::OpenAI => "gpt-4o",
            Self::Ollama => "llama3.2",
            Self::OpenAICompatible => "gpt-4o",
        }
    }

    /// Get the default base URL for this provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => openai::GEMINI_BASE_URL,
            Self::OpenAI => openai::OPENAI_BASE_URL,
            Self::Ollama => openai::OLLAMA_BASE_URL,
            Self::OpenAICompatible => openai::OPENAI_BASE_URL,
        }
    }

    /// Check if this provider requires an API key.
    pub fn requires_api_key(&self) -> bool {
        match self {
            Self::Gemini | Self::OpenAI => true,
            Self::Ollama | Self::OpenAICompatible => false,
        }
    }

    /// API key for this provider from the environment, if any.
    pub fn api_key_from_env(&self) -> Option<String> {
        let vars: &[&str] = match self {
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::OpenAI | Self::OpenAICompatible => &["OPENAI_API_KEY"],
            Self::Ollama => &[],
        };
        vars.iter().find_map(|v| std::env::var(v).ok())
    }
}

/// Error type for parsing a provider type from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderTypeError;

impl std::fmt::Display for ParseProviderTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider type")
    }
}

impl std::error::Error for ParseProviderTypeError {}

impl std::str::FromStr for ProviderType {
    type Err = ParseProviderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "gpt" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "openai-compatible" | "openai_compatible" => Ok(Self::OpenAICompatible),
            _ => Err(ParseProviderTypeError),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "Gemini"),
            Self::OpenAI => write!(f, "OpenAI"),
            Self::Ollama => write!(f, "Ollama"),
            Self::OpenAICompatible => write!(f, "OpenAI-Compatible"),
        }
    }
}

/// Create a provider instance from type and configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] if the API key is missing for a
/// provider that needs one, or if an OpenAI-compatible provider has no base URL.
pub fn create_provider(
    provider_type: ProviderType,
    config: ProviderConfig,
) -> Result<SharedProvider, ProviderError> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider_type.default_model().to_string());

    let base_url = match (provider_type, config.base_url.clone()) {
        (_, Some(url)) => url,
        (ProviderType::OpenAICompatible, None) => {
            return Err(ProviderError::NotConfigured(
                "base_url required for OpenAI-Compatible".to_string(),
            ))
        }
        (other, None) => other.default_base_url().to_string(),
    };

    let api_key = match provider_type {
        ProviderType::Ollama => None,
        other if other.requires_api_key() => Some(config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(format!("API key required for {other}"))
        })?),
        _ => config.api_key.clone(),
    };

    Ok(Arc::new(OpenAIProvider::new(api_key, model, base_url, config)?))
}

/// Create a provider from environment variables with smart defaults.
///
/// # Detection Order
///
/// 1. `AICODER_PROVIDER` for explicit selection
/// 2. `GEMINI_API_KEY` / `GOOGLE_API_KEY` → Gemini
/// 3. `OPENAI_API_KEY` → OpenAI
/// 4. Ollama at localhost
///
/// `AICODER_MODEL` overrides the model and `AICODER_BASE_URL` the endpoint.
pub fn create_provider_from_env() -> Result<SharedProvider, ProviderError> {
    let explicit = std::env::var("AICODER_PROVIDER")
        .ok()
        .and_then(|p| p.parse::<ProviderType>().ok());

    let provider_type = explicit.unwrap_or_else(|| {
        if ProviderType::Gemini.api_key_from_env().is_some() {
            ProviderType::Gemini
        } else if ProviderType::OpenAI.api_key_from_env().is_some() {
            ProviderType::OpenAI
        } else {
            ProviderType::Ollama
        }
    });

    let config = ProviderConfig {
        api_key: provider_type.api_key_from_env(),
        model: std::env::var("AICODER_MODEL").ok(),
        base_url: std::env::var("AICODER_BASE_URL").ok(),
        ..Default::default()
    };

    create_provider(provider_type, config)
}

/// Create a provider from a resolved configuration.
///
/// `model` overrides the configured model, for per-role model selection.
pub fn create_provider_from_config(
    config: &ResolvedConfig,
    model: Option<&str>,
) -> Result<SharedProvider, ProviderError> {
    let provider_type: ProviderType = config.provider.parse().map_err(|_| {
        ProviderError::NotConfigured(format!("Unknown provider: {}", config.provider))
    })?;

    let provider_config = ProviderConfig {
        api_key: provider_type.api_key_from_env(),
        base_url: config.base_url.clone(),
        model: model.map(str::to_string).or_else(|| config.model.clone()),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        timeout_ms: None,
    };

    create_provider(provider_type, provider_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_from_str() {
        assert_eq!("gemini".parse::<ProviderType>(), Ok(ProviderType::Gemini));
        assert_eq!("GOOGLE".parse::<ProviderType>(), Ok(ProviderType::Gemini));
        assert_eq!("openai".parse::<ProviderType>(), Ok(ProviderType::OpenAI));
        assert_eq!("gpt".parse::<ProviderType>(), Ok(ProviderType::OpenAI));
        assert_eq!("ollama".parse::<ProviderType>(), Ok(ProviderType::Ollama));
        assert_eq!(
            "openai-compatible".parse::<ProviderType>(),
            Ok(ProviderType::OpenAICompatible)
        );
        assert!("invalid".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_provider_type_defaults() {
        assert_eq!(ProviderType::Gemini.default_model(), "gemini-2.0-flash");
        assert_eq!(ProviderType::Ollama.default_model(), "llama3.2");
        assert!(ProviderType::Gemini.requires_api_key());
        assert!(!ProviderType::Ollama.requires_api_key());
    }

    #[test]
    fn test_create_provider_missing_key() {
        let result = create_provider(ProviderType::Gemini, ProviderConfig::default());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_create_provider_gemini() {
        let config = ProviderConfig::new("test-key", "gemini-2.0-flash");
        let provider = create_provider(ProviderType::Gemini, config).unwrap();
        assert_eq!(provider.name(), "Gemini");
        assert_eq!(provider.model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_create_provider_ollama() {
        let provider = create_provider(ProviderType::Ollama, ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "Ollama");
        assert_eq!(provider.model(), "llama3.2");
    }

    #[test]
    fn test_openai_compatible_needs_base_url() {
        let result = create_provider(ProviderType::OpenAICompatible, ProviderConfig::default());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));

        let config = ProviderConfig::default().with_base_url("https://llm.internal/v1");
        let provider = create_provider(ProviderType::OpenAICompatible, config).unwrap();
        assert_eq!(provider.name(), "OpenAI-Compatible");
    }
}
