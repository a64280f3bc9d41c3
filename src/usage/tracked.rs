// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider wrapper that reports every completed call to a [`UsageTracker`].

use async_trait::async_trait;

use super::{estimate_tokens, UsageTracker};
use crate::error::ProviderError;
use crate::types::{Message, Provider, ProviderResponse, SharedProvider, ToolDefinition};

/// Counts usage for each successful `chat` call before returning it.
pub struct TrackedProvider {
    inner: SharedProvider,
    tracker: UsageTracker,
}

impl TrackedProvider {
    pub fn new(inner: SharedProvider, tracker: UsageTracker) -> Self {
        Self { inner, tracker }
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }
}

fn estimate_call(
    messages: &[Message],
    system_prompt: Option<&str>,
    response: &ProviderResponse,
) -> u64 {
    let input_chars = messages.iter().map(Message::char_count).sum::<usize>()
        + system_prompt.map(str::len).unwrap_or(0);
    let output_chars = response.content.len()
        + response
            .tool_calls
            .iter()
            .map(|c| c.name.len() + c.input.to_string().len())
            .sum::<usize>();
    estimate_tokens(input_chars) + estimate_tokens(output_chars)
}

#[async_trait]
impl Provider for TrackedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self.inner.chat(messages, tools, system_prompt).await?;

        // The backend may resolve an alias to a concrete model.
        let model = response.model.as_deref().unwrap_or(self.inner.model());
        match &response.usage {
            Some(usage) => {
                self.tracker.record(model, usage.total(), false);
            }
            None => {
                let tokens = estimate_call(messages, system_prompt, &response);
                self.tracker.record(model, tokens, true);
            }
        }

        Ok(response)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
