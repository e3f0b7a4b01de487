//! Bridges rig-core provider clients to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Default response budget; extraction output is one small JSON object.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// rig client for one of the supported backends.
pub enum RigClient {
    Anthropic(rig::client::Client<anthropic::client::AnthropicExt>),
    OpenAi(rig::client::Client<openai::client::OpenAIResponsesExt>),
}

impl RigClient {
    fn provider(&self) -> &'static str {
        match self {
            Self::Anthropic(_) => "anthropic",
            Self::OpenAi(_) => "openai",
        }
    }
}

/// `LlmProvider` backed by a rig-core client. Builds a one-shot agent per call.
pub struct RigAdapter {
    client: RigClient,
    model: String,
}

impl RigAdapter {
    pub fn new(client: RigClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for RigAdapter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let preamble = request.system_prompt();
        let prompt = request.user_prompt();
        let temperature = f64::from(request.temperature.unwrap_or(0.0));
        let max_tokens = u64::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

        let result = match &self.client {
            RigClient::Anthropic(client) => {
                client
                    .agent(&self.model)
                    .preamble(&preamble)
                    .temperature(temperature)
                    .max_tokens(max_tokens)
                    .build()
                    .prompt(prompt)
                    .await
            }
            RigClient::OpenAi(client) => {
                client
                    .agent(&self.model)
                    .preamble(&preamble)
                    .temperature(temperature)
                    .max_tokens(max_tokens)
                    .build()
                    .prompt(prompt)
                    .await
            }
        };

        let content = result.map_err(|e| LlmError::RequestFailed {
            provider: self.client.provider().to_string(),
            reason: e.to_string(),
        })?;

        Ok(CompletionResponse { content })
    }
}
