//! Answer backends - Ollama (default) and OpenAI-compatible endpoints (optional)

use crate::config::AnswerConfig;

/// Trait for answer backends. Questions are independent one-shots; the
/// backend is not expected to keep conversation history.
pub trait AnswerBackend: Send {
    /// Stream an answer, calling on_token for each chunk as it arrives.
    /// Returns the complete answer text.
    fn ask_stream(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Answer without streaming.
    fn ask(&mut self, question: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self.ask_stream(question, &mut |_| {})
    }
}

/// Build the backend selected in the config.
pub fn from_config(
    config: &AnswerConfig,
    system_prompt: &str,
) -> Result<Box<dyn AnswerBackend>, Box<dyn std::error::Error + Send + Sync>> {
    match config {
        #[cfg(feature = "ollama")]
        AnswerConfig::Ollama { model } => {
            Ok(Box::new(ollama::OllamaBackend::new(model, system_prompt)))
        }
        #[cfg(feature = "openai-compat")]
        AnswerConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
        } => Ok(Box::new(openai::OpenAiBackend::new(
            base_url,
            api_key.as_deref(),
            model,
            system_prompt,
            *temperature,
            *max_tokens,
        )?)),
        #[allow(unreachable_patterns)]
        _ => Err("configured answer backend is not compiled in; enable the ollama or openai-compat feature".into()),
    }
}

// ============================================================================
// Ollama backend
// ============================================================================

#[cfg(feature = "ollama")]
pub mod ollama {
    use super::*;
    use ollama_rs::Ollama;
    use ollama_rs::generation::chat::ChatMessage;
    use ollama_rs::generation::chat::request::ChatMessageRequest;
    use tokio_stream::StreamExt;

    pub struct OllamaBackend {
        client: Ollama,
        model: String,
        system_prompt: String,
    }

    impl OllamaBackend {
        pub fn new(model: &str, system_prompt: &str) -> Self {
            Self {
                client: Ollama::default(),
                model: model.to_string(),
                system_prompt: system_prompt.to_string(),
            }
        }
    }

    impl AnswerBackend for OllamaBackend {
        fn ask_stream(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>>
        {
            let messages = vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(question.to_string()),
            ];
            let request = ChatMessageRequest::new(self.model.clone(), messages);

            // Run async in blocking context
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let client = &self.client;
            let result = rt.block_on(async {
                let mut stream = client.send_chat_messages_stream(request).await?;
                let mut full_answer = String::new();

                while let Some(Ok(chunk)) = stream.next().await {
                    let content = &chunk.message.content;
                    on_token(content);
                    full_answer.push_str(content);
                }

                Ok::<_, Box<dyn std::error::Error + Send + Sync>>(full_answer)
            })?;

            Ok(result)
        }
    }
}

// ============================================================================
// OpenAI-compatible backend
// ============================================================================

#[cfg(feature = "openai-compat")]
pub mod openai {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::time::Duration;

    use serde_json::{Value, json};

    pub struct OpenAiBackend {
        client: reqwest::blocking::Client,
        url: String,
        api_key: Option<String>,
        model: String,
        system_prompt: String,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    }

    impl OpenAiBackend {
        pub fn new(
            base_url: &str,
            api_key: Option<&str>,
            model: &str,
            system_prompt: &str,
            temperature: Option<f32>,
            max_tokens: Option<u32>,
        ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?;
            Ok(Self {
                client,
                url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
                api_key: api_key.map(str::to_string),
                model: model.to_string(),
                system_prompt: system_prompt.to_string(),
                temperature,
                max_tokens,
            })
        }

        fn request_body(&self, question: &str, stream: bool) -> Value {
            let mut body = json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": self.system_prompt },
                    { "role": "user", "content": question },
                ],
                "stream": stream,
            });
            if let Some(temperature) = self.temperature {
                body["temperature"] = json!(temperature);
            }
            if let Some(max_tokens) = self.max_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            body
        }

        fn post(&self, body: &Value) -> Result<reqwest::blocking::Response, Box<dyn std::error::Error + Send + Sync>> {
            let mut request = self.client.post(&self.url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            Ok(request.send()?.error_for_status()?)
        }
    }

    impl AnswerBackend for OpenAiBackend {
        fn ask_stream(&mut self, question: &str, on_token: &mut dyn FnMut(&str)) -> Result<String, Box<dyn std::error::Error + Send + Sync>>
        {
            let response = self.post(&self.request_body(question, true))?;
            let reader = BufReader::new(response);
            let mut full_answer = String::new();

            // Server-sent events: one JSON chunk per "data:" line.
            for line in reader.lines() {
                let line = line?;
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    break;
                }
                let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
                    continue;
                };
                if let Some(content) = chunk["choices"][0]["delta"]["content"].as_str() {
                    on_token(content);
                    full_answer.push_str(content);
                }
            }

            Ok(full_answer)
        }

        fn ask(&mut self, question: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            let response = self.post(&self.request_body(question, false))?;
            let value: Value = response.json()?;
            let content = value["choices"][0]["message"]["content"]
                .as_str()
                .ok_or("malformed completion response")?;
            Ok(content.to_string())
        }
    }

}

// ============================================================================
// Tests
// ============================================================================
