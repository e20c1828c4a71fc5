use serde::Deserialize;
use std::fs;
use std::path::Path;

use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// System prompt sent with every question.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub triggers: TriggersConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            triggers: TriggersConfig::default(),
            answer: AnswerConfig::default(),
            injection: InjectionConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are Craig, a concise assistant. Your answer is inserted inline into \
     whatever the user is writing, so reply with plain text only, no markdown \
     formatting, and keep it brief."
        .into()
}

// ============================================================================
// Triggers Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TriggersConfig {
    /// Phrases that open a deferred command when typed at a text start.
    #[serde(default = "default_supported_triggers")]
    pub supported: Vec<String>,
    /// The phrase that is armed at startup. Must be one of `supported`.
    #[serde(default = "default_active_trigger")]
    pub active: String,
    /// Inline mention that opens live capture anywhere in the text.
    #[serde(default = "default_mention")]
    pub mention: String,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            supported: default_supported_triggers(),
            active: default_active_trigger(),
            mention: default_mention(),
        }
    }
}

fn default_supported_triggers() -> Vec<String> {
    vec!["/craig".to_string(), "/ask".to_string()]
}

fn default_active_trigger() -> String {
    "/craig".into()
}

fn default_mention() -> String {
    "@craig".into()
}

// ============================================================================
// Answer Config
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "backend")]
pub enum AnswerConfig {
    #[serde(rename = "ollama")]
    Ollama {
        #[serde(default = "default_ollama_model")]
        model: String,
    },
    #[serde(rename = "openai-compat")]
    OpenAiCompat {
        /// Base URL - can use preset or explicit URL
        #[serde(default)]
        base_url: String,
        /// Preset shortcuts: "lm_studio", "openai", "ollama"
        preset: Option<String>,
        /// Model name
        model: String,
        /// API key (supports ${ENV_VAR} syntax)
        #[serde(default)]
        api_key: Option<String>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    },
}

impl Default for AnswerConfig {
    fn default() -> Self {
        #[cfg(feature = "ollama")]
        {
            AnswerConfig::Ollama {
                model: default_ollama_model(),
            }
        }
        #[cfg(all(feature = "openai-compat", not(feature = "ollama")))]
        {
            AnswerConfig::OpenAiCompat {
                base_url: String::new(),
                preset: None,
                model: "gpt-4o-mini".into(),
                api_key: None,
                temperature: None,
                max_tokens: None,
            }
        }
        #[cfg(not(any(feature = "ollama", feature = "openai-compat")))]
        {
            panic!(
                "No answer backend enabled. Build with --features ollama or --features openai-compat"
            );
        }
    }
}

fn default_ollama_model() -> String {
    "llama3.2:3b".into()
}

/// Expand ${VAR} to environment variable values
fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_else(|_| {
                warn!("environment variable '{}' not found", var_name);
                String::new()
            });
            result.replace_range(start..start + end + 1, &value);
        } else {
            break;
        }
    }

    result
}

impl AnswerConfig {
    /// Resolve preset to base_url if needed, and expand env vars in api_key
    pub fn resolve_presets(&mut self) {
        if let AnswerConfig::OpenAiCompat {
            base_url,
            preset,
            api_key,
            ..
        } = self
        {
            if base_url.is_empty() {
                if let Some(preset_name) = preset {
                    *base_url = match preset_name.as_str() {
                        "lm_studio" => "http://localhost:1234/v1".to_string(),
                        "openai" => "https://api.openai.com/v1".to_string(),
                        "ollama" => "http://localhost:11434/v1".to_string(),
                        _ => {
                            warn!("unknown preset '{}', using LM Studio default", preset_name);
                            "http://localhost:1234/v1".to_string()
                        }
                    };
                } else {
                    // No preset and no base_url - default to LM Studio
                    *base_url = "http://localhost:1234/v1".to_string();
                }
            }

            if let Some(key) = api_key {
                *key = expand_env_vars(key);
            }
        }
    }
}

// ============================================================================
// Injection Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsertMethod {
    /// Type the answer as individual keystrokes (default)
    #[default]
    Type,
    /// Insert through the clipboard with a paste chord
    Paste,
}

#[derive(Debug, Deserialize)]
pub struct InjectionConfig {
    /// Grace period before synthetic keystrokes start, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// How answers are put into the host application.
    #[serde(default)]
    pub insert_method: InsertMethod,
    /// Insert each answer automatically when it completes.
    #[serde(default)]
    pub auto_insert: bool,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            insert_method: InsertMethod::default(),
            auto_insert: false,
        }
    }
}

fn default_settle_ms() -> u64 {
    80
}

// ============================================================================
// History Config
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct HistoryConfig {
    /// Append questions and answers to this file. Disabled when unset.
    #[serde(default)]
    pub file: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load a config file, falling back to defaults when the file is missing
    /// or does not parse. A half-broken config never stops startup.
    pub fn load_from(path: &Path) -> Self {
        let mut config = if path.exists() {
            fs::read_to_string(path)
                .ok()
                .and_then(|s| toml::from_str(&s).ok())
                .unwrap_or_default()
        } else {
            Config::default()
        };

        config.answer.resolve_presets();

        config
    }
}
