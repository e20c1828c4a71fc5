//! Trigger phrase registry.
//!
//! Trigger phrases are stored normalized: lowercase, no surrounding
//! whitespace, exactly one trailing space as the delimiter. All matching
//! against typed text happens on the normalized form, so `"/Craig"` in a
//! config file and `/CRAIG hello` on the keyboard both work.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// No usable trigger phrases were supplied.
    Empty,
    /// The requested phrase is not in the supported set.
    Unknown(String),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerError::Empty => write!(f, "trigger list is empty"),
            TriggerError::Unknown(phrase) => write!(f, "unsupported trigger: {phrase}"),
        }
    }
}

impl std::error::Error for TriggerError {}

/// Normalize a raw phrase, or `None` if nothing is left after trimming.
fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("{trimmed} "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRegistry {
    supported: Vec<String>,
    active: usize,
}

impl TriggerRegistry {
    pub fn new(phrases: &[&str]) -> Result<Self, TriggerError> {
        let mut supported: Vec<String> = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            if let Some(normalized) = normalize(phrase) {
                if !supported.contains(&normalized) {
                    supported.push(normalized);
                }
            }
        }
        if supported.is_empty() {
            return Err(TriggerError::Empty);
        }
        Ok(Self {
            supported,
            active: 0,
        })
    }

    pub fn with_active(mut self, phrase: &str) -> Result<Self, TriggerError> {
        self.set_active(phrase)?;
        Ok(self)
    }

    /// The active trigger, trailing delimiter included.
    pub fn active(&self) -> &str {
        &self.supported[self.active]
    }

    /// The active trigger without its delimiter, for display.
    pub fn label(&self) -> &str {
        self.active().trim_end()
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// Switch the active trigger. The registry is left untouched on error.
    pub fn set_active(&mut self, phrase: &str) -> Result<(), TriggerError> {
        let normalized = normalize(phrase).ok_or(TriggerError::Empty)?;
        match self.supported.iter().position(|p| *p == normalized) {
            Some(idx) => {
                self.active = idx;
                Ok(())
            }
            None => Err(TriggerError::Unknown(normalized)),
        }
    }
}
