//! Prompt sanitizer.

use tracing::{debug, warn};

use super::patterns::{InjectionCategory, SanitizationRule, RULES};
use crate::error::{BulwarkError, Result};

/// Blocklist matcher for prompt-injection attempts.
///
/// Matching is case-insensitive and unanchored: a rule that matches anywhere in
/// the text blocks the whole prompt. This is signature matching, not a semantic
/// classifier, so obfuscated injections can slip through.
pub struct PatternSanitizer {
    rules: &'static [SanitizationRule],
}

impl PatternSanitizer {
    pub fn new() -> Self {
        Self { rules: &RULES }
    }

    /// Return `text` unchanged, or reject it with the category of the first matching rule.
    pub fn sanitize<'a>(&self, text: &'a str) -> Result<&'a str> {
        match self.inspect(text) {
            None => Ok(text),
            Some(category) => {
                warn!(category = %category, len = text.len(), "Blocked prompt");
                Err(BulwarkError::ContentRejected { category })
            }
        }
    }

    /// Category of the first rule matching `text`, if any.
    pub fn inspect(&self, text: &str) -> Option<InjectionCategory> {
        let hit = self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| rule.category);
        if hit.is_none() {
            debug!(len = text.len(), "Prompt passed sanitization");
        }
        hit
    }

    /// Rule categories in evaluation order.
    pub fn categories(&self) -> impl Iterator<Item = InjectionCategory> + '_ {
        self.rules.iter().map(|rule| rule.category)
    }
}

impl Default for PatternSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
