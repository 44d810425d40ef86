//! Prompt-injection screening.

mod patterns;
mod sanitizer;

pub use patterns::{InjectionCategory, SanitizationRule, RULES};
pub use sanitizer::PatternSanitizer;
