//! Prompt-injection rule catalogue.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of injection a rule detects. This label is all a rejection reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionCategory {
    /// "ignore/bypass/disable ... instructions/rules"
    InstructionOverride,
    /// "pretend/act as ... system/developer"
    RoleImpersonation,
    /// "reveal ... prompt/instructions"
    PromptExfiltration,
    /// Raw `system:`, `developer:` or `assistant:` tags
    RoleTag,
}

impl InjectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionCategory::InstructionOverride => "instruction_override",
            InjectionCategory::RoleImpersonation => "role_impersonation",
            InjectionCategory::PromptExfiltration => "prompt_exfiltration",
            InjectionCategory::RoleTag => "role_tag",
        }
    }
}

impl fmt::Display for InjectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the rule list.
pub struct SanitizationRule {
    pub category: InjectionCategory,
    pub pattern: Regex,
}

/// Rule sources in evaluation order.
const RULE_SOURCES: &[(InjectionCategory, &str)] = &[
    (
        InjectionCategory::InstructionOverride,
        r"(?:ignore|bypass|disable).*?(?:instructions|rules)",
    ),
    (
        InjectionCategory::RoleImpersonation,
        r"(?:pretend|act as).*?(?:system|developer)",
    ),
    (
        InjectionCategory::PromptExfiltration,
        r"(?:reveal).*?(?:prompt|instructions)",
    ),
    (
        InjectionCategory::RoleTag,
        r"system:|developer:|assistant:",
    ),
];

/// Compiled rules, built once for the process lifetime.
///
/// A rule that fails to compile panics on first use rather than leaving the
/// screen with a gap.
pub static RULES: Lazy<Vec<SanitizationRule>> = Lazy::new(|| {
    RULE_SOURCES
        .iter()
        .map(|(category, source)| compile_rule(*category, source))
        .collect()
});

fn compile_rule(category: InjectionCategory, source: &str) -> SanitizationRule {
    let pattern = RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("injection rule {category} does not compile: {e}"));
    SanitizationRule { category, pattern }
}
