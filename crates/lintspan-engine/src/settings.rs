use serde::{Deserialize, Serialize};

/// Placeholder substituted with the rule id in [`ProviderSettings::help_link_template`]
pub const RULE_ID_PLACEHOLDER: &str = "{rule_id}";

/// Presentation settings shared by every snapshot a registry publishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Reported in the error source column
    pub source_name: String,
    /// Reported in the build tool column
    pub build_tool: String,
    /// Category for issues that do not carry their own
    pub default_category: String,
    /// Help link for issues without an explicit one
    pub help_link_template: String,
    /// Maximum number of snapshots retained per document, `None` keeps all
    pub history_limit: Option<usize>,
}

impl ProviderSettings {
    pub fn help_link(&self, rule_id: &str) -> String {
        self.help_link_template.replace(RULE_ID_PLACEHOLDER, rule_id)
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            source_name: "lintspan".to_string(),
            build_tool: "lintspan".to_string(),
            default_category: "Code Smell".to_string(),
            help_link_template: format!("https://lintspan.dev/rules#ruleId={RULE_ID_PLACEHOLDER}"),
            history_limit: None,
        }
    }
}
