use lintspan_config::Config;
use lintspan_engine::{FieldValue, IssueRegistry, IssuesSnapshot, ProviderSettings, TableField};

/// Presentation settings for the engine: the user's config over the engine defaults
pub fn provider_settings(config: &Config) -> ProviderSettings {
    let defaults = ProviderSettings::default();
    ProviderSettings {
        source_name: config.source_name.clone().unwrap_or(defaults.source_name),
        build_tool: config.build_tool.clone().unwrap_or(defaults.build_tool),
        default_category: config
            .default_category
            .clone()
            .unwrap_or(defaults.default_category),
        help_link_template: config
            .help_link_template
            .clone()
            .unwrap_or(defaults.help_link_template),
        history_limit: config.history_limit.or(defaults.history_limit),
    }
}

/// One line per issue of every tracked document, in document order
pub fn render(registry: &IssueRegistry) -> Vec<String> {
    registry
        .tracked_documents()
        .iter()
        .filter_map(|document| registry.tracker(document))
        .flat_map(|tracker| rows(&tracker.latest_snapshot()))
        .collect()
}

fn rows(snapshot: &IssuesSnapshot) -> Vec<String> {
    (0..snapshot.count())
        .map(|index| {
            let field = |field| {
                snapshot
                    .value(index, field)
                    .map(|value| value.to_string())
                    .unwrap_or_default()
            };
            // Editors count lines and columns from one
            let position = |field| match snapshot.value(index, field) {
                Some(FieldValue::Number(n)) => n + 1,
                _ => 0,
            };
            format!(
                "{}:{}:{}: {} {} {} [{}]",
                field(TableField::DocumentName),
                position(TableField::Line),
                position(TableField::Column),
                field(TableField::ErrorSeverity),
                field(TableField::ErrorCode),
                field(TableField::Text),
                field(TableField::ErrorCategory),
            )
        })
        .collect()
}
