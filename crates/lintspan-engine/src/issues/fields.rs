use std::fmt;

use serde::Serialize;

use crate::issues::Severity;

/// Column keys a result consumer may look up on a snapshot row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableField {
    DocumentName,
    ErrorCategory,
    ErrorSource,
    Line,
    Column,
    Text,
    ErrorSeverity,
    BuildTool,
    ErrorCode,
    ErrorCodeToolTip,
    HelpLink,
    ProjectName,
    ProjectGuid,
}

impl TableField {
    pub const ALL: [TableField; 13] = [
        TableField::DocumentName,
        TableField::ErrorCategory,
        TableField::ErrorSource,
        TableField::Line,
        TableField::Column,
        TableField::Text,
        TableField::ErrorSeverity,
        TableField::BuildTool,
        TableField::ErrorCode,
        TableField::ErrorCodeToolTip,
        TableField::HelpLink,
        TableField::ProjectName,
        TableField::ProjectGuid,
    ];

    /// Standard key name of the column
    pub fn key(self) -> &'static str {
        match self {
            TableField::DocumentName => "documentname",
            TableField::ErrorCategory => "errorcategory",
            TableField::ErrorSource => "errorsource",
            TableField::Line => "line",
            TableField::Column => "column",
            TableField::Text => "text",
            TableField::ErrorSeverity => "errorseverity",
            TableField::BuildTool => "buildtool",
            TableField::ErrorCode => "errorcode",
            TableField::ErrorCodeToolTip => "errorcodetooltip",
            TableField::HelpLink => "helplink",
            TableField::ProjectName => "projectname",
            TableField::ProjectGuid => "projectguid",
        }
    }

    /// Parse a key name, ignoring ASCII case. Unknown keys yield `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for TableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Typed cell value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(usize),
    Severity(Severity),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Number(number) => write!(f, "{number}"),
            FieldValue::Severity(severity) => write!(f, "{severity}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("documentname", Some(TableField::DocumentName))]
    #[case("Line", Some(TableField::Line))]
    #[case("ERRORCODETOOLTIP", Some(TableField::ErrorCodeToolTip))]
    #[case("projectguid", Some(TableField::ProjectGuid))]
    #[case("suppression", None)]
    #[case("", None)]
    fn test_from_key(#[case] key: &str, #[case] expected: Option<TableField>) {
        assert_eq!(TableField::from_key(key), expected);
    }

    #[test]
    fn test_keys_round_trip() {
        for field in TableField::ALL {
            assert_eq!(TableField::from_key(field.key()), Some(field));
        }
    }

    #[test]
    fn test_value_display() {
        assert_eq!(FieldValue::Number(7).to_string(), "7");
        assert_eq!(FieldValue::Severity(Severity::Error).to_string(), "error");
        assert_eq!(FieldValue::Text("x".into()).to_string(), "x");
    }
}
