use serde::{Deserialize, Serialize};

/// The closed set of tools the concierge assistant may invoke.
///
/// Adding a tool means adding a variant here and a handler arm in the
/// executor; an unknown name can never silently fall through to a
/// runtime miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SaveVisitorData,
    LookupResidentByUnit,
    CreateVisit,
    NotifyResident,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::SaveVisitorData,
        ToolName::LookupResidentByUnit,
        ToolName::CreateVisit,
        ToolName::NotifyResident,
    ];

    /// Parse a wire-format tool name. Returns `None` for unknown names;
    /// the caller decides how to surface that (the executor reports it as
    /// a structured tool error, never a transport failure).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "save_visitor_data" => Some(Self::SaveVisitorData),
            "lookup_resident_by_unit" => Some(Self::LookupResidentByUnit),
            "create_visit" => Some(Self::CreateVisit),
            "notify_resident" => Some(Self::NotifyResident),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveVisitorData => "save_visitor_data",
            Self::LookupResidentByUnit => "lookup_resident_by_unit",
            Self::CreateVisit => "create_visit",
            Self::NotifyResident => "notify_resident",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation as received from the realtime assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Structured result of a tool invocation.
///
/// Tool failures are data, not transport errors: a failed call is
/// returned in a 200-equivalent response so the voice conversation can
/// react to it without the session dropping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
