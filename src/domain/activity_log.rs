// ==========================================
// Precast tracking backend - activity log model
// ==========================================
// Aligned with the activity_logs table.
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub project_id: Option<i64>,
    pub actor: i64,
    pub host: Option<String>,
    pub ip: Option<String>,
    pub action: ActivityAction,
    pub detail_json: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    ImportSubmitted,
    ImportCancelled,
    ImportFinished,
    TemplateExported,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::ImportSubmitted => "IMPORT_SUBMITTED",
            ActivityAction::ImportCancelled => "IMPORT_CANCELLED",
            ActivityAction::ImportFinished => "IMPORT_FINISHED",
            ActivityAction::TemplateExported => "TEMPLATE_EXPORTED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "IMPORT_SUBMITTED" => Some(ActivityAction::ImportSubmitted),
            "IMPORT_CANCELLED" => Some(ActivityAction::ImportCancelled),
            "IMPORT_FINISHED" => Some(ActivityAction::ImportFinished),
            "TEMPLATE_EXPORTED" => Some(ActivityAction::TemplateExported),
            _ => None,
        }
    }
}
