// ==========================================
// Precast tracking backend - authenticated caller
// ==========================================

use serde::{Deserialize, Serialize};

/// Caller identity supplied by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: i64,
    pub host: Option<String>,
    pub ip: Option<String>,
}

impl CallerContext {
    /// Identity used by background work that has no interactive caller.
    pub fn system() -> Self {
        Self {
            user_id: 0,
            host: None,
            ip: None,
        }
    }
}
