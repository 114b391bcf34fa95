// ==========================================
// Precast tracking backend - domain enumerations
// ==========================================
// Job states, cell flags and row outcomes are modelled as
// enumerations; the database stores them as lowercase strings.
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// JobState - import job lifecycle
// ==========================================
// pending → running → (succeeded | failed | cancelled)
// cancelled may also be entered from pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether `self → next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Cancelled)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

// ==========================================
// CellFlag - stage flag cell
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellFlag {
    Yes,
    No,
    Unparsed,
}

impl CellFlag {
    /// Lowercases the cell; `yes`/`1` select the stage, empty/`no`/`0`
    /// do not, anything else is kept as `Unparsed` (also not selected).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "yes" | "1" => CellFlag::Yes,
            "" | "no" | "0" => CellFlag::No,
            _ => CellFlag::Unparsed,
        }
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, CellFlag::Yes)
    }
}

// ==========================================
// RefCategory - reference dictionaries
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefCategory {
    DrawingType,
    Stage,
    Hierarchy,
    BomProduct,
}

impl RefCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefCategory::DrawingType => "drawing_type",
            RefCategory::Stage => "stage",
            RefCategory::Hierarchy => "hierarchy",
            RefCategory::BomProduct => "bom_product",
        }
    }
}

impl fmt::Display for RefCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// RowFailureKind - per-draft persistence failure
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFailureKind {
    /// Row could not be parsed or assembled
    Parse,
    /// element_type code already exists in the project
    Duplicate,
    /// Hierarchy node deleted between assembly and persist
    ReferenceVanished,
    DatabaseError,
}

impl RowFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowFailureKind::Parse => "parse",
            RowFailureKind::Duplicate => "duplicate",
            RowFailureKind::ReferenceVanished => "reference_vanished",
            RowFailureKind::DatabaseError => "database_error",
        }
    }
}

impl fmt::Display for RowFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_round_trip_strings() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("RUNNING".parse::<JobState>().is_err());
    }

    #[test]
    fn test_job_state_transitions() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Running));
        assert!(!JobState::Cancelled.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
    }

    #[test]
    fn test_cell_flag_parse() {
        assert_eq!(CellFlag::parse("YES"), CellFlag::Yes);
        assert_eq!(CellFlag::parse(" 1 "), CellFlag::Yes);
        assert_eq!(CellFlag::parse(""), CellFlag::No);
        assert_eq!(CellFlag::parse("no"), CellFlag::No);
        assert_eq!(CellFlag::parse("y"), CellFlag::Unparsed);
        assert!(!CellFlag::parse("true").is_selected());
    }
}
