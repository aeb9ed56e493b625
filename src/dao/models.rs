use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr, time::SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of clocks a committee can run side by side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum TimerType {
    #[serde(rename = "session")]
    Session,
    #[serde(rename = "speaker")]
    Speaker,
    #[serde(rename = "caucus")]
    Caucus,
    #[serde(rename = "additional_1")]
    Additional1,
    #[serde(rename = "additional_2")]
    Additional2,
    #[serde(rename = "additional_3")]
    Additional3,
    #[serde(rename = "additional_4")]
    Additional4,
    #[serde(rename = "additional_5")]
    Additional5,
    #[serde(rename = "additional_6")]
    Additional6,
}

impl TimerType {
    /// Every timer type, in display order.
    pub const ALL: [TimerType; 9] = [
        TimerType::Session,
        TimerType::Speaker,
        TimerType::Caucus,
        TimerType::Additional1,
        TimerType::Additional2,
        TimerType::Additional3,
        TimerType::Additional4,
        TimerType::Additional5,
        TimerType::Additional6,
    ];

    /// Wire name used in payloads and persisted documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerType::Session => "session",
            TimerType::Speaker => "speaker",
            TimerType::Caucus => "caucus",
            TimerType::Additional1 => "additional_1",
            TimerType::Additional2 => "additional_2",
            TimerType::Additional3 => "additional_3",
            TimerType::Additional4 => "additional_4",
            TimerType::Additional5 => "additional_5",
            TimerType::Additional6 => "additional_6",
        }
    }

    /// Human readable label used when a timer is created without a name.
    pub fn default_label(&self) -> &'static str {
        match self {
            TimerType::Session => "Session Timer",
            TimerType::Speaker => "Speaker Timer",
            TimerType::Caucus => "Caucus Timer",
            TimerType::Additional1 => "Additional Timer 1",
            TimerType::Additional2 => "Additional Timer 2",
            TimerType::Additional3 => "Additional Timer 3",
            TimerType::Additional4 => "Additional Timer 4",
            TimerType::Additional5 => "Additional Timer 5",
            TimerType::Additional6 => "Additional Timer 6",
        }
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown timer type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timer type `{0}`")]
pub struct UnknownTimerType(pub String);

impl FromStr for TimerType {
    type Err = UnknownTimerType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TimerType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownTimerType(value.to_owned()))
    }
}

/// Lifecycle status of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Created,
    Running,
    Paused,
    Completed,
    Expired,
    Cancelled,
}

impl TimerStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TimerStatus::Completed | TimerStatus::Expired | TimerStatus::Cancelled
        )
    }

    /// Non-terminal statuses occupy the `(committee, type)` uniqueness slot.
    pub fn holds_slot(&self) -> bool {
        !self.is_terminal()
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Created => "created",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Completed => "completed",
            TimerStatus::Expired => "expired",
            TimerStatus::Cancelled => "cancelled",
        }
    }
}

/// One closed pause interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PauseRecord {
    pub paused_at: SystemTime,
    pub resumed_at: SystemTime,
    /// Milliseconds spent paused.
    pub duration_ms: u64,
}

/// Additive extension granted to a running or paused timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub added_seconds: u64,
    pub new_total_duration: u64,
    pub reason: Option<String>,
    pub granted_by: Option<String>,
    pub granted_at: SystemTime,
}

/// Kind of entry in the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerEventKind {
    Created,
    Started,
    Paused,
    Resumed,
    Extended,
    Completed,
    Cancelled,
    Expired,
    Warning,
}

/// Audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerEventRecord {
    pub kind: TimerEventKind,
    pub timestamp: SystemTime,
    pub triggered_by: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Persisted representation of one physical clock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerEntity {
    pub id: Uuid,
    pub committee_id: String,
    pub session_id: String,
    pub timer_type: TimerType,
    pub name: String,
    /// Configured duration in seconds, always at least one.
    pub total_duration: u64,
    /// Remaining seconds (countdown) or elapsed seconds (count-up) as of the last write.
    pub remaining_time: u64,
    pub count_down: bool,
    pub status: TimerStatus,
    pub started_at: Option<SystemTime>,
    pub paused_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub total_paused_ms: u64,
    pub pause_history: Vec<PauseRecord>,
    pub extensions: Vec<ExtensionRecord>,
    /// Thresholds in seconds, kept sorted in descending order.
    pub warning_times: Vec<u64>,
    pub fired_warnings: BTreeSet<u64>,
    pub controllable_by: Vec<String>,
    pub priority: i32,
    pub events: Vec<TimerEventRecord>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl TimerEntity {
    /// Whether this record currently occupies its `(committee, type)` slot.
    pub fn is_active(&self) -> bool {
        self.status.holds_slot()
    }
}

/// Filter applied when listing timers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerFilter {
    pub committee_id: Option<String>,
    pub session_id: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<TimerStatus>,
}

impl TimerFilter {
    /// Timers in one of the given statuses, across every committee.
    pub fn with_statuses(statuses: &[TimerStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    /// Check a record against the filter.
    pub fn matches(&self, timer: &TimerEntity) -> bool {
        self.committee_id
            .as_ref()
            .is_none_or(|id| *id == timer.committee_id)
            && self
                .session_id
                .as_ref()
                .is_none_or(|id| *id == timer.session_id)
            && (self.statuses.is_empty() || self.statuses.contains(&timer.status))
    }
}

/// Statuses that still need attention from callers listing "active" timers.
pub const ACTIVE_STATUSES: [TimerStatus; 3] = [
    TimerStatus::Created,
    TimerStatus::Running,
    TimerStatus::Paused,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_type_round_trips_wire_names() {
        for kind in TimerType::ALL {
            assert_eq!(kind.as_str().parse::<TimerType>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("additional_7".parse::<TimerType>().is_err());
    }

    #[test]
    fn terminal_statuses_release_the_slot() {
        assert!(TimerStatus::Created.holds_slot());
        assert!(TimerStatus::Running.holds_slot());
        assert!(TimerStatus::Paused.holds_slot());
        assert!(!TimerStatus::Completed.holds_slot());
        assert!(!TimerStatus::Expired.holds_slot());
        assert!(!TimerStatus::Cancelled.holds_slot());
    }
}
