use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    ExtensionRecord, PauseRecord, TimerEntity, TimerEventKind, TimerEventRecord, TimerStatus,
    TimerType,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTimerDocument {
    #[serde(rename = "_id")]
    id: String,
    committee_id: String,
    session_id: String,
    timer_type: TimerType,
    name: String,
    total_duration: i64,
    remaining_time: i64,
    count_down: bool,
    status: TimerStatus,
    /// Mirrors `status` being non-terminal; the partial unique index keys on it.
    active: bool,
    started_at: Option<DateTime>,
    paused_at: Option<DateTime>,
    completed_at: Option<DateTime>,
    total_paused_ms: i64,
    #[serde(default)]
    pause_history: Vec<MongoPauseRecord>,
    #[serde(default)]
    extensions: Vec<MongoExtensionRecord>,
    #[serde(default)]
    warning_times: Vec<i64>,
    #[serde(default)]
    fired_warnings: Vec<i64>,
    #[serde(default)]
    controllable_by: Vec<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    events: Vec<MongoEventRecord>,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoPauseRecord {
    paused_at: DateTime,
    resumed_at: DateTime,
    duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoExtensionRecord {
    added_seconds: i64,
    new_total_duration: i64,
    reason: Option<String>,
    granted_by: Option<String>,
    granted_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoEventRecord {
    kind: TimerEventKind,
    timestamp: DateTime,
    triggered_by: Option<String>,
    #[serde(default)]
    details: serde_json::Value,
}

impl MongoTimerDocument {
    pub fn committee_id(&self) -> &str {
        &self.committee_id
    }

    pub fn timer_type(&self) -> TimerType {
        self.timer_type
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl From<TimerEntity> for MongoTimerDocument {
    fn from(value: TimerEntity) -> Self {
        let active = value.is_active();
        Self {
            id: value.id.to_string(),
            committee_id: value.committee_id,
            session_id: value.session_id,
            timer_type: value.timer_type,
            name: value.name,
            total_duration: to_i64(value.total_duration),
            remaining_time: to_i64(value.remaining_time),
            count_down: value.count_down,
            status: value.status,
            active,
            started_at: value.started_at.map(DateTime::from_system_time),
            paused_at: value.paused_at.map(DateTime::from_system_time),
            completed_at: value.completed_at.map(DateTime::from_system_time),
            total_paused_ms: to_i64(value.total_paused_ms),
            pause_history: value
                .pause_history
                .into_iter()
                .map(|record| MongoPauseRecord {
                    paused_at: DateTime::from_system_time(record.paused_at),
                    resumed_at: DateTime::from_system_time(record.resumed_at),
                    duration_ms: to_i64(record.duration_ms),
                })
                .collect(),
            extensions: value
                .extensions
                .into_iter()
                .map(|record| MongoExtensionRecord {
                    added_seconds: to_i64(record.added_seconds),
                    new_total_duration: to_i64(record.new_total_duration),
                    reason: record.reason,
                    granted_by: record.granted_by,
                    granted_at: DateTime::from_system_time(record.granted_at),
                })
                .collect(),
            warning_times: value.warning_times.into_iter().map(to_i64).collect(),
            fired_warnings: value.fired_warnings.into_iter().map(to_i64).collect(),
            controllable_by: value.controllable_by,
            priority: value.priority,
            events: value
                .events
                .into_iter()
                .map(|event| MongoEventRecord {
                    kind: event.kind,
                    timestamp: DateTime::from_system_time(event.timestamp),
                    triggered_by: event.triggered_by,
                    details: event.details,
                })
                .collect(),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoTimerDocument> for TimerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoTimerDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|source| MongoDaoError::CorruptDocument {
            id: value.id.clone(),
            source,
        })?;

        Ok(Self {
            id,
            committee_id: value.committee_id,
            session_id: value.session_id,
            timer_type: value.timer_type,
            name: value.name,
            total_duration: to_u64(value.total_duration),
            remaining_time: to_u64(value.remaining_time),
            count_down: value.count_down,
            status: value.status,
            started_at: value.started_at.map(DateTime::to_system_time),
            paused_at: value.paused_at.map(DateTime::to_system_time),
            completed_at: value.completed_at.map(DateTime::to_system_time),
            total_paused_ms: to_u64(value.total_paused_ms),
            pause_history: value
                .pause_history
                .into_iter()
                .map(|record| PauseRecord {
                    paused_at: record.paused_at.to_system_time(),
                    resumed_at: record.resumed_at.to_system_time(),
                    duration_ms: to_u64(record.duration_ms),
                })
                .collect(),
            extensions: value
                .extensions
                .into_iter()
                .map(|record| ExtensionRecord {
                    added_seconds: to_u64(record.added_seconds),
                    new_total_duration: to_u64(record.new_total_duration),
                    reason: record.reason,
                    granted_by: record.granted_by,
                    granted_at: record.granted_at.to_system_time(),
                })
                .collect(),
            warning_times: value.warning_times.into_iter().map(to_u64).collect(),
            fired_warnings: value.fired_warnings.into_iter().map(to_u64).collect(),
            controllable_by: value.controllable_by,
            priority: value.priority,
            events: value
                .events
                .into_iter()
                .map(|event| TimerEventRecord {
                    kind: event.kind,
                    timestamp: event.timestamp.to_system_time(),
                    triggered_by: event.triggered_by,
                    details: event.details,
                })
                .collect(),
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}
