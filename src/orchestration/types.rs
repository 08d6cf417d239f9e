//! Shared vocabulary of the supervisor, the spawn tools and the event channel.
//! Everything derives [`serde::Serialize`] so records can be returned to the
//! model as tool output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UUID v4 string.
pub type SubagentId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubagentStatus {
    pub fn is_terminal(self) -> bool {
        self != SubagentStatus::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubagentStatus::Running => "running",
            SubagentStatus::Completed => "completed",
            SubagentStatus::Failed => "failed",
            SubagentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubagentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubagentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SubagentStatus::Running),
            "completed" => Ok(SubagentStatus::Completed),
            "failed" => Ok(SubagentStatus::Failed),
            "cancelled" => Ok(SubagentStatus::Cancelled),
            other => Err(format!("unknown sub-agent status `{other}`")),
        }
    }
}

/// Where a spawn request came from, for completion notices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub channel_type: String,
    pub chat_id: String,
}

#[derive(Clone, Debug, Default)]
pub struct SpawnRequest {
    pub task: String,
    pub name: Option<String>,
    pub notify: bool,
    pub origin: Option<Origin>,
    pub specialist: Option<String>,
}

impl SpawnRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }
}

/// Bookkeeping for one background invocation.
///
/// `end_time` is `Some` exactly when `status` is terminal, and `result` and
/// `error` are never both set.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRecord {
    pub id: SubagentId,
    pub name: String,
    pub task: String,
    pub status: SubagentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub notify: bool,
}

impl SubagentRecord {
    /// Elapsed time, up to now while running and up to the end time afterwards.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_milliseconds().max(0)
    }
}

/// Snapshot returned by status queries.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentInfo {
    #[serde(flatten)]
    pub record: SubagentRecord,
    pub duration_ms: i64,
}

impl SubagentInfo {
    pub fn snapshot(record: &SubagentRecord) -> Self {
        Self {
            record: record.clone(),
            duration_ms: record.duration_ms(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(status: SubagentStatus, end: Option<DateTime<Utc>>) -> SubagentRecord {
        SubagentRecord {
            id: "a".into(),
            name: "a".into(),
            task: "t".into(),
            status,
            result: None,
            error: None,
            start_time: Utc::now() - Duration::seconds(10),
            end_time: end,
            notify: false,
        }
    }

    #[test]
    fn duration_of_terminal_record_is_frozen() {
        let r = record(SubagentStatus::Completed, None);
        let r = SubagentRecord {
            end_time: Some(r.start_time + Duration::seconds(2)),
            ..r
        };
        assert_eq!(r.duration_ms(Utc::now()), 2000);
        assert_eq!(r.duration_ms(Utc::now() + Duration::hours(1)), 2000);
    }

    #[test]
    fn duration_of_running_record_tracks_now() {
        let r = record(SubagentStatus::Running, None);
        assert!(r.duration_ms(Utc::now()) >= 10_000);
    }

    #[test]
    fn status_parses_and_serializes_lowercase() {
        assert_eq!("cancelled".parse::<SubagentStatus>().unwrap(), SubagentStatus::Cancelled);
        assert!("killed".parse::<SubagentStatus>().is_err());
        assert_eq!(serde_json::to_value(SubagentStatus::Failed).unwrap(), "failed");
    }

    #[test]
    fn info_flattens_record() {
        let info = SubagentInfo::snapshot(&record(SubagentStatus::Running, None));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "running");
        assert!(json.get("durationMs").is_some());
        assert!(json.get("endTime").is_none());
    }
}
