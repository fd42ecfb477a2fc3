use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{sqlite::SqliteRow, Row};
use tx_core::{
    error::CoreError,
    models::{
        AssigneeType, CandidateStatus, ClaimStatus, Confidence, NodeType, RunStatus, Task,
        TaskStatus, WorkerStatus,
    },
};

pub fn status_to_string(status: TaskStatus) -> &'static str {
    status.as_str()
}

pub fn string_to_status(s: &str) -> tx_core::error::Result<TaskStatus> {
    TaskStatus::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid task status in database: {s}")))
}

pub fn assignee_type_to_string(t: AssigneeType) -> &'static str {
    t.as_str()
}

pub fn string_to_assignee_type(s: &str) -> tx_core::error::Result<AssigneeType> {
    AssigneeType::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid assignee_type in database: {s}")))
}

pub fn claim_status_to_string(s: ClaimStatus) -> &'static str {
    s.as_str()
}

pub fn string_to_claim_status(s: &str) -> tx_core::error::Result<ClaimStatus> {
    ClaimStatus::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid claim status in database: {s}")))
}

pub fn worker_status_to_string(s: WorkerStatus) -> &'static str {
    s.as_str()
}

pub fn string_to_worker_status(s: &str) -> tx_core::error::Result<WorkerStatus> {
    WorkerStatus::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid worker status in database: {s}")))
}

pub fn run_status_to_string(s: RunStatus) -> &'static str {
    s.as_str()
}

pub fn string_to_run_status(s: &str) -> tx_core::error::Result<RunStatus> {
    RunStatus::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid run status in database: {s}")))
}

pub fn node_type_to_string(t: NodeType) -> &'static str {
    t.as_str()
}

pub fn string_to_node_type(s: &str) -> tx_core::error::Result<NodeType> {
    NodeType::from_str(s)
        .ok_or_else(|| CoreError::Database(format!("invalid node type in database: {s}")))
}

pub fn confidence_to_string(c: Confidence) -> &'static str {
    match c {
        Confidence::Low => "low",
        Confidence::Medium => "medium",
        Confidence::High => "high",
    }
}

pub fn string_to_confidence(s: &str) -> tx_core::error::Result<Confidence> {
    match s {
        "low" => Ok(Confidence::Low),
        "medium" => Ok(Confidence::Medium),
        "high" => Ok(Confidence::High),
        _ => Err(CoreError::Database(format!("invalid confidence in database: {s}"))),
    }
}

pub fn candidate_status_to_string(s: CandidateStatus) -> &'static str {
    match s {
        CandidateStatus::Pending => "pending",
        CandidateStatus::Promoted => "promoted",
        CandidateStatus::Rejected => "rejected",
    }
}

pub fn string_to_candidate_status(s: &str) -> tx_core::error::Result<CandidateStatus> {
    match s {
        "pending" => Ok(CandidateStatus::Pending),
        "promoted" => Ok(CandidateStatus::Promoted),
        "rejected" => Ok(CandidateStatus::Rejected),
        _ => Err(CoreError::Database(format!("invalid candidate status in database: {s}"))),
    }
}

/// Maps a `tasks` row to the domain `Task`. Metadata defaults to an empty
/// JSON object when the column is NULL, mirroring how the teacher's
/// `row_to_task` falls back to a default for nullable MCP-v2 columns.
pub fn row_to_task(row: &SqliteRow) -> tx_core::error::Result<Task> {
    let status_str: String = row.get("status");
    let status = string_to_status(&status_str)?;

    let metadata: Option<String> = row.try_get("metadata").ok().flatten();
    let metadata = metadata
        .and_then(|m| serde_json::from_str::<JsonValue>(&m).ok())
        .unwrap_or_else(|| JsonValue::Object(Default::default()));

    let assignee_type: Option<String> = row.try_get("assignee_type").ok().flatten();
    let assignee_type = assignee_type
        .map(|s| string_to_assignee_type(&s))
        .transpose()?;

    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.try_get("description").ok().flatten(),
        status,
        parent_id: row.try_get("parent_id").ok().flatten(),
        score: row.try_get("score").unwrap_or(0.0),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.try_get("completed_at").ok().flatten(),
        metadata,
        assignee_type,
        assignee_id: row.try_get("assignee_id").ok().flatten(),
        assigned_at: row.try_get("assigned_at").ok().flatten(),
        assigned_by: row.try_get("assigned_by").ok().flatten(),
    })
}

/// Converts a `sqlx::Error` into the domain `CoreError`, classifying
/// UNIQUE-constraint violations on `tasks.id` distinctly from generic
/// database failures the way the teacher's `sqlx_error_to_task_error` does
/// for `tasks.code`.
pub fn sqlx_error_to_core_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                CoreError::Database(format!("unique constraint violated: {message}"))
            } else if message.contains("CHECK constraint failed") {
                CoreError::Validation(format!("check constraint violated: {message}"))
            } else if message.contains("FOREIGN KEY constraint failed") {
                CoreError::Validation(format!("foreign key constraint violated: {message}"))
            } else {
                CoreError::Database(format!("database constraint error: {message}"))
            }
        }
        sqlx::Error::RowNotFound => CoreError::Database("unexpected row-not-found".to_string()),
        sqlx::Error::PoolTimedOut => CoreError::Database("connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => CoreError::Database(format!("database I/O error: {io_err}")),
        _ => CoreError::Database(format!("database operation failed: {err}")),
    }
}

pub fn parse_timestamp(s: &str) -> tx_core::error::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Database(format!("invalid timestamp in database: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::Planning,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::Review,
            TaskStatus::Done,
            TaskStatus::Cancelled,
            TaskStatus::Failed,
        ] {
            assert_eq!(string_to_status(status_to_string(s)).unwrap(), s);
        }
        assert!(string_to_status("bogus").is_err());
    }

    #[test]
    fn claim_status_round_trips() {
        for s in [
            ClaimStatus::Active,
            ClaimStatus::Released,
            ClaimStatus::Expired,
            ClaimStatus::Completed,
        ] {
            assert_eq!(string_to_claim_status(claim_status_to_string(s)).unwrap(), s);
        }
    }

    #[test]
    fn confidence_round_trips() {
        for c in [Confidence::Low, Confidence::Medium, Confidence::High] {
            assert_eq!(string_to_confidence(confidence_to_string(c)).unwrap(), c);
        }
    }
}
