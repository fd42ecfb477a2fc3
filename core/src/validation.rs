use crate::{
    error::{CoreError, Result},
    models::{NewTask, Task, TaskStatus},
};
use regex::Regex;
use std::sync::OnceLock;

/// IDs are content-addressed, lower-case, and carry a type prefix so that a
/// bare string makes its entity kind obvious in logs, JSONL files, and CLI
/// output (`tx-4f9a2c`, `wk-...`, `rn-...`, `lr-...`, `cd-...`).
fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}-[a-z0-9]{6,}$").expect("static id pattern"))
}

/// Matches Unicode format characters (category `Cf`: zero-width space, BOM,
/// bidi controls, ...) — invisible codepoints that would otherwise let a
/// title of e.g. a single `U+200B` pass the emptiness check.
fn format_char_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{Cf}").expect("static format-char pattern"))
}

/// Validates that `id` matches the `<prefix>-<base36>` shape enforced by the
/// store's CHECK constraint. Does not check the prefix itself — callers that
/// care about entity kind should match on the prefix separately.
pub fn validate_id_format(id: &str) -> Result<()> {
    if id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(CoreError::invalid_id_format(id))
    }
}

/// Generates a fresh task id (`tx-` prefix) from random bytes, hex-encoded.
/// Collisions are handled by the store's uniqueness constraint, not here.
pub fn generate_task_id() -> String {
    generate_id("tx")
}

pub fn generate_worker_id() -> String {
    generate_id("wk")
}

pub fn generate_run_id() -> String {
    generate_id("rn")
}

pub fn generate_learning_id() -> String {
    generate_id("lr")
}

pub fn generate_candidate_id() -> String {
    generate_id("cd")
}

fn generate_id(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut bytes = [0u8; 8];
    let mut rest = nanos;
    for b in bytes.iter_mut() {
        *b = (rest & 0xff) as u8;
        rest >>= 8;
    }
    // mix in the address of a fresh stack allocation as cheap extra entropy
    // so two ids generated in the same nanosecond don't collide.
    let salt = &bytes as *const _ as usize;
    let mixed = nanos ^ (salt as u128);
    format!("{prefix}-{mixed:x}")
}

/// Title must be non-empty after trimming whitespace and Unicode format
/// characters, and within a sane display length.
pub fn validate_title(title: &str) -> Result<()> {
    let visible = format_char_pattern().replace_all(title, "");
    let trimmed = visible.trim();
    if trimmed.is_empty() {
        return Err(CoreError::empty_field("title"));
    }
    if trimmed.chars().count() > 200 {
        return Err(CoreError::field_too_long("title", 200));
    }
    Ok(())
}

/// Description, if present, must fit the same bound the teacher used for
/// task descriptions.
pub fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(d) = description {
        if d.trim().chars().count() > 2000 {
            return Err(CoreError::field_too_long("description", 2000));
        }
    }
    Ok(())
}

/// Priority score must be finite; the store's ordering indexes assume a
/// total order over `f64`, which NaN breaks.
pub fn validate_score(score: f64) -> Result<()> {
    if !score.is_finite() {
        return Err(CoreError::Validation("score must be a finite number".to_string()));
    }
    Ok(())
}

/// Validates a [`NewTask`] payload in full, composing the field-level checks
/// above.
pub fn validate_new_task(task: &NewTask) -> Result<()> {
    validate_title(&task.title)?;
    validate_description(task.description.as_deref())?;
    if let Some(score) = task.score {
        validate_score(score)?;
    }
    if let Some(ref parent) = task.parent_id {
        validate_id_format(parent)?;
    }
    Ok(())
}

/// Checks a requested status transition against the static legality table,
/// returning [`CoreError::InvalidStateTransition`] on rejection. Privileged
/// `forceStatus`-style writes must bypass this function entirely rather than
/// call it and ignore the result.
pub fn validate_state_transition(task: &Task, new_status: TaskStatus) -> Result<()> {
    if task.status.can_transition_to(new_status) {
        Ok(())
    } else {
        Err(CoreError::invalid_transition(task.status, new_status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample_task(status: TaskStatus) -> Task {
        Task {
            id: "tx-abc123".to_string(),
            title: "Sample".to_string(),
            description: None,
            status,
            parent_id: None,
            score: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            metadata: json!({}),
            assignee_type: None,
            assignee_id: None,
            assigned_at: None,
            assigned_by: None,
        }
    }

    #[test]
    fn id_format_accepts_generated_ids() {
        assert!(validate_id_format(&generate_task_id()).is_ok());
        assert!(validate_id_format(&generate_worker_id()).is_ok());
        assert!(validate_id_format("tx-4f9a2c").is_ok());
    }

    #[test]
    fn id_format_rejects_malformed_ids() {
        assert!(validate_id_format("tx_4f9a2c").is_err());
        assert!(validate_id_format("4f9a2c").is_err());
        assert!(validate_id_format("tx-A1B2C3").is_err());
        assert!(validate_id_format("t-4f9a2c").is_err());
        assert!(validate_id_format("tx-abc").is_ok());
        assert!(validate_id_format("tx-ab").is_err());
    }

    #[test]
    fn title_rejects_blank_and_oversized() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"a".repeat(201)).is_err());
        assert!(validate_title("Do the thing").is_ok());
    }

    #[test]
    fn title_rejects_format_characters_masquerading_as_content() {
        assert!(validate_title("\u{200B}").is_err());
        assert!(validate_title("\u{FEFF}").is_err());
        assert!(validate_title("  \u{200B}\u{200B}  ").is_err());
        assert!(validate_title("Do\u{200B}the thing").is_ok());
    }

    #[test]
    fn score_rejects_non_finite() {
        assert!(validate_score(f64::NAN).is_err());
        assert!(validate_score(f64::INFINITY).is_err());
        assert!(validate_score(1.5).is_ok());
    }

    #[test]
    fn new_task_validation_composes_field_checks() {
        let ok = NewTask {
            title: "Ship it".to_string(),
            description: Some("details".to_string()),
            parent_id: None,
            score: Some(1.0),
            metadata: None,
            assignee_type: None,
            assignee_id: None,
        };
        assert!(validate_new_task(&ok).is_ok());

        let bad = NewTask {
            title: "".to_string(),
            ..Default::default()
        };
        assert!(validate_new_task(&bad).is_err());
    }

    #[test]
    fn state_transition_delegates_to_status_table() {
        let task = sample_task(TaskStatus::Backlog);
        assert!(validate_state_transition(&task, TaskStatus::Ready).is_ok());
        assert!(validate_state_transition(&task, TaskStatus::Done).is_err());
    }
}
