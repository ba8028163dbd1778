//! Scheduled task records and schedule arithmetic

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// When a task should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Schedule {
    /// Run once at a fixed time, then never again
    OnceAt { at: DateTime<Utc> },

    /// Run every `secs` seconds
    Every { secs: u64 },

    /// Run on a cron expression (5-field; a seconds field of 0 is assumed)
    Cron { expr: String },
}

impl Schedule {
    /// Convenience constructor for interval schedules
    pub fn every(interval: Duration) -> Self {
        Schedule::Every {
            secs: interval.as_secs().max(1),
        }
    }

    /// The first time this schedule should fire, relative to `now`
    pub fn first_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::OnceAt { at } => Some(*at),
            _ => self.next_run_after(now),
        }
    }

    /// The next time this schedule should fire after `after`
    ///
    /// Returns `None` for one-shot schedules (they never recur) and for
    /// unparseable cron expressions.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::OnceAt { .. } => None,
            Schedule::Every { secs } => Some(after + chrono::Duration::seconds(*secs as i64)),
            Schedule::Cron { expr } => {
                let normalized = normalize_cron(expr);
                match cron::Schedule::from_str(&normalized) {
                    Ok(schedule) => schedule.after(&after).next(),
                    Err(e) => {
                        debug!(expr, error = %e, "Unparseable cron expression");
                        None
                    }
                }
            }
        }
    }

    /// Whether this schedule fires more than once
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Schedule::OnceAt { .. })
    }
}

/// The `cron` crate wants a seconds field; user-facing expressions are the
/// classic 5-field form, so prepend `0` when only 5 fields are present.
fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

/// Lifecycle state of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Where a task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOrigin {
    /// Created interactively by the user
    User,
    /// Enqueued by the event router for a deferred event
    EventRouter,
    /// Enqueued by the self-improvement pipeline
    SelfImprovement,
}

/// A persisted scheduled task
///
/// The natural-language `task_string` is run through the agent exactly as
/// if the user had typed it; the scheduler only manages the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique task id (UUID v7, sortable by creation time)
    pub id: String,

    /// Natural-language directive to run
    pub task_string: String,

    /// When to run
    pub schedule: Schedule,

    /// Next dispatch time
    pub next_run_at: DateTime<Utc>,

    /// Last dispatch time, if the task has ever run
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Who created the task
    pub origin: TaskOrigin,

    /// Error message from the most recent failed run
    #[serde(default)]
    pub error: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create a new pending task
    ///
    /// Returns `None` if the schedule can never fire (e.g. a cron
    /// expression that does not parse).
    pub fn new(task_string: impl Into<String>, schedule: Schedule, origin: TaskOrigin) -> Option<Self> {
        let now = Utc::now();
        let next_run_at = schedule.first_run(now)?;
        Some(Self {
            id: Uuid::now_v7().to_string(),
            task_string: task_string.into(),
            schedule,
            next_run_at,
            last_run_at: None,
            status: TaskStatus::Pending,
            origin,
            error: None,
            created_at: now,
        })
    }

    /// Whether this task is ready to dispatch at `now`
    ///
    /// A running task is never due again until it transitions.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.next_run_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_once_at_never_recurs() {
        let when = at("2026-03-01T09:00:00Z");
        let schedule = Schedule::OnceAt { at: when };

        assert_eq!(schedule.first_run(Utc::now()), Some(when));
        assert_eq!(schedule.next_run_after(when), None);
        assert!(!schedule.is_recurring());
    }

    #[test]
    fn test_every_advances_by_interval() {
        let schedule = Schedule::every(Duration::from_secs(300));
        let now = at("2026-03-01T09:00:00Z");

        let next = schedule.next_run_after(now).unwrap();
        assert_eq!(next, at("2026-03-01T09:05:00Z"));
        assert!(schedule.is_recurring());
    }

    #[test]
    fn test_cron_five_field_normalized() {
        // Every day at 07:30
        let schedule = Schedule::Cron {
            expr: "30 7 * * *".to_string(),
        };
        let now = at("2026-03-01T09:00:00Z");

        let next = schedule.next_run_after(now).unwrap();
        assert_eq!(next, at("2026-03-02T07:30:00Z"));
    }

    #[test]
    fn test_cron_invalid_expression() {
        let schedule = Schedule::Cron {
            expr: "not a cron line".to_string(),
        };
        assert_eq!(schedule.next_run_after(Utc::now()), None);
        assert!(ScheduledTask::new("x", schedule, TaskOrigin::User).is_none());
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = ScheduledTask::new(
            "check the mail",
            Schedule::every(Duration::from_secs(60)),
            TaskOrigin::User,
        )
        .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.last_run_at.is_none());
        assert!(task.error.is_none());
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_is_due_respects_status() {
        let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut task = ScheduledTask::new(
            "x",
            Schedule::OnceAt { at: past },
            TaskOrigin::User,
        )
        .unwrap();

        assert!(task.is_due(Utc::now()));

        task.status = TaskStatus::Running;
        assert!(!task.is_due(Utc::now()));

        task.status = TaskStatus::Completed;
        assert!(!task.is_due(Utc::now()));
    }

    #[test]
    fn test_schedule_serde_round_trip() {
        let schedules = vec![
            Schedule::OnceAt {
                at: at("2026-03-01T09:00:00Z"),
            },
            Schedule::Every { secs: 900 },
            Schedule::Cron {
                expr: "0 9 * * 1-5".to_string(),
            },
        ];

        for schedule in schedules {
            let json = serde_json::to_string(&schedule).unwrap();
            let back: Schedule = serde_json::from_str(&json).unwrap();
            assert_eq!(back, schedule);
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }
}
