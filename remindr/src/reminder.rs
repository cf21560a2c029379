//! Decides which reminders a task needs at a given instant.
//!
//! A task has two reminders, one opening a day before the due time and one
//! opening an hour before it. A reminder is due while its window is open,
//! its flag is unset and the task is still pending. Once the due time has
//! passed nothing is sent, however late the scheduler runs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::task::Task;

/// The reminders sent ahead of a task's due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Day,
    Hour,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::Day, ReminderKind::Hour];

    /// How long before the due time the reminder window opens.
    pub fn offset(self) -> Duration {
        match self {
            ReminderKind::Day => Duration::days(1),
            ReminderKind::Hour => Duration::hours(1),
        }
    }

    /// Human readable lead time, e.g. "1 day".
    pub fn lead_time(self) -> &'static str {
        match self {
            ReminderKind::Day => "1 day",
            ReminderKind::Hour => "1 hour",
        }
    }

    /// Returns whether `now` falls inside the window `[due - offset, due)`.
    pub fn window_contains(self, due_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= due_at - self.offset() && now < due_at
    }
}

/// Returns the reminders that are due for `task` at `now`, day before hour.
pub fn due_reminders(now: DateTime<Utc>, task: &Task) -> Vec<ReminderKind> {
    if !task.is_pending() {
        return Vec::new();
    }
    ReminderKind::ALL
        .into_iter()
        .filter(|kind| !task.reminder_sent(*kind))
        .filter(|kind| kind.window_contains(task.due_at(), now))
        .collect()
}
