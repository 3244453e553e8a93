//! Property tests for the task model.
//!
//! 1. `completed_at` is `Some` exactly when the task is completed, for any
//!    sequence of status changes.
//! 2. The completion time only moves when the task re-enters `completed`.
//! 3. Arbitrary strings never panic the JSON decoders (they return `Err`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use tasksync_proto::api::{DataEnvelope, TaskDraft, TaskListDraft};
use tasksync_proto::{ListId, Task, TaskId, TaskList, TaskStatus};

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn fresh_task() -> Task {
    Task {
        id: TaskId::new(1),
        title: "t".to_string(),
        description: None,
        status: TaskStatus::Pending,
        estimated_minutes: 0,
        assigned_to: None,
        due_date: None,
        completed_at: None,
        task_list: ListId::new(1),
    }
}

proptest! {
    #[test]
    fn completed_at_tracks_status(steps in prop::collection::vec(arb_status(), 0..40)) {
        let mut task = fresh_task();
        for (i, status) in steps.into_iter().enumerate() {
            task.apply_status(status, at(i64::try_from(i).unwrap()));
            prop_assert_eq!(task.completed_at.is_some(), task.is_completed());
        }
    }

    #[test]
    fn completion_time_moves_only_on_reentry(steps in prop::collection::vec(arb_status(), 1..40)) {
        let mut task = fresh_task();
        let mut expected: Option<DateTime<Utc>> = None;
        for (i, status) in steps.into_iter().enumerate() {
            let now = at(i64::try_from(i).unwrap());
            let was_completed = task.is_completed();
            task.apply_status(status, now);
            expected = match (was_completed, status) {
                (true, TaskStatus::Completed) => expected,
                (false, TaskStatus::Completed) => Some(now),
                _ => None,
            };
            prop_assert_eq!(task.completed_at, expected);
        }
    }

    #[test]
    fn decoders_never_panic(input in ".{0,256}") {
        let _ = serde_json::from_str::<TaskList>(&input);
        let _ = serde_json::from_str::<Task>(&input);
        let _ = serde_json::from_str::<DataEnvelope<TaskDraft>>(&input);
        let _ = serde_json::from_str::<DataEnvelope<Vec<TaskListDraft>>>(&input);
    }
}
