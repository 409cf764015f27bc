mod support;

use chrono::{Duration, Utc};
use taskstate::collab::ChannelSink;
use taskstate::oplog::{CommandKind, Operation};
use taskstate::task::{Priority, TaskDraft, TaskPatch, TaskStatus};
use taskstate::undo::Direction;
use taskstate::TaskEngine;

use support::{date, seed};

/// Apply one mutation, then check undo restores the prior state and redo
/// restores the post state.
fn assert_round_trip(engine: &mut TaskEngine, mutate: impl FnOnce(&mut TaskEngine)) {
    let before = engine.repository().clone();
    mutate(engine);
    let after = engine.repository().clone();

    assert!(engine.undo());
    assert_eq!(engine.repository(), &before);
    assert!(engine.redo());
    assert_eq!(engine.repository(), &after);
}

#[test]
fn every_mutation_round_trips_through_undo_and_redo() {
    let mut engine = TaskEngine::default();
    let ids = seed(&mut engine, 2);
    let (a, b) = (ids[0].clone(), ids[1].clone());

    assert_round_trip(&mut engine, |engine| {
        engine
            .create(TaskDraft::new("fresh").with_tag("home"))
            .expect("create");
    });
    assert_round_trip(&mut engine, |engine| {
        let patch = TaskPatch::from_json(serde_json::json!({
            "title": "Renamed",
            "priority": "high",
            "dueDate": "2025-08-01",
            "tags": ["work"],
        }))
        .expect("patch");
        engine.update(&a, patch).expect("update");
    });
    assert_round_trip(&mut engine, |engine| {
        engine.complete(&a).expect("complete");
    });
    assert_round_trip(&mut engine, |engine| {
        engine
            .snooze(&b, Utc::now() + Duration::hours(3))
            .expect("snooze");
    });
    assert_round_trip(&mut engine, |engine| {
        engine
            .reschedule(&b, date(2025, 9, 1), Some("later".to_string()))
            .expect("reschedule");
    });
    assert_round_trip(&mut engine, |engine| {
        engine.delete(&a).expect("delete");
    });
}

#[test]
fn create_update_complete_then_undo_and_redo_three_times() {
    let mut engine = TaskEngine::default();
    let task = engine
        .create(TaskDraft::new("Write report").with_priority(Priority::Low))
        .expect("create");
    engine
        .update(
            &task.id,
            TaskPatch {
                priority: Some(Priority::High),
                ..TaskPatch::default()
            },
        )
        .expect("update");
    engine.complete(&task.id).expect("complete");
    let completed = engine.repository().clone();

    assert!(engine.undo());
    let current = engine.get(&task.id).expect("task");
    assert_eq!(current.status, TaskStatus::Pending);
    assert!(!current.completed);
    assert_eq!(current.priority, Priority::High);

    assert!(engine.undo());
    assert_eq!(engine.get(&task.id).expect("task").priority, Priority::Low);

    assert!(engine.undo());
    assert!(engine.get(&task.id).is_none());
    assert!(!engine.can_undo());
    assert!(engine.can_redo());

    assert!(engine.redo());
    assert_eq!(engine.get(&task.id).expect("task").priority, Priority::Low);
    assert!(engine.redo());
    assert_eq!(engine.get(&task.id).expect("task").priority, Priority::High);
    assert!(engine.redo());
    assert_eq!(engine.repository(), &completed);
    assert!(!engine.can_redo());
}

#[test]
fn mixed_sequence_undoes_to_empty_and_redoes_to_final_state() {
    let mut engine = TaskEngine::default();
    let a = engine
        .create(TaskDraft::new("Pack bags").with_due_date(date(2025, 6, 20)))
        .expect("create a")
        .id;
    let b = engine
        .create(TaskDraft::new("Book train").with_due_date(date(2025, 6, 21)))
        .expect("create b")
        .id;
    let patch = TaskPatch::from_json(serde_json::json!({ "title": "Pack light", "priority": "high" }))
        .expect("patch");
    engine.update(&a, patch).expect("update");
    engine
        .snooze(&b, Utc::now() + Duration::hours(2))
        .expect("snooze");
    engine.complete(&a).expect("complete");
    engine
        .bulk_reschedule(&[a.clone(), b.clone()], date(2025, 7, 1), Some("strike".to_string()))
        .expect("bulk reschedule");
    engine.delete(&b).expect("delete");

    let final_state = engine.repository().clone();
    let mut undone = 0;
    while engine.undo() {
        undone += 1;
    }
    assert_eq!(undone, 7);
    assert!(engine.repository().is_empty());
    assert!(!engine.can_undo());

    let mut redone = 0;
    while engine.redo() {
        redone += 1;
    }
    assert_eq!(redone, 7);
    assert_eq!(engine.repository(), &final_state);
    assert!(!engine.can_redo());
}

#[test]
fn reschedule_scenario() {
    let mut engine = TaskEngine::default();
    let task = engine
        .create(TaskDraft::new("Trip").with_due_date(date(2025, 6, 20)))
        .expect("create");

    let moved = engine
        .reschedule(&task.id, date(2025, 7, 1), Some("vacation".to_string()))
        .expect("reschedule");
    assert_eq!(moved.rescheduled_from, Some(date(2025, 6, 20)));
    assert_eq!(moved.due_date, Some(date(2025, 7, 1)));
    assert_eq!(moved.rescheduled_reason.as_deref(), Some("vacation"));

    let command = engine.history().peek_undo().expect("command");
    assert_eq!(command.operation, Operation::Reschedule);
    assert_eq!(command.kind(), Some(CommandKind::Update));

    assert!(engine.undo());
    let restored = engine.get(&task.id).expect("task");
    assert_eq!(restored.due_date, Some(date(2025, 6, 20)));
    assert_eq!(restored.rescheduled_from, None);
    assert_eq!(restored.rescheduled_reason, None);
}

#[test]
fn new_mutation_after_undo_discards_redo_branch() {
    let mut engine = TaskEngine::default();
    let ids = seed(&mut engine, 3);
    engine.undo();
    engine.undo();
    assert!(engine.can_redo());

    engine.complete(&ids[0]).expect("complete");
    assert!(!engine.can_redo());
    assert!(!engine.redo());
    assert_eq!(engine.history().len(), 2);
    assert_eq!(engine.history().cursor(), Some(1));
    assert!(engine.get(&ids[1]).is_none());
}

#[test]
fn capacity_evicts_oldest_and_keeps_cursor_valid() {
    let mut engine = TaskEngine::builder().history_capacity(3).build();
    let ids = seed(&mut engine, 5);
    assert_eq!(engine.history().len(), 3);
    assert_eq!(engine.history().cursor(), Some(2));

    for _ in 0..3 {
        assert!(engine.undo());
    }
    assert!(!engine.undo());

    // The two oldest creates are no longer undoable.
    assert!(engine.get(&ids[0]).is_some());
    assert!(engine.get(&ids[1]).is_some());
    assert!(engine.get(&ids[2]).is_none());
}

#[test]
fn default_history_holds_fifty_commands() {
    let mut engine = TaskEngine::default();
    seed(&mut engine, 60);
    assert_eq!(engine.history().capacity(), 50);
    assert_eq!(engine.history().len(), 50);
    let mut undone = 0;
    while engine.undo() {
        undone += 1;
    }
    assert_eq!(undone, 50);
    assert_eq!(engine.list().len(), 10);
}

#[test]
fn sink_sees_apply_undo_and_redo() {
    let (sink, mut rx) = ChannelSink::new();
    let mut engine = TaskEngine::builder().sink(sink).build();
    let task = engine.create(TaskDraft::new("a")).expect("create");
    engine.undo();
    engine.redo();

    let mut directions = Vec::new();
    while let Ok(request) = rx.try_recv() {
        assert_eq!(request.command.task_ids(), vec![task.id.clone()]);
        directions.push(request.direction);
    }
    assert_eq!(
        directions,
        vec![Direction::Apply, Direction::Undo, Direction::Redo]
    );
    assert!(engine.persist_failures().is_empty());
}

#[test]
fn closed_sink_records_failures_without_rollback() {
    let (sink, rx) = ChannelSink::new();
    drop(rx);
    let mut engine = TaskEngine::builder().sink(sink).build();
    let task = engine.create(TaskDraft::new("a")).expect("create");
    engine.complete(&task.id).expect("complete");

    assert!(engine.get(&task.id).expect("task").completed);
    assert_eq!(engine.history().len(), 2);
    let operations: Vec<Operation> = engine
        .persist_failures()
        .iter()
        .map(|failure| failure.operation)
        .collect();
    assert_eq!(operations, vec![Operation::Create, Operation::Complete]);
}
