//! Integration tests for the pending shift confirmation workflow.

mod common;

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use common::{at, Harness};
use geoshift_core::{
    CoreError, Notice, PendingShift, PersistenceError, StoreError, ValidationError,
};
use uuid::Uuid;

fn pending(start: DateTime<Utc>, end: DateTime<Utc>) -> PendingShift {
    PendingShift {
        id: Uuid::new_v4(),
        session_id: Some(Uuid::new_v4()),
        start_time: start,
        end_time: end,
        duration_minutes: (end - start).num_minutes(),
        date: start.date_naive(),
        original_start_time: start,
        original_end_time: end,
        was_rounded: true,
    }
}

async fn seed(h: &Harness, shifts: &[PendingShift]) {
    let guard = h.store.lock().await;
    let record = guard.load_pending().await.unwrap();
    guard.commit_pending(&record, shifts).await.unwrap();
}

fn three() -> Vec<PendingShift> {
    vec![
        pending(at(8, 0), at(12, 0)),
        pending(at(13, 0), at(17, 0)),
        pending(at(18, 0), at(20, 30)),
    ]
}

#[tokio::test]
async fn test_accept_removes_exactly_that_index() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    let workflow = h.workflow();

    let stored = workflow.accept(1).await.unwrap();
    assert_eq!(stored.shift.start_time, at(13, 0));
    assert_eq!(stored.shift.end_time, at(17, 0));
    assert_eq!(stored.shift.duration_minutes, 240);
    assert_eq!(stored.shift.user_id, "user-1");
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 1);

    let remaining = workflow.list().await.unwrap();
    assert_eq!(remaining, vec![shifts[0].clone(), shifts[2].clone()]);
    assert!(h.notifier.notices().contains(&Notice::ShiftAccepted {
        shift_id: shifts[1].id,
        start_time: at(13, 0),
        end_time: at(17, 0),
    }));
}

#[tokio::test]
async fn test_accept_failure_leaves_queue_unchanged() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    h.persistence.fail.store(true, Ordering::SeqCst);
    let workflow = h.workflow();

    let err = workflow.accept(0).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Persistence(PersistenceError::Unavailable(_))
    ));
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 1);
    assert_eq!(workflow.list().await.unwrap(), shifts);
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn test_accept_dequeues_by_id_after_queue_race() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    // Another writer reorders the queue between our read and our write.
    h.kv.pending_races.store(1, Ordering::SeqCst);
    let workflow = h.workflow();

    let stored = workflow.accept(0).await.unwrap();
    assert_eq!(stored.shift.start_time, at(8, 0));
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.kv.pending_races.load(Ordering::SeqCst), 0);

    // Rotated to [2, 0, 1], then shift 0 removed by id.
    assert_eq!(
        workflow.list().await.unwrap(),
        vec![shifts[2].clone(), shifts[1].clone()]
    );
    let next = workflow.accept(1).await.unwrap();
    assert_eq!(next.shift.start_time, at(13, 0));
    assert_eq!(h.persistence.stored().len(), 2);
}

#[tokio::test]
async fn test_accept_losing_every_race_reports_error() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    h.kv.pending_races.store(usize::MAX, Ordering::SeqCst);
    let workflow = h.workflow();

    let err = workflow.accept(0).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Conflict { .. })));
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 1);
    assert!(!h
        .notifier
        .notices()
        .iter()
        .any(|n| matches!(n, Notice::ShiftAccepted { .. })));

    h.kv.pending_races.store(0, Ordering::SeqCst);
    let remaining = workflow.list().await.unwrap();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().any(|s| s.id == shifts[0].id));
}

#[tokio::test]
async fn test_accept_out_of_bounds() {
    let h = Harness::new();
    seed(&h, &three()).await;

    let err = h.workflow().accept(3).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::OutOfBounds { index: 3, len: 3, .. })
    ));
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_edit_and_accept_stores_edited_range() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    let workflow = h.workflow();

    let stored = workflow
        .edit_and_accept(0, at(8, 30), at(12, 15))
        .await
        .unwrap();
    assert_eq!(stored.shift.start_time, at(8, 30));
    assert_eq!(stored.shift.end_time, at(12, 15));
    assert_eq!(stored.shift.duration_minutes, 225);
    assert_eq!(stored.shift.date, at(8, 30).date_naive());
    assert_eq!(workflow.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_edit_is_rejected_with_notice() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    let workflow = h.workflow();

    let mut draft = workflow.edit(2).await.unwrap();
    assert_eq!(draft.shift_id, shifts[2].id);
    draft.set_end(at(17, 0));

    let err = workflow.save(&draft).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::InvalidTimeRange { .. })
    ));

    draft.set_end(at(18, 10));
    let err = workflow.save(&draft).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::TooShort { minutes: 10, min_minutes: 15 })
    ));

    let rejected = h
        .notifier
        .notices()
        .iter()
        .filter(|n| matches!(n, Notice::EditRejected { shift_id, .. } if *shift_id == shifts[2].id))
        .count();
    assert_eq!(rejected, 2);
    assert_eq!(workflow.list().await.unwrap(), shifts);
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_draft_is_detected() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    let workflow = h.workflow();

    let draft = workflow.edit(1).await.unwrap();
    workflow.discard(0).await.unwrap();

    let err = workflow.save(&draft).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::StaleIndex { index: 1, .. })
    ));
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 0);

    // The shift moved to index 0 and is still there to accept.
    assert_eq!(workflow.find_index(draft.shift_id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_discard_drops_without_persisting() {
    let h = Harness::new();
    let shifts = three();
    seed(&h, &shifts).await;
    let workflow = h.workflow();

    let dropped = workflow.discard(2).await.unwrap();
    assert_eq!(dropped, shifts[2]);
    assert_eq!(workflow.list().await.unwrap(), shifts[..2].to_vec());
    assert_eq!(h.persistence.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.notifier.notices(),
        vec![Notice::ShiftDiscarded {
            shift_id: shifts[2].id
        }]
    );
}

#[tokio::test]
async fn test_concurrent_accepts_store_each_shift_once() {
    let h = Harness::new();
    seed(&h, &three()).await;
    let workflow = h.workflow();

    let (a, b) = tokio::join!(workflow.accept(0), workflow.accept(0));
    a.unwrap();
    b.unwrap();

    let stored = h.persistence.stored();
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].shift.start_time, stored[1].shift.start_time);
    assert_eq!(workflow.list().await.unwrap().len(), 1);
}
