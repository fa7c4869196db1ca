//! Polling and acknowledgment of reminders produced by a pipeline run.

mod common;

use chrono::{Duration, Timelike, Utc};

use mailminder::db::delivery_repo::{self, DeliveryState};
use mailminder::db::{event_repo, format_timestamp};
use mailminder::extraction::Tier;
use mailminder::notify::{DispatchError, NotificationDispatcher};
use mailminder::pipeline::RunKind;
use mailminder::reminder::ReminderScheduler;

use common::*;

async fn harness_with_exam() -> (TestHarness, chrono::DateTime<Utc>) {
    let h = TestHarness::new();
    let start = (Utc::now() + Duration::days(5)).with_nanosecond(0).unwrap();
    h.mail.deliver(
        MessageBuilder::new("exam-1")
            .subject("Exam reminder")
            .body("Final exam, duration 2h")
            .build(),
    );
    h.model
        .on("Exam reminder", Reply::Text(event_reply("Final exam", start, "2h", 9)));
    h.run(RunKind::Check).await;
    (h, start)
}

#[tokio::test]
async fn nothing_is_due_before_the_first_offset() {
    let (h, _) = harness_with_exam().await;
    let dispatcher = NotificationDispatcher::new(h.db.clone());
    assert!(dispatcher.list_due(Utc::now()).unwrap().is_empty());
}

#[tokio::test]
async fn due_deliveries_repeat_until_acked() {
    let (h, start) = harness_with_exam().await;
    let dispatcher = NotificationDispatcher::new(h.db.clone());
    let later = start - Duration::minutes(30);

    let due = dispatcher.list_due(later).unwrap();
    assert_eq!(due.len(), 3);
    assert!(due.iter().all(|d| d.title == "Final exam"));
    assert!(due.iter().all(|d| d.location.as_deref() == Some("Room 101")));
    assert!(due.iter().all(|d| !d.redelivered));

    let stored = delivery_repo::find_by_id(&h.db, &due[0].delivery_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, DeliveryState::Sent);

    // Not acked yet, so the next poll returns them again.
    let again = dispatcher.list_due(later).unwrap();
    assert_eq!(again.len(), 3);
    assert!(again.iter().all(|d| d.redelivered));

    dispatcher.ack(&due[0].delivery_id, later).unwrap();
    let remaining = dispatcher.list_due(later).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|d| d.delivery_id != due[0].delivery_id));
}

#[tokio::test]
async fn ack_twice_stays_acked() {
    let (h, start) = harness_with_exam().await;
    let dispatcher = NotificationDispatcher::new(h.db.clone());
    let due = dispatcher.list_due(start).unwrap();
    let id = &due[0].delivery_id;

    assert_eq!(dispatcher.ack(id, start).unwrap().state, DeliveryState::Acked);
    assert_eq!(dispatcher.ack(id, start).unwrap().state, DeliveryState::Acked);
    assert_eq!(
        delivery_repo::find_by_id(&h.db, id).unwrap().unwrap().state,
        DeliveryState::Acked
    );

    assert!(matches!(
        dispatcher.ack("missing:1d", start),
        Err(DispatchError::UnknownDelivery(_))
    ));
}

#[tokio::test]
async fn rescheduling_an_event_never_duplicates_deliveries() {
    let (h, start) = harness_with_exam().await;
    let event = event_repo::list_for_message(&h.db, "exam-1").unwrap().remove(0);
    let scheduler = ReminderScheduler::from_config(&h.config.reminder);
    let now = format_timestamp(Utc::now());

    for _ in 0..2 {
        for delivery in scheduler.schedule(&event.id, start, Tier::Important, Utc::now()) {
            assert!(!delivery_repo::insert_if_absent(&h.db, &delivery.to_row(&now)).unwrap());
        }
    }
    assert_eq!(delivery_repo::list_for_event(&h.db, &event.id).unwrap().len(), 3);
}
