//! Derives reminder deliveries from an event's tier and start time.
//!
//! Scheduling is a pure function of (event, now). Delivery ids depend only
//! on the event id and the offset label, so scheduling the same event again
//! yields the same ids and the store's insert-if-absent keeps one row each.

use chrono::{DateTime, Duration, Utc};

use crate::config::ReminderConfig;
use crate::db::delivery_repo::{DeliveryRow, DeliveryState};
use crate::db::format_timestamp;
use crate::extraction::Tier;

/// A lead time before an event's start, e.g. `3d` or `1h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderOffset {
    pub label: String,
    pub lead: Duration,
}

impl ReminderOffset {
    pub fn days(n: u32) -> Self {
        Self {
            label: format!("{}d", n),
            lead: Duration::days(i64::from(n)),
        }
    }

    pub fn hours(n: u32) -> Self {
        Self {
            label: format!("{}h", n),
            lead: Duration::hours(i64::from(n)),
        }
    }
}

/// One computed notification for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDelivery {
    pub id: String,
    pub event_id: String,
    pub offset_label: String,
    pub reminder_time: DateTime<Utc>,
    pub channel: String,
    pub color: String,
}

impl ReminderDelivery {
    pub fn to_row(&self, created_at: &str) -> DeliveryRow {
        DeliveryRow {
            id: self.id.clone(),
            event_id: self.event_id.clone(),
            offset_label: self.offset_label.clone(),
            reminder_time: format_timestamp(self.reminder_time),
            channel: self.channel.clone(),
            color: self.color.clone(),
            state: DeliveryState::Pending,
            created_at: created_at.to_string(),
            sent_at: None,
            acked_at: None,
        }
    }
}

pub fn make_delivery_id(event_id: &str, offset_label: &str) -> String {
    format!("{}:{}", event_id, offset_label)
}

#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    important: Vec<ReminderOffset>,
    normal: Vec<ReminderOffset>,
    channel: String,
    important_color: String,
    normal_color: String,
    unimportant_color: String,
}

impl ReminderScheduler {
    pub fn from_config(config: &ReminderConfig) -> Self {
        let important = config
            .important_days_before
            .iter()
            .map(|d| ReminderOffset::days(*d))
            .chain(
                config
                    .important_hours_before
                    .iter()
                    .map(|h| ReminderOffset::hours(*h)),
            )
            .collect();
        let normal = config
            .normal_days_before
            .iter()
            .map(|d| ReminderOffset::days(*d))
            .collect();

        Self {
            important: dedupe(important),
            normal: dedupe(normal),
            channel: config.channel.clone(),
            important_color: config.colors.important.clone(),
            normal_color: config.colors.normal.clone(),
            unimportant_color: config.colors.unimportant.clone(),
        }
    }

    /// Offsets for a tier. Unimportant events get none.
    pub fn offsets_for(&self, tier: Tier) -> &[ReminderOffset] {
        match tier {
            Tier::Important => &self.important,
            Tier::Normal => &self.normal,
            Tier::Unimportant => &[],
        }
    }

    pub fn color_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Important => &self.important_color,
            Tier::Normal => &self.normal_color,
            Tier::Unimportant => &self.unimportant_color,
        }
    }

    /// Computes the deliveries for an event, skipping fire times before `now`.
    pub fn schedule(
        &self,
        event_id: &str,
        start: DateTime<Utc>,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Vec<ReminderDelivery> {
        self.offsets_for(tier)
            .iter()
            .filter_map(|offset| {
                let reminder_time = start - offset.lead;
                if reminder_time < now {
                    return None;
                }
                Some(ReminderDelivery {
                    id: make_delivery_id(event_id, &offset.label),
                    event_id: event_id.to_string(),
                    offset_label: offset.label.clone(),
                    reminder_time,
                    channel: self.channel.clone(),
                    color: self.color_for(tier).to_string(),
                })
            })
            .collect()
    }
}

fn dedupe(offsets: Vec<ReminderOffset>) -> Vec<ReminderOffset> {
    let mut seen = std::collections::HashSet::new();
    offsets
        .into_iter()
        .filter(|o| seen.insert(o.label.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler() -> ReminderScheduler {
        ReminderScheduler::from_config(&ReminderConfig::default())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_important_gets_three_deliveries() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let deliveries = scheduler().schedule("m1#0", start(), Tier::Important, now);

        let labels: Vec<&str> = deliveries.iter().map(|d| d.offset_label.as_str()).collect();
        assert_eq!(labels, vec!["3d", "1d", "1h"]);
        assert_eq!(
            deliveries[0].reminder_time,
            Utc.with_ymd_and_hms(2024, 6, 7, 9, 0, 0).unwrap()
        );
        assert_eq!(
            deliveries[2].reminder_time,
            Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap()
        );
        assert!(deliveries.iter().all(|d| d.color == "#FF4444"));
        assert!(deliveries.iter().all(|d| d.channel == "browser"));
        assert_eq!(deliveries[1].id, "m1#0:1d");
    }

    #[test]
    fn test_past_offsets_are_skipped() {
        // Two days before the start: the 3d reminder is already past.
        let now = Utc.with_ymd_and_hms(2024, 6, 8, 9, 0, 0).unwrap();
        let deliveries = scheduler().schedule("m1#0", start(), Tier::Important, now);
        let labels: Vec<&str> = deliveries.iter().map(|d| d.offset_label.as_str()).collect();
        assert_eq!(labels, vec!["1d", "1h"]);

        let after_start = Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap();
        assert!(scheduler()
            .schedule("m1#0", start(), Tier::Important, after_start)
            .is_empty());
    }

    #[test]
    fn test_normal_and_unimportant() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let normal = scheduler().schedule("m1#0", start(), Tier::Normal, now);
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].offset_label, "1d");
        assert_eq!(normal[0].color, "#4444FF");

        assert!(scheduler()
            .schedule("m1#0", start(), Tier::Unimportant, now)
            .is_empty());
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let first = scheduler().schedule("m1#0", start(), Tier::Important, now);
        let later = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let second = scheduler().schedule("m1#0", start(), Tier::Important, later);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_offsets_are_deduplicated() {
        let config = ReminderConfig {
            important_days_before: vec![2, 2],
            important_hours_before: vec![],
            ..ReminderConfig::default()
        };
        let scheduler = ReminderScheduler::from_config(&config);
        assert_eq!(scheduler.offsets_for(Tier::Important), &[ReminderOffset::days(2)]);
    }

    #[test]
    fn test_to_row_starts_pending() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let delivery = scheduler().schedule("m1#0", start(), Tier::Normal, now).remove(0);
        let row = delivery.to_row("2024-06-01T00:00:00Z");
        assert_eq!(row.state, DeliveryState::Pending);
        assert_eq!(row.reminder_time, "2024-06-09T09:00:00Z");
    }
}
