//! Google Calendar pull sync

use super::{SyncResult, SyncService};
use crate::google::{EventListQuery, EventTime, GoogleEvent};
use crate::neo4j::models::CalendarEventNode;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

const PAST_DAYS: i64 = 7;
const FUTURE_DAYS: i64 = 30;
const MAX_EVENTS: u32 = 100;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalendarSyncReport {
    pub new_events: usize,
    pub updated_events: usize,
    pub total_events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_sync_token: Option<String>,
}

impl SyncService {
    /// Mirror the primary calendar from a week ago to a month ahead
    pub async fn sync_calendar(&self, user_id: Uuid) -> SyncResult<CalendarSyncReport> {
        let (conn, token) = self.authorized(user_id).await?;

        let now = Utc::now();
        let query = EventListQuery {
            time_min: (now - Duration::days(PAST_DAYS)).to_rfc3339_opts(SecondsFormat::Secs, true),
            time_max: (now + Duration::days(FUTURE_DAYS))
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            max_results: MAX_EVENTS,
        };
        let list = self.google.list_calendar_events(&token, &query).await?;

        let mut report = CalendarSyncReport {
            next_sync_token: list.next_sync_token,
            ..Default::default()
        };
        for item in list.items {
            let Some(event) = event_from_item(user_id, conn.id, item, now) else {
                tracing::warn!(%user_id, "Skipping calendar item without an id");
                continue;
            };
            if self.store.upsert_calendar_event(&event).await? {
                report.new_events += 1;
            } else {
                report.updated_events += 1;
            }
        }
        report.total_events = report.new_events + report.updated_events;

        self.store.mark_connection_synced(conn.id, Utc::now()).await?;
        tracing::info!(
            %user_id,
            new = report.new_events,
            updated = report.updated_events,
            "Calendar sync completed"
        );
        Ok(report)
    }
}

/// Map a raw Google event onto a stored row. The raw payload is kept.
pub(crate) fn event_from_item(
    user_id: Uuid,
    connection_id: Uuid,
    item: serde_json::Value,
    synced_at: DateTime<Utc>,
) -> Option<CalendarEventNode> {
    let event: GoogleEvent = serde_json::from_value(item.clone()).ok()?;
    if event.id.is_empty() {
        return None;
    }

    let start = event.start.unwrap_or_default();
    let end = event.end.unwrap_or_default();
    let is_all_day = start.date.is_some();

    Some(CalendarEventNode {
        id: Uuid::new_v4(),
        user_id,
        connection_id,
        external_id: event.id,
        title: event.summary.unwrap_or_else(|| "Untitled Event".to_string()),
        description: event.description,
        location: event.location,
        start_time: event_time(&start, NaiveTime::MIN),
        end_time: event_time(&end, end_of_day()),
        is_all_day,
        status: event.status.unwrap_or_else(|| "confirmed".to_string()),
        synced_at,
        raw_item: item,
    })
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// `dateTime` as given, or a bare `date` pinned to `at_time` UTC
fn event_time(time: &EventTime, at_time: NaiveTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = &time.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|d| d.with_timezone(&Utc));
    }
    time.date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d.and_time(at_time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::traits::RecordStore;
    use crate::test_helpers::sync_fixture;
    use serde_json::json;

    #[test]
    fn test_timed_event_mapping() {
        let item = json!({
            "id": "evt-1",
            "summary": "Standup",
            "location": "Room 4",
            "start": {"dateTime": "2025-03-10T09:00:00-05:00"},
            "end": {"dateTime": "2025-03-10T09:15:00-05:00"}
        });
        let event = event_from_item(Uuid::nil(), Uuid::nil(), item.clone(), Utc::now()).unwrap();
        assert_eq!(event.external_id, "evt-1");
        assert_eq!(event.title, "Standup");
        assert!(!event.is_all_day);
        assert_eq!(event.status, "confirmed");
        assert_eq!(
            event.start_time.unwrap().to_rfc3339(),
            "2025-03-10T14:00:00+00:00"
        );
        assert_eq!(event.raw_item, item);
    }

    #[test]
    fn test_all_day_event_mapping() {
        let item = json!({
            "id": "evt-2",
            "status": "cancelled",
            "start": {"date": "2025-03-10"},
            "end": {"date": "2025-03-11"}
        });
        let event = event_from_item(Uuid::nil(), Uuid::nil(), item, Utc::now()).unwrap();
        assert!(event.is_all_day);
        assert_eq!(event.title, "Untitled Event");
        assert_eq!(event.status, "cancelled");
        assert_eq!(
            event.start_time.unwrap().to_rfc3339(),
            "2025-03-10T00:00:00+00:00"
        );
        assert_eq!(
            event.end_time.unwrap().to_rfc3339(),
            "2025-03-11T23:59:59+00:00"
        );
    }

    #[test]
    fn test_item_without_id_skipped() {
        assert!(event_from_item(Uuid::nil(), Uuid::nil(), json!({"summary": "x"}), Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_sync_counts_new_then_updated() {
        let fx = sync_fixture().await;
        fx.google.set_calendar_items(vec![
            json!({"id": "a", "start": {"dateTime": "2025-03-10T09:00:00Z"}}),
            json!({"id": "b", "start": {"date": "2025-03-11"}, "end": {"date": "2025-03-12"}}),
        ]);

        let first = fx.sync.sync_calendar(fx.user_id).await.unwrap();
        assert_eq!(first.new_events, 2);
        assert_eq!(first.updated_events, 0);

        let second = fx.sync.sync_calendar(fx.user_id).await.unwrap();
        assert_eq!(second.new_events, 0);
        assert_eq!(second.updated_events, 2);
        assert_eq!(second.total_events, 2);

        let conn = fx
            .store
            .get_connection(fx.user_id, fx.connection_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conn.last_synced.is_some());
    }

    #[tokio::test]
    async fn test_sync_without_connection() {
        let fx = sync_fixture().await;
        let err = fx.sync.sync_calendar(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, super::super::SyncError::NotConnected));
    }
}
