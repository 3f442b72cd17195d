//! Query parameter structs for pagination and list filters

use crate::neo4j::models::TaskFilters;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Helper to deserialize numbers from query string (which are always strings)
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

/// Helper to deserialize optional values from query string
fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// Pagination parameters for list endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PaginationParams {
    /// Max items to return (default: 50, max: 100)
    #[serde(default = "default_limit", deserialize_with = "deserialize_from_str")]
    pub limit: usize,
    /// Items to skip (default: 0)
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PaginationParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("limit must be at least 1".to_string());
        }
        if self.limit > 100 {
            return Err("limit cannot exceed 100".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// `GET /api/tasks?parent_id=root|<uuid>&include_completed=false`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TaskListQuery {
    /// `root` for root tasks, or a task id for its direct children
    #[serde(alias = "parent_id")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub include_completed: Option<bool>,
}

impl TaskListQuery {
    pub fn to_filters(&self) -> Result<TaskFilters, String> {
        let parent = match self.parent.as_deref().map(str::trim) {
            None | Some("") => None,
            Some("root") => Some(None),
            Some(id) => Some(Some(
                Uuid::parse_str(id).map_err(|_| format!("Invalid parent id: {}", id))?,
            )),
        };
        Ok(TaskFilters {
            parent,
            include_completed: self.include_completed.unwrap_or(true),
        })
    }
}

/// `GET /api/tasks/tree?include_completed=false`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TaskTreeQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub include_completed: Option<bool>,
}

// ============================================================================
// Calendar & email
// ============================================================================

/// Time range for calendar reads; defaults to the sync window
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TimeRangeQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub to: Option<DateTime<Utc>>,
}

impl TimeRangeQuery {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        let from = self.from.unwrap_or(now - Duration::days(7));
        let to = self.to.unwrap_or(now + Duration::days(30));
        if from > to {
            return Err("from must not be after to".to_string());
        }
        Ok((from, to))
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct EmailListQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub unread_only: bool,
}

/// Optional overrides for a manual Gmail sync
#[derive(Debug, Deserialize, Default, Clone)]
pub struct GmailSyncQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub max_results: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub since: Option<DateTime<Utc>>,
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total count of items matching the filter
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    /// Whether there are more items after this page
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        Self {
            has_more: offset + items.len() < total,
            items,
            total,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: serde::de::DeserializeOwned>(qs: &str) -> T {
        let uri: axum::http::Uri = format!("/x?{}", qs).parse().unwrap();
        axum::extract::Query::<T>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_pagination_defaults_and_limits() {
        let p: PaginationParams = parse("");
        assert_eq!(p.limit, 50);
        assert_eq!(p.offset, 0);
        assert!(p.validate().is_ok());

        let p: PaginationParams = parse("limit=101&offset=5");
        assert_eq!(p.offset, 5);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_task_list_query_parent() {
        let q: TaskListQuery = parse("parent=root");
        let f = q.to_filters().unwrap();
        assert_eq!(f.parent, Some(None));
        assert!(f.include_completed);

        let id = Uuid::new_v4();
        let q: TaskListQuery = parse(&format!("parent={}&include_completed=false", id));
        let f = q.to_filters().unwrap();
        assert_eq!(f.parent, Some(Some(id)));
        assert!(!f.include_completed);

        let q: TaskListQuery = parse(&format!("parent_id={}", id));
        assert_eq!(q.to_filters().unwrap().parent, Some(Some(id)));

        let q: TaskListQuery = parse("parent=nope");
        assert!(q.to_filters().is_err());

        let f = TaskListQuery::default().to_filters().unwrap();
        assert_eq!(f.parent, None);
    }

    #[test]
    fn test_email_query_flags() {
        let q: EmailListQuery = parse("unread_only=true&limit=10");
        assert!(q.unread_only);
        assert_eq!(q.pagination.limit, 10);
    }

    #[test]
    fn test_time_range_rejects_inverted() {
        let now = Utc::now();
        let q = TimeRangeQuery {
            from: Some(now),
            to: Some(now - Duration::days(1)),
        };
        assert!(q.resolve(now).is_err());

        let (from, to) = TimeRangeQuery::default().resolve(now).unwrap();
        assert_eq!(to - from, Duration::days(37));
    }

    #[test]
    fn test_paginated_has_more() {
        let page = PaginatedResponse::new(vec![1, 2], 5, 2, 0);
        assert!(page.has_more);
        let last = PaginatedResponse::new(vec![5], 5, 2, 4);
        assert!(!last.has_more);
    }
}
