//! Records exchanged with the backend. Field names follow the backend's snake_case wire format,
//! and relations are accepted either as plain ids or as nested objects carrying an `id`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::whole_seconds;

/// Upper bound for hours on a single record, a leap year.
pub const MAX_RECORD_HOURS: f64 = 24. * 366.;

/// One continuous attendance record. Absent `clock_out` means the record is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeClockRecord {
    #[serde(with = "flexible_id")]
    pub id: String,
    #[serde(alias = "employee", with = "flexible_id")]
    pub employee_id: String,
    #[serde(default, alias = "shift", with = "flexible_id::optional")]
    pub shift_id: Option<String>,
    pub clock_in: DateTime<Utc>,
    #[serde(default)]
    pub clock_out: Option<DateTime<Utc>>,
    #[serde(default)]
    pub break_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub break_end: Option<DateTime<Utc>>,
    /// Hours computed by the backend. Authoritative when positive.
    #[serde(default, with = "flexible_hours")]
    pub total_hours: Option<f64>,
}

impl TimeClockRecord {
    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }

    /// A break is running when it has started and the stored end (if any) belongs to an earlier
    /// break.
    pub fn break_in_progress(&self) -> bool {
        match (self.break_start, self.break_end) {
            (Some(_), None) => true,
            (Some(start), Some(end)) => end < start,
            (None, _) => false,
        }
    }

    /// Seconds of the last finished break stored on the record.
    pub fn closed_break_seconds(&self) -> i64 {
        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) if end >= start => whole_seconds(start, end),
            _ => 0,
        }
    }

    /// Positive backend hours, if the backend computed them.
    pub fn authoritative_hours(&self) -> Option<f64> {
        self.total_hours
            .filter(|v| v.is_finite() && *v > 0. && *v <= MAX_RECORD_HOURS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Scheduled,
    Missed,
    #[serde(other)]
    Other,
}

/// A planned work interval. `end_time` is always after `start_time` as an absolute instant, even
/// for shifts that cross midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    #[serde(with = "flexible_id")]
    pub id: String,
    #[serde(alias = "employee", with = "flexible_id")]
    pub employee_id: String,
    #[serde(alias = "company", with = "flexible_id")]
    pub company_id: String,
    #[serde(default, alias = "department", with = "flexible_id::optional")]
    pub department_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ShiftStatus,
    #[serde(default)]
    pub is_missed: bool,
    #[serde(default)]
    pub missed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Body for creating a shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftDraft {
    pub employee_id: String,
    pub company_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ShiftStatus,
}

/// Partial update of a shift. Only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShiftUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ShiftStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_missed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_at: Option<DateTime<Utc>>,
}

impl ShiftUpdate {
    pub fn mark_missed(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ShiftStatus::Missed),
            is_missed: Some(true),
            missed_at: Some(now),
            ..Default::default()
        }
    }

    pub fn reschedule(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Default::default()
        }
    }
}

/// Filters for listing shifts. Dates are inclusive calendar dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftQuery {
    pub employee: Option<String>,
    pub company: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<ShiftStatus>,
    pub is_missed: Option<bool>,
}

impl ShiftQuery {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![];
        if let Some(v) = &self.employee {
            query.push(("employee", v.clone()));
        }
        if let Some(v) = &self.company {
            query.push(("company", v.clone()));
        }
        if let Some(v) = self.start_date {
            query.push(("start_date", v.format("%Y-%m-%d").to_string()));
        }
        if let Some(v) = self.end_date {
            query.push(("end_date", v.format("%Y-%m-%d").to_string()));
        }
        match self.status {
            Some(ShiftStatus::Scheduled) => query.push(("status", "scheduled".into())),
            Some(ShiftStatus::Missed) => query.push(("status", "missed".into())),
            Some(ShiftStatus::Other) | None => {}
        }
        if let Some(v) = self.is_missed {
            query.push(("is_missed", v.to_string()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockInRequest {
    pub employee_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockOutRequest {
    pub employee_id: String,
    pub time_clock_id: String,
}

/// List endpoints answer with either a bare array or a paginated `{results: [...], next}`
/// envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Page {
        results: Vec<T>,
        #[serde(default)]
        next: Option<String>,
    },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    /// Link to the following page, absolute or relative to the current one.
    pub fn next_page(&self) -> Option<&str> {
        match self {
            ListResponse::Page { next, .. } => next.as_deref().filter(|v| !v.trim().is_empty()),
            ListResponse::Bare(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Page { results, .. } => results,
            ListResponse::Bare(v) => v,
        }
    }
}

/// Ids arrive as strings, numbers or nested objects with an `id` field. They are kept as strings.
mod flexible_id {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(id: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(id)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        from_value(value)?.ok_or_else(|| D::Error::custom("missing id"))
    }

    fn from_value<E: Error>(value: Value) -> Result<Option<String>, E> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Object(mut o) => match o.remove("id") {
                Some(id) => from_value(id),
                None => Err(E::custom("nested object without id")),
            },
            other => Err(E::custom(format!("unexpected id {other}"))),
        }
    }

    pub mod optional {
        use serde::{Deserialize, Deserializer, Serializer};
        use serde_json::Value;

        pub fn serialize<S>(id: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match id {
                Some(v) => serializer.serialize_str(v),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
        where
            D: Deserializer<'de>,
        {
            super::from_value(Value::deserialize(deserializer)?)
        }
    }
}

/// Decimal fields are serialized as strings by some backends ("7.50").
mod flexible_hours {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::MAX_RECORD_HOURS;

    pub fn serialize<S>(hours: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match hours {
            Some(v) => serializer.serialize_f64(*v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hours = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(None),
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => Some(s.trim().parse::<f64>().map_err(D::Error::custom)?),
            other => return Err(D::Error::custom(format!("unexpected hours {other}"))),
        };
        match hours {
            Some(v) if !v.is_finite() || v.abs() > MAX_RECORD_HOURS => {
                Err(D::Error::custom(format!("hours out of range {v}")))
            }
            other => Ok(other),
        }
    }
}
