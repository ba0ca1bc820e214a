//! Job payloads carried on the labor and email queues.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{JobKind, WorkingTimeRecord};

/// Common view of a job payload used by the processors.
pub trait JobEvent: Serialize + DeserializeOwned + Send + Sync {
    const KIND: JobKind;

    fn working_time_id(&self) -> i64;

    fn employee_id(&self) -> &str;

    /// Build the payload for a clocked-out record; `None` before clock-out.
    fn from_record(record: &WorkingTimeRecord) -> Option<Self>;
}

/// Body of a `labor-jobs` message, also the legacy API request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaborJobEvent {
    pub working_time_id: i64,
    pub employee_id: String,
    pub hours_worked: f64,
    pub clock_out_time: DateTime<Utc>,
}

impl JobEvent for LaborJobEvent {
    const KIND: JobKind = JobKind::Labor;

    fn working_time_id(&self) -> i64 {
        self.working_time_id
    }

    fn employee_id(&self) -> &str {
        &self.employee_id
    }

    fn from_record(record: &WorkingTimeRecord) -> Option<Self> {
        record.clock_out.map(|clock_out| Self {
            working_time_id: record.id,
            employee_id: record.employee_id.clone(),
            hours_worked: clock_out.hours_worked,
            clock_out_time: clock_out.at,
        })
    }
}

/// Body of an `email-jobs` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailJobEvent {
    pub working_time_id: i64,
    pub employee_id: String,
    pub hours_worked: f64,
    pub occurred_at: DateTime<Utc>,
}

impl JobEvent for EmailJobEvent {
    const KIND: JobKind = JobKind::Email;

    fn working_time_id(&self) -> i64 {
        self.working_time_id
    }

    fn employee_id(&self) -> &str {
        &self.employee_id
    }

    fn from_record(record: &WorkingTimeRecord) -> Option<Self> {
        record.clock_out.map(|clock_out| Self {
            working_time_id: record.id,
            employee_id: record.employee_id.clone(),
            hours_worked: clock_out.hours_worked,
            occurred_at: clock_out.at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn checked_out_record() -> WorkingTimeRecord {
        let clock_in = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let mut record = WorkingTimeRecord::check_in(42, "E-7", clock_in);
        record.check_out(clock_in + Duration::hours(8)).unwrap();
        record
    }

    #[test]
    fn test_labor_payload_field_names() {
        let event = LaborJobEvent::from_record(&checked_out_record()).unwrap();
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "workingTimeId": 42,
                "employeeId": "E-7",
                "hoursWorked": 8.0,
                "clockOutTime": "2024-03-04T17:00:00Z",
            })
        );
    }

    #[test]
    fn test_email_payload_field_names() {
        let event = EmailJobEvent::from_record(&checked_out_record()).unwrap();
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["workingTimeId"], 42);
        assert_eq!(value["employeeId"], "E-7");
        assert_eq!(value["hoursWorked"], 8.0);
        assert_eq!(value["occurredAt"], "2024-03-04T17:00:00Z");
        assert!(value.get("clockOutTime").is_none());
    }

    #[test]
    fn test_decode_producer_payload() {
        let body = r#"{"workingTimeId":3,"employeeId":"E-1","hoursWorked":1.25,"clockOutTime":"2024-03-04T10:15:00.5+02:00"}"#;
        let event: LaborJobEvent = serde_json::from_str(body).unwrap();

        assert_eq!(event.working_time_id(), 3);
        assert_eq!(event.employee_id(), "E-1");
        assert_eq!(
            event.clock_out_time,
            Utc.with_ymd_and_hms(2024, 3, 4, 8, 15, 0).unwrap() + Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_no_event_before_clock_out() {
        let record = WorkingTimeRecord::check_in(1, "E-1", Utc::now());
        assert!(LaborJobEvent::from_record(&record).is_none());
        assert!(EmailJobEvent::from_record(&record).is_none());
    }
}
