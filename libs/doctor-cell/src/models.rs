use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Monday first, the order weekly summaries are reported in.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored bookable interval (`availabilities` row).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct AvailabilitySlot {
    pub availability_id: Uuid,
    pub doctor_id: Uuid,
    pub weekday: Option<DayOfWeek>,
    pub availability_start: DateTime<Utc>,
    pub availability_end: DateTime<Utc>,
    pub slot_duration: Option<i32>,
}

/// Slot as supplied by a provider or produced by template expansion,
/// before it is given an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInput {
    #[serde(default)]
    pub weekday: Option<DayOfWeek>,
    pub availability_start: DateTime<Utc>,
    pub availability_end: DateTime<Utc>,
    #[serde(default)]
    pub slot_duration: Option<i32>,
}

/// One row of a weekly template, also the shape of the weekly summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyScheduleEntry {
    pub weekday: DayOfWeek,
    pub enabled: bool,
    pub start: String,
    pub end: String,
    pub slot_duration: i32,
}

impl WeeklyScheduleEntry {
    pub fn placeholder(weekday: DayOfWeek) -> Self {
        Self {
            weekday,
            enabled: false,
            start: "09:00".to_string(),
            end: "17:00".to_string(),
            slot_duration: 30,
        }
    }
}

/// The three body shapes accepted when a provider publishes availability.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PublishAvailabilityRequest {
    WeeklyTemplate(Vec<WeeklyScheduleEntry>),
    Slots(Vec<SlotInput>),
    Ranged {
        #[serde(default)]
        start: Option<String>,
        #[serde(default)]
        end: Option<String>,
        availabilities: Vec<SlotInput>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Appointment row shown on a provider's weekly calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ScheduledAppointment {
    pub appointment_id: Uuid,
    pub appointment_start: DateTime<Utc>,
    pub appointment_end: DateTime<Utc>,
    pub doctor_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub age: Option<i32>,
    pub doctor_first_name: Option<String>,
    pub doctor_last_name: Option<String>,
    pub specialty: Option<String>,
    #[serde(default)]
    pub canceled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorException {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "type")]
    pub exception_type: String,
}

// ==============================================================================
// REFERRAL MODELS
// ==============================================================================

/// Candidate row used to resolve a free-text referral name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorNameRecord {
    pub doctor_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ReferralDoctor {
    pub doctor_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename(serialize = "specialty"))]
    pub specialty_code: Option<String>,
    pub experience: Option<String>,
    pub rating_score: Option<f64>,
    pub rating_count: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralSearchQuery {
    pub q: Option<String>,
    pub specialty: Option<String>,
    pub limit: Option<usize>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
