use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// ROLES AND FILTERS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Patient,
    Doctor,
    Receptionist,
}

impl FromStr for UserRole {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "patient" => Ok(UserRole::Patient),
            "doctor" => Ok(UserRole::Doctor),
            "receptionist" => Ok(UserRole::Receptionist),
            other => Err(AppointmentError::ValidationError(format!("Unknown user type: {}", other))),
        }
    }
}

/// Which half of a doctor's or receptionist's calendar to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewAs {
    Doctor,
    Patient,
}

impl ViewAs {
    /// Empty strings count as "not given".
    pub fn parse_optional(value: Option<&str>) -> Result<Option<Self>, AppointmentError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) if v.eq_ignore_ascii_case("doctor") => Ok(Some(ViewAs::Doctor)),
            Some(v) if v.eq_ignore_ascii_case("patient") => Ok(Some(ViewAs::Patient)),
            Some(other) => Err(AppointmentError::ValidationError(format!("Unknown viewAs: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentBucket {
    Upcoming,
    #[default]
    #[serde(alias = "completed")]
    Past,
    Canceled,
    All,
}

impl FromStr for AppointmentBucket {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "past" | "completed" => Ok(AppointmentBucket::Past),
            "upcoming" => Ok(AppointmentBucket::Upcoming),
            "canceled" | "cancelled" => Ok(AppointmentBucket::Canceled),
            "all" => Ok(AppointmentBucket::All),
            other => Err(AppointmentError::ValidationError(format!("Unknown appointment type: {}", other))),
        }
    }
}

/// How the `patient_id` side of an appointment was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartKind {
    Patient,
    Receptionist,
    Doctor,
}

impl fmt::Display for CounterpartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CounterpartKind::Patient => "patient",
            CounterpartKind::Receptionist => "receptionist",
            CounterpartKind::Doctor => "doctor",
        };
        write!(f, "{}", s)
    }
}

// ==============================================================================
// RESERVATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_start: DateTime<Utc>,
    pub appointment_end: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentRequest {
    pub canceled_by: String,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

/// Result of the `create_reservation` store function.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationCreated {
    pub appointment_id: Uuid,
    pub slot_consumed: bool,
}

/// Timezone-independent part of a `reservation_details` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ReservationDetails {
    pub appointment_id: Uuid,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_first_name: Option<String>,
    pub doctor_last_name: Option<String>,
    pub specialty: Option<String>,
    pub patient_id: Option<Uuid>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub age: Option<i32>,
    pub counterpart_kind: Option<CounterpartKind>,
    #[serde(default)]
    pub is_doctor_patient: bool,
    #[serde(default)]
    pub canceled: bool,
    pub canceled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancellation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub report_exists: bool,
}

/// A `reservation_details` row as stored, in UTC.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRecord {
    #[serde(flatten)]
    pub details: ReservationDetails,
    pub appointment_start: DateTime<Utc>,
    pub appointment_end: DateTime<Utc>,
}

/// A reservation as returned to a caller, in the caller's timezone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(flatten)]
    pub details: ReservationDetails,
    pub appointment_start: DateTime<FixedOffset>,
    pub appointment_end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCounts {
    pub as_doctor: u64,
    pub as_patient: u64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
