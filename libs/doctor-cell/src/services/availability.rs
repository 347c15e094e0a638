use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityError, AvailabilitySlot, DateRange, DayOfWeek, DoctorException,
    ScheduledAppointment, SlotInput, WeeklyScheduleEntry,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Replace the doctor's slots in scope with `slots`.
    ///
    /// With a range only slots starting on a date inside it are deleted, and
    /// incoming slots outside it are dropped. Without a range every slot the
    /// doctor has is deleted first. Returns the number of slots stored.
    pub async fn publish_availability(
        &self,
        doctor_id: &str,
        range: Option<DateRange>,
        slots: Vec<SlotInput>,
        auth_token: &str,
    ) -> Result<usize, AvailabilityError> {
        debug!("Publishing {} slots for doctor {} (range: {:?})", slots.len(), doctor_id, range);

        let delete_path = match range {
            Some(range) => format!(
                "/rest/v1/availabilities?doctor_id=eq.{}&availability_start=gte.{}&availability_start=lt.{}",
                doctor_id,
                start_of_day(range.start),
                start_of_day(next_day(range.end)),
            ),
            None => format!("/rest/v1/availabilities?doctor_id=eq.{}", doctor_id),
        };

        let _: Value = self.supabase.request(
            Method::DELETE,
            &delete_path,
            Some(auth_token),
            None,
        ).await.map_err(|e| {
            error!("Failed to delete existing availabilities for {}: {}", doctor_id, e);
            AvailabilityError::DatabaseError("Failed to delete existing availabilities".to_string())
        })?;

        let rows: Vec<Value> = slots
            .into_iter()
            .filter(|slot| match range {
                Some(range) => range.contains(slot.availability_start.date_naive()),
                None => true,
            })
            .map(|slot| {
                let weekday = slot
                    .weekday
                    .unwrap_or_else(|| DayOfWeek::from(slot.availability_start.weekday()));
                json!({
                    "availability_id": Uuid::new_v4(),
                    "doctor_id": doctor_id,
                    "weekday": weekday,
                    "availability_start": slot.availability_start.to_rfc3339(),
                    "availability_end": slot.availability_end.to_rfc3339(),
                    "slot_duration": slot.slot_duration,
                })
            })
            .collect();

        let stored = rows.len();
        if stored == 0 {
            info!("Availability for doctor {} cleared with no replacement slots", doctor_id);
            return Ok(0);
        }

        let _: Value = self.supabase.request(
            Method::POST,
            "/rest/v1/availabilities",
            Some(auth_token),
            Some(Value::Array(rows)),
        ).await.map_err(|e| {
            error!("Failed to insert availabilities for {}: {}", doctor_id, e);
            AvailabilityError::DatabaseError("Failed to insert availability".to_string())
        })?;

        info!("Published {} slots for doctor {}", stored, doctor_id);
        Ok(stored)
    }

    /// Slots lying wholly inside `day` that start no earlier than `not_before`.
    pub async fn list_availability(
        &self,
        doctor_id: &str,
        day: NaiveDate,
        not_before: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let day_start = day
            .and_time(NaiveTime::MIN)
            .and_utc();
        let lower_bound = day_start.max(not_before);

        let path = format!(
            "/rest/v1/availabilities?doctor_id=eq.{}&availability_start=gte.{}&availability_end=lt.{}&order=availability_start.asc",
            doctor_id,
            lower_bound.to_rfc3339_opts(SecondsFormat::Secs, true),
            start_of_day(next_day(day)),
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch availabilities for {}: {}", doctor_id, e);
                AvailabilityError::DatabaseError("Failed to fetch availabilities".to_string())
            })
    }

    pub async fn clear_availability(&self, doctor_id: &str, auth_token: &str) -> Result<(), AvailabilityError> {
        let path = format!("/rest/v1/availabilities?doctor_id=eq.{}", doctor_id);

        let _: Value = self.supabase.request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to clear availabilities for {}: {}", doctor_id, e);
                AvailabilityError::DatabaseError("Failed to clear availabilities".to_string())
            })?;

        info!("Cleared all availabilities for doctor: {}", doctor_id);
        Ok(())
    }

    pub async fn weekly_schedule(
        &self,
        doctor_id: &str,
        range: DateRange,
        auth_token: &str,
    ) -> Result<Vec<WeeklyScheduleEntry>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availabilities?doctor_id=eq.{}&availability_start=gte.{}&availability_start=lt.{}&order=availability_start.asc",
            doctor_id,
            start_of_day(range.start),
            start_of_day(next_day(range.end)),
        );

        let slots: Vec<AvailabilitySlot> = self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch weekly schedule for {}: {}", doctor_id, e);
                AvailabilityError::DatabaseError("Failed to fetch weekly schedule".to_string())
            })?;

        Ok(summarize_weekly_schedule(&slots))
    }

    /// Appointments on the doctor's calendar starting inside the range.
    pub async fn weekly_reservations(
        &self,
        doctor_id: &str,
        range: DateRange,
        auth_token: &str,
    ) -> Result<Vec<ScheduledAppointment>, AvailabilityError> {
        let path = format!(
            "/rest/v1/reservation_details?select=appointment_id,appointment_start,appointment_end,doctor_id,patient_id,patient_first_name,patient_last_name,age,doctor_first_name,doctor_last_name,specialty,canceled&doctor_id=eq.{}&appointment_start=gte.{}&appointment_start=lt.{}&order=appointment_start.asc",
            doctor_id,
            start_of_day(range.start),
            start_of_day(next_day(range.end)),
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch weekly reservations for {}: {}", doctor_id, e);
                AvailabilityError::DatabaseError("Failed to fetch weekly schedule".to_string())
            })
    }

    pub async fn add_exception(
        &self,
        doctor_id: &str,
        exception: DoctorException,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let row = json!({
            "doctor_id": doctor_id,
            "date": exception.date.format(DATE_FORMAT).to_string(),
            "start_time": exception.start_time,
            "end_time": exception.end_time,
            "type": exception.exception_type,
        });

        let _: Value = self.supabase.request(
            Method::POST,
            "/rest/v1/doctor_exception",
            Some(auth_token),
            Some(row),
        ).await.map_err(|e| {
            error!("Failed to add doctor exception for {}: {}", doctor_id, e);
            AvailabilityError::DatabaseError("Failed to add exception".to_string())
        })?;

        info!("Stored exception for doctor {} on {}", doctor_id, exception.date);
        Ok(())
    }
}

/// Parses an optional `YYYY-MM-DD` pair. Both bounds or neither.
pub fn parse_date_range(start: Option<&str>, end: Option<&str>) -> Result<Option<DateRange>, AvailabilityError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => Ok(Some(DateRange {
            start: parse_date(start, "start")?,
            end: parse_date(end, "end")?,
        })),
        _ => Err(AvailabilityError::ValidationError(
            "start and end must be provided together".to_string(),
        )),
    }
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, AvailabilityError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| AvailabilityError::ValidationError(format!("Invalid {} date format", field)))
}

/// Expands a weekly template into concrete back-to-back slots.
///
/// For every date in the range the first enabled entry for that weekday
/// applies. Slots stop before one would run past the entry's end time.
/// Entries whose times do not parse are skipped.
pub fn expand_weekly_template(
    entries: &[WeeklyScheduleEntry],
    range: DateRange,
) -> Result<Vec<SlotInput>, AvailabilityError> {
    if let Some(bad) = entries.iter().find(|e| e.enabled && e.slot_duration <= 0) {
        return Err(AvailabilityError::ValidationError(format!(
            "slotDuration must be positive for {}",
            bad.weekday
        )));
    }

    let mut slots = Vec::new();

    for date in range.start.iter_days().take_while(|d| *d <= range.end) {
        let weekday = DayOfWeek::from(date.weekday());
        let Some(entry) = entries.iter().find(|e| e.weekday == weekday && e.enabled) else {
            continue;
        };

        let start_time = match NaiveTime::parse_from_str(&entry.start, TIME_FORMAT) {
            Ok(t) => t,
            Err(e) => {
                warn!("Invalid start time format for {}: {}", entry.weekday, e);
                continue;
            }
        };
        let end_time = match NaiveTime::parse_from_str(&entry.end, TIME_FORMAT) {
            Ok(t) => t,
            Err(e) => {
                warn!("Invalid end time format for {}: {}", entry.weekday, e);
                continue;
            }
        };

        let day_end = date.and_time(end_time).and_utc();
        let step = Duration::minutes(i64::from(entry.slot_duration));
        let mut slot_start = date.and_time(start_time).and_utc();

        while slot_start + step <= day_end {
            slots.push(SlotInput {
                weekday: Some(weekday),
                availability_start: slot_start,
                availability_end: slot_start + step,
                slot_duration: Some(entry.slot_duration),
            });
            slot_start += step;
        }
    }

    Ok(slots)
}

/// One row per weekday, Monday first. Days without slots get a disabled
/// 09:00-17:00 placeholder.
pub fn summarize_weekly_schedule(slots: &[AvailabilitySlot]) -> Vec<WeeklyScheduleEntry> {
    let mut by_day: HashMap<DayOfWeek, (NaiveTime, NaiveTime, i32)> = HashMap::new();

    for slot in slots {
        let weekday = slot
            .weekday
            .unwrap_or_else(|| DayOfWeek::from(slot.availability_start.weekday()));
        let start = slot.availability_start.time();
        let end = slot.availability_end.time();
        let duration = slot.slot_duration.unwrap_or_else(|| {
            (slot.availability_end - slot.availability_start).num_minutes() as i32
        });

        by_day
            .entry(weekday)
            .and_modify(|(earliest, latest, _)| {
                *earliest = (*earliest).min(start);
                *latest = (*latest).max(end);
            })
            .or_insert((start, end, duration));
    }

    DayOfWeek::ALL
        .iter()
        .map(|day| match by_day.get(day) {
            Some((start, end, duration)) => WeeklyScheduleEntry {
                weekday: *day,
                enabled: true,
                start: start.format(TIME_FORMAT).to_string(),
                end: end.format(TIME_FORMAT).to_string(),
                slot_duration: *duration,
            },
            None => WeeklyScheduleEntry::placeholder(*day),
        })
        .collect()
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date + Duration::days(1)
}

fn start_of_day(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format(DATE_FORMAT))
}
