use chrono_tz::Tz;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentError, CounterpartKind, Reservation, ReservationRecord, UserRole, ViewAs,
};

/// Parses an IANA zone name, falling back to UTC for anything unknown.
pub fn resolve_timezone(name: &str) -> Tz {
    let name = name.trim();
    if name.is_empty() {
        return Tz::UTC;
    }
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Unknown timezone '{}', falling back to UTC", name);
        Tz::UTC
    })
}

pub fn to_reservation(record: ReservationRecord, tz: &Tz) -> Reservation {
    Reservation {
        details: record.details,
        appointment_start: record.appointment_start.with_timezone(tz).fixed_offset(),
        appointment_end: record.appointment_end.with_timezone(tz).fixed_offset(),
    }
}

#[derive(Debug, Deserialize)]
struct ReceptionistAssignment {
    assigned_doctor_id: Option<Uuid>,
}

/// Role-shaped listing over the `reservation_details` view.
pub struct ReservationViewService {
    supabase: SupabaseClient,
}

impl ReservationViewService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_reservations(
        &self,
        user_id: Uuid,
        role: UserRole,
        timezone: &str,
        view_as: Option<ViewAs>,
        auth_token: &str,
    ) -> Result<Vec<Reservation>, AppointmentError> {
        debug!("Listing reservations for {} as {:?} (view: {:?})", user_id, role, view_as);

        let records = match (role, view_as) {
            (UserRole::Patient, _) => {
                self.as_counterpart(user_id, CounterpartKind::Patient, auth_token).await?
            }
            (UserRole::Receptionist, Some(ViewAs::Patient)) => {
                self.as_counterpart(user_id, CounterpartKind::Receptionist, auth_token).await?
            }
            (UserRole::Receptionist, _) => match self.assigned_doctor(user_id, auth_token).await? {
                Some(doctor_id) => self.as_provider(doctor_id, auth_token).await?,
                None => {
                    debug!("Receptionist {} has no assigned doctor", user_id);
                    Vec::new()
                }
            },
            (UserRole::Doctor, Some(ViewAs::Doctor)) => self.as_provider(user_id, auth_token).await?,
            (UserRole::Doctor, Some(ViewAs::Patient)) => {
                self.as_counterpart(user_id, CounterpartKind::Doctor, auth_token).await?
            }
            (UserRole::Doctor, None) => {
                let (mut provider, counterpart) = futures::try_join!(
                    self.as_provider(user_id, auth_token),
                    self.as_counterpart(user_id, CounterpartKind::Doctor, auth_token),
                )?;
                provider.extend(counterpart);
                provider
            }
        };

        let tz = resolve_timezone(timezone);
        Ok(records.into_iter().map(|r| to_reservation(r, &tz)).collect())
    }

    async fn as_provider(&self, doctor_id: Uuid, auth_token: &str) -> Result<Vec<ReservationRecord>, AppointmentError> {
        self.fetch(&format!("doctor_id=eq.{}", doctor_id), auth_token).await
    }

    async fn as_counterpart(
        &self,
        user_id: Uuid,
        kind: CounterpartKind,
        auth_token: &str,
    ) -> Result<Vec<ReservationRecord>, AppointmentError> {
        self.fetch(&format!("patient_id=eq.{}&counterpart_kind=eq.{}", user_id, kind), auth_token).await
    }

    async fn fetch(&self, filter: &str, auth_token: &str) -> Result<Vec<ReservationRecord>, AppointmentError> {
        let path = format!("/rest/v1/reservation_details?{}&order=appointment_start.asc", filter);

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch reservations ({}): {}", filter, e);
                AppointmentError::DatabaseError("Failed to fetch reservations".to_string())
            })
    }

    async fn assigned_doctor(&self, receptionist_id: Uuid, auth_token: &str) -> Result<Option<Uuid>, AppointmentError> {
        let path = format!(
            "/rest/v1/receptionists?select=assigned_doctor_id&receptionist_id=eq.{}",
            receptionist_id
        );

        let rows: Vec<ReceptionistAssignment> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to look up receptionist {}: {}", receptionist_id, e);
                AppointmentError::DatabaseError("Failed to fetch reservations".to_string())
            })?;

        Ok(rows.into_iter().next().and_then(|r| r.assigned_doctor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record() -> ReservationRecord {
        serde_json::from_value(json!({
            "appointment_id": "c0ffee00-0000-4000-8000-000000000001",
            "appointment_start": "2025-07-01T09:00:00Z",
            "appointment_end": "2025-07-01T09:30:00Z",
            "doctor_id": "0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e",
            "patient_id": null,
            "counterpart_kind": "patient",
            "report_exists": true
        }))
        .unwrap()
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(resolve_timezone(""), Tz::UTC);
        assert_eq!(resolve_timezone("Africa/Algiers"), Tz::Africa__Algiers);
    }

    #[test]
    fn test_conversion_keeps_instant_and_shifts_offset() {
        let reservation = to_reservation(record(), &resolve_timezone("America/New_York"));

        assert_eq!(reservation.appointment_start.offset().local_minus_utc(), -4 * 3600);
        assert_eq!(reservation.appointment_start, Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap());
        assert!(reservation.details.report_exists);
    }

    #[test]
    fn test_serialized_reservation_uses_local_time() {
        let reservation = to_reservation(record(), &resolve_timezone("Asia/Tokyo"));
        let value = serde_json::to_value(&reservation).unwrap();

        assert_eq!(value["appointmentStart"], "2025-07-01T18:00:00+09:00");
        assert_eq!(value["reportExists"], true);
        assert_eq!(value["counterpartKind"], "patient");
    }
}
