use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{api_error, return_representation, SupabaseClient};

use crate::models::{
    AppointmentBucket, AppointmentError, CancelAppointmentRequest, CreateReservationRequest,
    Reservation, ReservationCounts, ReservationCreated, ReservationRecord, UserRole,
};
use crate::services::views::{resolve_timezone, to_reservation};

pub struct ReservationService {
    supabase: SupabaseClient,
    default_timezone: String,
}

impl ReservationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            default_timezone: config.default_timezone.clone(),
        }
    }

    /// Books an appointment and consumes the doctor's slot starting at the
    /// same instant, in one store transaction.
    ///
    /// A missing slot does not fail the booking. Overlap with another live
    /// appointment of the same doctor is reported as `ConflictDetected`.
    pub async fn create_reservation(
        &self,
        request: CreateReservationRequest,
        acting_role: Option<UserRole>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        debug!(
            "Creating reservation with doctor {} for {} at {}",
            request.doctor_id, request.patient_id, request.appointment_start
        );

        let is_doctor_patient = match acting_role {
            Some(UserRole::Doctor) => self.is_doctor_identity(request.patient_id, auth_token).await?,
            _ => false,
        };

        let args = json!({
            "p_doctor_id": request.doctor_id,
            "p_patient_id": request.patient_id,
            "p_start": request.appointment_start.to_rfc3339(),
            "p_end": request.appointment_end.to_rfc3339(),
            "p_title": request.title,
            "p_notes": request.notes,
            "p_is_doctor_patient": is_doctor_patient,
        });

        let created: ReservationCreated = self.supabase
            .rpc("create_reservation", Some(auth_token), args)
            .await
            .map_err(|e| {
                if api_error(&e).is_some_and(|api| api.is_conflict()) {
                    warn!("Reservation for doctor {} overlaps an existing booking", request.doctor_id);
                    return AppointmentError::ConflictDetected;
                }
                error!("Failed to create reservation: {}", e);
                AppointmentError::DatabaseError("Failed to create reservation".to_string())
            })?;

        if !created.slot_consumed {
            warn!(
                "No availability slot of doctor {} starts at {}; booked without consuming one",
                request.doctor_id, request.appointment_start
            );
        }

        info!("Reservation {} created", created.appointment_id);
        Ok(created.appointment_id)
    }

    /// Soft-cancels an appointment. Repeating the call overwrites the
    /// cancellation metadata. The consumed slot is not re-published.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?appointment_id=eq.{}&select=appointment_id",
            appointment_id
        );
        let update = json!({
            "canceled": true,
            "canceled_by": request.canceled_by,
            "cancellation_reason": request.cancellation_reason,
            "cancellation_timestamp": Utc::now().to_rfc3339(),
        });

        let updated: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(return_representation()),
        ).await.map_err(|e| {
            error!("Failed to cancel appointment {}: {}", appointment_id, e);
            AppointmentError::DatabaseError("Failed to cancel appointment".to_string())
        })?;

        if updated.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} canceled by {}", appointment_id, request.canceled_by);
        Ok(())
    }

    /// Single reservation, rendered in the service's default timezone.
    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Reservation, AppointmentError> {
        let path = format!("/rest/v1/reservation_details?appointment_id=eq.{}", appointment_id);

        let rows: Vec<ReservationRecord> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch appointment {}: {}", appointment_id, e);
                AppointmentError::DatabaseError("Failed to fetch appointment".to_string())
            })?;

        let record = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
        Ok(to_reservation(record, &resolve_timezone(&self.default_timezone)))
    }

    /// Live (non-canceled) appointment counts.
    pub async fn statistics(
        &self,
        user_id: &str,
        role: UserRole,
        auth_token: &str,
    ) -> Result<ReservationCounts, AppointmentError> {
        self.counts(user_id, role, CountFilter::Live, auth_token).await
    }

    pub async fn counts_by_bucket(
        &self,
        user_id: &str,
        role: UserRole,
        bucket: AppointmentBucket,
        auth_token: &str,
    ) -> Result<ReservationCounts, AppointmentError> {
        self.counts(user_id, role, CountFilter::Bucket(bucket), auth_token).await
    }

    async fn counts(
        &self,
        user_id: &str,
        role: UserRole,
        filter: CountFilter,
        auth_token: &str,
    ) -> Result<ReservationCounts, AppointmentError> {
        let filter = filter.query(&Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        let counts = match role {
            UserRole::Doctor => {
                let (as_doctor, as_patient) = futures::try_join!(
                    self.count("doctor_id", user_id, &filter, auth_token),
                    self.count("patient_id", user_id, &filter, auth_token),
                )?;
                ReservationCounts { as_doctor, as_patient }
            }
            // receptionists only count bookings they made for themselves
            UserRole::Patient | UserRole::Receptionist => ReservationCounts {
                as_doctor: 0,
                as_patient: self.count("patient_id", user_id, &filter, auth_token).await?,
            },
        };

        Ok(counts)
    }

    async fn count(&self, column: &str, user_id: &str, filter: &str, auth_token: &str) -> Result<u64, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select=appointment_id&{}=eq.{}{}",
            column, user_id, filter
        );

        self.supabase
            .count(&path, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to count appointments by {}: {}", column, e);
                AppointmentError::DatabaseError("Failed to count appointments".to_string())
            })
    }

    async fn is_doctor_identity(&self, id: Uuid, auth_token: &str) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/doctor_info?select=doctor_id&doctor_id=eq.{}", id);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to look up doctor {}: {}", id, e);
                AppointmentError::DatabaseError("Failed to create reservation".to_string())
            })?;

        Ok(!rows.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
enum CountFilter {
    Live,
    Bucket(AppointmentBucket),
}

impl CountFilter {
    fn query(self, now: &str) -> String {
        match self {
            CountFilter::Live => "&canceled=is.false".to_string(),
            CountFilter::Bucket(AppointmentBucket::All) => String::new(),
            CountFilter::Bucket(AppointmentBucket::Canceled) => "&canceled=is.true".to_string(),
            CountFilter::Bucket(AppointmentBucket::Upcoming) => format!("&canceled=is.false&appointment_end=gte.{}", now),
            CountFilter::Bucket(AppointmentBucket::Past) => format!("&canceled=is.false&appointment_end=lt.{}", now),
        }
    }
}
