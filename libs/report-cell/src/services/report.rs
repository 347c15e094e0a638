use chrono::{Months, NaiveDate};
use futures::future::join_all;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use doctor_cell::services::referral::{cache_key, filter_value};
use doctor_cell::ReferralResolver;
use shared_config::AppConfig;
use shared_database::supabase::{api_error, return_representation, SupabaseClient};

use crate::models::{
    CreateReportRequest, DiagnosisHistoryEntry, DiagnosisState, MedicalReport, PrescribedMedication,
    ReportContent, ReportError, ReportFilters, ReportMedication,
};

const MEDICATION_COLUMNS: &str = "medication_name,dosage,frequency,duration,instructions";

pub struct ReportService {
    supabase: SupabaseClient,
    referrals: ReferralResolver,
}

impl ReportService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            referrals: ReferralResolver::new(config),
        }
    }

    /// Stores a report written by `doctor_id` together with its medications
    /// and, when a diagnosis is made, a diagnosis history entry. Medications
    /// are validated before anything is written.
    pub async fn create_report(
        &self,
        doctor_id: Uuid,
        request: CreateReportRequest,
        auth_token: &str,
    ) -> Result<MedicalReport, ReportError> {
        request.content.validate_medications()?;

        let referral_doctor_id = self.referral_for(&request.content, auth_token).await;
        let report_id = Uuid::new_v4();
        let record_diagnosis = DiagnosisState::default().appends_history(&request.content.diagnosis_state());

        let report = json!({
            "report_id": report_id,
            "appointment_id": request.appointment_id,
            "doctor_id": doctor_id,
            "patient_id": request.patient_id,
            "patient_first_name": name_or(request.patient_first_name, "Unknown"),
            "patient_last_name": name_or(request.patient_last_name, "Patient"),
            "doctor_first_name": name_or(request.doctor_first_name, "Dr."),
            "doctor_last_name": name_or(request.doctor_last_name, "Unknown"),
            "report_content": request.content.report_content,
            "diagnosis_made": request.content.diagnosis_made,
            "diagnosis_name": request.content.diagnosis_name,
            "diagnosis_details": request.content.diagnosis_details,
            "referral_needed": request.content.referral_needed,
            "referral_specialty": request.content.referral_specialty,
            "referral_doctor_name": request.content.referral_doctor_name,
            "referral_doctor_id": referral_doctor_id,
            "referral_message": request.content.referral_message,
        });

        let medications: Vec<ReportMedication> =
            request.content.medications.iter().map(ReportMedication::trimmed).collect();

        let args = json!({
            "p_report": report,
            "p_medications": medication_rows(&medications),
            "p_record_diagnosis": record_diagnosis,
        });

        let mut created: MedicalReport = self.supabase
            .rpc("create_medical_report", Some(auth_token), args)
            .await
            .map_err(|e| match api_error(&e) {
                // unique on appointment_id
                Some(api) if api.is_conflict() => {
                    warn!("Appointment {} already has a report", request.appointment_id);
                    ReportError::AlreadyExists
                }
                _ => {
                    error!("Failed to create report for appointment {}: {}", request.appointment_id, e);
                    ReportError::DatabaseError("Failed to create report".to_string())
                }
            })?;

        created.medications = medications;
        info!("Report {} created by doctor {}", created.report_id, doctor_id);
        Ok(created)
    }

    /// Replaces the clinical content of a report owned by `doctor_id`.
    ///
    /// The diagnosis state read here travels with the write; the store
    /// function rejects the update if the row changed in between.
    pub async fn update_report(
        &self,
        report_id: Uuid,
        doctor_id: Uuid,
        content: ReportContent,
        auth_token: &str,
    ) -> Result<(), ReportError> {
        content.validate_medications()?;

        let current = self.diagnosis_state(report_id, doctor_id, auth_token).await?;
        let append_history = current.appends_history(&content.diagnosis_state());
        let referral_doctor_id = self.referral_for(&content, auth_token).await;
        let medications: Vec<ReportMedication> = content.medications.iter().map(ReportMedication::trimmed).collect();

        let args = json!({
            "p_report_id": report_id,
            "p_report": {
                "report_content": content.report_content,
                "diagnosis_made": content.diagnosis_made,
                "diagnosis_name": content.diagnosis_name,
                "diagnosis_details": content.diagnosis_details,
                "referral_needed": content.referral_needed,
                "referral_specialty": content.referral_specialty,
                "referral_doctor_name": content.referral_doctor_name,
                "referral_doctor_id": referral_doctor_id,
                "referral_message": content.referral_message,
            },
            "p_medications": medication_rows(&medications),
            "p_expected_diagnosis_made": current.diagnosis_made,
            "p_expected_diagnosis_name": current.diagnosis_name,
            "p_append_history": append_history,
        });

        let _: Value = self.supabase
            .rpc("update_medical_report", Some(auth_token), args)
            .await
            .map_err(|e| match api_error(&e) {
                Some(api) if api.is_not_found() => ReportError::NotFound,
                Some(api) if api.is_conflict() => {
                    warn!("Report {} changed while it was being updated", report_id);
                    ReportError::ConcurrentUpdate
                }
                _ => {
                    error!("Failed to update report {}: {}", report_id, e);
                    ReportError::DatabaseError("Failed to update report".to_string())
                }
            })?;

        info!("Report {} updated (history appended: {})", report_id, append_history);
        Ok(())
    }

    /// Fetches a report visible to `reader_id`, its author or its patient.
    ///
    /// Anyone else gets `NotFound` before medications are read or the
    /// referral is backfilled.
    pub async fn get_report(&self, report_id: Uuid, reader_id: Uuid, auth_token: &str) -> Result<MedicalReport, ReportError> {
        let path = format!(
            "/rest/v1/medical_reports?report_id=eq.{0}&or=(doctor_id.eq.{1},patient_id.eq.{1})",
            report_id, reader_id
        );

        let rows: Vec<MedicalReport> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch report {}: {}", report_id, e);
                ReportError::DatabaseError("Failed to retrieve report".to_string())
            })?;

        let mut report = rows.into_iter().next().ok_or(ReportError::NotFound)?;
        report.medications = self.medications_for_report(report.report_id, auth_token).await?;
        self.resolve_referrals(std::slice::from_mut(&mut report), auth_token).await;

        Ok(report)
    }

    /// Reports written by a doctor, newest first, each with its
    /// medications attached.
    pub async fn list_reports(
        &self,
        doctor_id: Uuid,
        filters: &ReportFilters,
        auth_token: &str,
    ) -> Result<Vec<MedicalReport>, ReportError> {
        let mut path = format!("/rest/v1/medical_reports?doctor_id=eq.{}", doctor_id);

        if let Some((from, until)) = created_at_window(filters)? {
            path.push_str(&format!(
                "&created_at=gte.{}T00:00:00Z&created_at=lt.{}T00:00:00Z",
                from, until
            ));
        }
        if let Some(diagnosis) = contains_pattern(filters.diagnosis_name.as_deref()) {
            path.push_str(&format!("&diagnosis_name=ilike.{}", diagnosis));
        }
        if let Some(referral) = contains_pattern(filters.referral_doctor.as_deref()) {
            path.push_str(&format!("&referral_doctor_name=ilike.{}", referral));
        }
        path.push_str("&order=created_at.desc");

        let mut reports: Vec<MedicalReport> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch reports of doctor {}: {}", doctor_id, e);
                ReportError::DatabaseError("Failed to fetch reports".to_string())
            })?;

        if let Some(needle) = filters.patient_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let needle = needle.to_lowercase();
            reports.retain(|r| r.patient_full_name().to_lowercase().contains(&needle));
        }

        let medications = join_all(
            reports.iter().map(|r| self.medications_for_report(r.report_id, auth_token)),
        ).await;

        for (report, medications) in reports.iter_mut().zip(medications) {
            report.medications = medications.unwrap_or_else(|e| {
                warn!("Failed to fetch medications for report {}: {}", report.report_id, e);
                Vec::new()
            });
        }

        self.resolve_referrals(&mut reports, auth_token).await;
        debug!("Found {} reports for doctor {}", reports.len(), doctor_id);

        Ok(reports)
    }

    /// Deletes a report owned by `doctor_id`; medications go with it.
    pub async fn delete_report(&self, report_id: Uuid, doctor_id: Uuid, auth_token: &str) -> Result<(), ReportError> {
        let path = format!(
            "/rest/v1/medical_reports?report_id=eq.{}&doctor_id=eq.{}&select=report_id",
            report_id, doctor_id
        );

        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(return_representation()),
        ).await.map_err(|e| {
            error!("Failed to delete report {}: {}", report_id, e);
            ReportError::DatabaseError("Failed to delete report".to_string())
        })?;

        if deleted.is_empty() {
            return Err(ReportError::NotFound);
        }

        info!("Report {} deleted", report_id);
        Ok(())
    }

    pub async fn patient_medications(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PrescribedMedication>, ReportError> {
        let path = format!(
            "/rest/v1/medications?patient_id=eq.{}&order=created_at.desc",
            patient_id
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch medications of patient {}: {}", patient_id, e);
                ReportError::DatabaseError("Failed to fetch patient medications".to_string())
            })
    }

    pub async fn diagnosis_history(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DiagnosisHistoryEntry>, ReportError> {
        let path = format!(
            "/rest/v1/medical_diagnosis_history?diagnosis_patient_id=eq.{}&order=created_at.desc",
            patient_id
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch diagnosis history of patient {}: {}", patient_id, e);
                ReportError::DatabaseError("Failed to fetch diagnosis history".to_string())
            })
    }

    async fn medications_for_report(&self, report_id: Uuid, auth_token: &str) -> Result<Vec<ReportMedication>, ReportError> {
        let path = format!(
            "/rest/v1/medications?select={}&report_id=eq.{}&order=medication_name.asc,created_at.asc",
            MEDICATION_COLUMNS, report_id
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch medications for report {}: {}", report_id, e);
                ReportError::DatabaseError("Failed to fetch medications".to_string())
            })
    }

    async fn diagnosis_state(&self, report_id: Uuid, doctor_id: Uuid, auth_token: &str) -> Result<DiagnosisState, ReportError> {
        let path = format!(
            "/rest/v1/medical_reports?select=diagnosis_made,diagnosis_name&report_id=eq.{}&doctor_id=eq.{}",
            report_id, doctor_id
        );

        let rows: Vec<DiagnosisState> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch current state of report {}: {}", report_id, e);
                ReportError::DatabaseError("Failed to fetch current report data".to_string())
            })?;

        rows.into_iter().next().ok_or(ReportError::NotFound)
    }

    /// Referral doctor for new content: the given id, or a lookup of the
    /// given name. Lookup failures leave the referral unresolved.
    async fn referral_for(&self, content: &ReportContent, auth_token: &str) -> Option<Uuid> {
        if content.referral_doctor_id.is_some() {
            return content.referral_doctor_id;
        }
        let name = content.unresolved_referral()?;

        match self.referrals.resolve_by_name(name, auth_token).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Referral lookup for '{}' failed: {}", name, e);
                None
            }
        }
    }

    /// Fills in referral ids that can now be resolved by name and writes
    /// them back.
    async fn resolve_referrals(&self, reports: &mut [MedicalReport], auth_token: &str) {
        let names: Vec<String> = reports
            .iter()
            .filter_map(|r| r.unresolved_referral().map(str::to_string))
            .collect();
        if names.is_empty() {
            return;
        }

        let resolved = self.referrals.resolve_many(names.iter().map(String::as_str), auth_token).await;

        for report in reports.iter_mut() {
            let Some(name) = report.unresolved_referral() else { continue };
            let Some(Some(doctor_id)) = resolved.get(&cache_key(name)).copied() else { continue };

            report.referral_doctor_id = Some(doctor_id);
            self.referrals.backfill_referral(report.report_id, doctor_id, auth_token).await;
        }
    }
}

fn name_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn medication_rows(medications: &[ReportMedication]) -> Vec<Value> {
    medications
        .iter()
        .map(|m| json!({
            "medication_name": m.medication_name,
            "dosage": m.dosage,
            "frequency": m.frequency,
            "duration": m.duration,
            "instructions": m.instructions,
        }))
        .collect()
}

fn contains_pattern(value: Option<&str>) -> Option<String> {
    let value = filter_value(value?.trim());
    if value.is_empty() {
        return None;
    }
    Some(format!("*{}*", value))
}

/// `[from, until)` dates selected by the year/month/day filters. A month
/// without a year, or a day without a month, is ignored.
pub fn created_at_window(filters: &ReportFilters) -> Result<Option<(NaiveDate, NaiveDate)>, ReportError> {
    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let Some(year) = present(&filters.year) else {
        return Ok(None);
    };
    let year: i32 = year
        .parse()
        .map_err(|_| ReportError::ValidationError(format!("Invalid year: {}", year)))?;

    let Some(month) = present(&filters.month) else {
        let from = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| ReportError::ValidationError(format!("Invalid year: {}", year)))?;
        let until = from
            .checked_add_months(Months::new(12))
            .ok_or_else(|| ReportError::ValidationError(format!("Invalid year: {}", year)))?;
        return Ok(Some((from, until)));
    };
    let month: u32 = month
        .parse()
        .map_err(|_| ReportError::ValidationError(format!("Invalid month: {}", month)))?;
    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ReportError::ValidationError(format!("Invalid month: {}", month)))?;

    let Some(day) = present(&filters.day) else {
        let until = first_of_month
            .checked_add_months(Months::new(1))
            .ok_or_else(|| ReportError::ValidationError(format!("Invalid month: {}", month)))?;
        return Ok(Some((first_of_month, until)));
    };
    let day = day
        .parse::<u32>()
        .ok()
        .and_then(|d| NaiveDate::from_ymd_opt(year, month, d))
        .ok_or_else(|| ReportError::ValidationError(format!("Invalid day: {}", day)))?;
    let until = day
        .succ_opt()
        .ok_or_else(|| ReportError::ValidationError("Invalid day".to_string()))?;

    Ok(Some((day, until)))
}
