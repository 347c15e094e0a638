use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// REPORT MODELS
// ==============================================================================

/// A `medical_reports` row, with its medications attached on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MedicalReport {
    pub report_id: Uuid,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub doctor_first_name: String,
    pub doctor_last_name: String,
    pub report_content: Option<String>,
    #[serde(default)]
    pub diagnosis_made: bool,
    pub diagnosis_name: Option<String>,
    pub diagnosis_details: Option<String>,
    #[serde(default)]
    pub referral_needed: bool,
    pub referral_specialty: Option<String>,
    pub referral_doctor_name: Option<String>,
    pub referral_doctor_id: Option<Uuid>,
    pub referral_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub medications: Vec<ReportMedication>,
}

impl MedicalReport {
    pub fn patient_full_name(&self) -> String {
        format!("{} {}", self.patient_first_name, self.patient_last_name)
    }

    /// Referral names that still need to be matched to a doctor.
    pub fn unresolved_referral(&self) -> Option<&str> {
        match self.referral_doctor_id {
            Some(_) => None,
            None => self.referral_doctor_name.as_deref().filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Medication as written on a report. Accepts both the API's camelCase and
/// the store's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMedication {
    #[serde(alias = "medication_name")]
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl ReportMedication {
    /// Copy with surrounding whitespace removed, as it is stored.
    pub fn trimmed(&self) -> Self {
        Self {
            medication_name: self.medication_name.trim().to_string(),
            dosage: self.dosage.trim().to_string(),
            frequency: self.frequency.trim().to_string(),
            duration: self.duration.trim().to_string(),
            instructions: self.instructions.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        let required = [
            ("name", &self.medication_name),
            ("dosage", &self.dosage),
            ("frequency", &self.frequency),
            ("duration", &self.duration),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ReportError::ValidationError(format!("medication {} is required", field)));
            }
        }
        Ok(())
    }
}

/// Patient-scoped medication ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct PrescribedMedication {
    pub medication_id: Uuid,
    pub patient_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: Option<String>,
    pub prescribing_doctor_name: Option<String>,
    pub prescribing_doctor_id: Option<Uuid>,
    pub report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct DiagnosisHistoryEntry {
    #[serde(rename(deserialize = "diag_history_id"))]
    pub id: Uuid,
    #[serde(rename(deserialize = "diagnosis_patient_id"))]
    pub patient_id: Uuid,
    pub diagnosis_name: String,
    pub diagnosis_details: Option<String>,
    #[serde(rename(deserialize = "diagnosis_doctor_id"))]
    pub doctor_id: Option<Uuid>,
    #[serde(rename(deserialize = "diagnosis_doctor_name"))]
    pub doctor_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Diagnosis columns of a stored report, read before an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisState {
    pub diagnosis_made: bool,
    pub diagnosis_name: Option<String>,
}

impl DiagnosisState {
    /// Whether moving to `next` records a new diagnosis in the patient's
    /// history: newly made, or renamed while still made.
    pub fn appends_history(&self, next: &DiagnosisState) -> bool {
        let Some(next_name) = next.diagnosis_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return false;
        };
        if !next.diagnosis_made {
            return false;
        }
        if !self.diagnosis_made {
            return true;
        }
        self.diagnosis_name.as_deref().map(str::trim) != Some(next_name)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Clinical content of a report, shared by create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportContent {
    #[serde(default)]
    pub report_content: Option<String>,
    #[serde(default)]
    pub diagnosis_made: bool,
    #[serde(default)]
    pub diagnosis_name: Option<String>,
    #[serde(default)]
    pub diagnosis_details: Option<String>,
    #[serde(default)]
    pub medications: Vec<ReportMedication>,
    #[serde(default)]
    pub referral_needed: bool,
    #[serde(default)]
    pub referral_specialty: Option<String>,
    #[serde(default)]
    pub referral_doctor_name: Option<String>,
    #[serde(default)]
    pub referral_doctor_id: Option<Uuid>,
    #[serde(default)]
    pub referral_message: Option<String>,
}

impl ReportContent {
    pub fn diagnosis_state(&self) -> DiagnosisState {
        DiagnosisState {
            diagnosis_made: self.diagnosis_made,
            diagnosis_name: self.diagnosis_name.clone(),
        }
    }

    /// First invalid medication, if any, as a validation error.
    pub fn validate_medications(&self) -> Result<(), ReportError> {
        for (index, medication) in self.medications.iter().enumerate() {
            medication.validate().map_err(|e| match e {
                ReportError::ValidationError(msg) => {
                    ReportError::ValidationError(format!("invalid medication at index {}: {}", index, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn unresolved_referral(&self) -> Option<&str> {
        match self.referral_doctor_id {
            Some(_) => None,
            None => self.referral_doctor_name.as_deref().filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    #[serde(default)]
    pub patient_first_name: Option<String>,
    #[serde(default)]
    pub patient_last_name: Option<String>,
    #[serde(default)]
    pub doctor_first_name: Option<String>,
    #[serde(default)]
    pub doctor_last_name: Option<String>,
    #[serde(flatten)]
    pub content: ReportContent,
}

/// Listing filters. The date filter is hierarchical: `month` only applies
/// with `year`, `day` only with both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub patient_name: Option<String>,
    pub diagnosis_name: Option<String>,
    pub referral_doctor: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReportError {
    #[error("Report not found")]
    NotFound,

    #[error("Report was modified concurrently")]
    ConcurrentUpdate,

    #[error("A report already exists for this appointment")]
    AlreadyExists,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
