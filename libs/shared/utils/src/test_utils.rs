use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Config pointing the store client at a wiremock server.
    pub fn with_store(supabase_url: &str) -> Self {
        Self {
            supabase_url: supabase_url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            server_port: 3000,
            default_timezone: "UTC".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub user_type: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::patient("test@example.com")
    }
}

impl TestUser {
    pub fn new(email: &str, user_type: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            user_type: user_type.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, "receptionist")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            metadata: Some(json!({ "user_type": self.user_type })),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "user_metadata": { "user_type": user.user_type },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the scheduling tables and views.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn availability_slot_response(doctor_id: &str, start: &str, end: &str) -> Value {
        json!({
            "availability_id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "weekday": "Monday",
            "availability_start": start,
            "availability_end": end,
            "slot_duration": 30
        })
    }

    pub fn reservation_details_response(
        appointment_id: &str,
        doctor_id: &str,
        patient_id: &str,
        counterpart_kind: &str,
    ) -> Value {
        json!({
            "appointment_id": appointment_id,
            "appointment_start": "2025-03-10T09:00:00Z",
            "appointment_end": "2025-03-10T09:30:00Z",
            "title": "Consultation",
            "notes": null,
            "doctor_id": doctor_id,
            "doctor_first_name": "John",
            "doctor_last_name": "Smith",
            "specialty": "Cardiology",
            "patient_id": patient_id,
            "patient_first_name": "Amina",
            "patient_last_name": "Haddad",
            "age": 34,
            "counterpart_kind": counterpart_kind,
            "is_doctor_patient": counterpart_kind == "doctor",
            "canceled": false,
            "canceled_by": null,
            "cancellation_reason": null,
            "cancellation_timestamp": null,
            "report_exists": false
        })
    }

    pub fn doctor_info_response(doctor_id: &str, first_name: &str, last_name: &str) -> Value {
        json!({
            "doctor_id": doctor_id,
            "first_name": first_name,
            "last_name": last_name,
            "specialty_code": "Cardiology",
            "experience": "12",
            "rating_score": 4.8,
            "rating_count": 120
        })
    }

    pub fn medical_report_response(report_id: &str, doctor_id: &str, patient_id: &str) -> Value {
        json!({
            "report_id": report_id,
            "appointment_id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "patient_first_name": "Amina",
            "patient_last_name": "Haddad",
            "doctor_first_name": "John",
            "doctor_last_name": "Smith",
            "report_content": "Follow-up in two weeks",
            "diagnosis_made": true,
            "diagnosis_name": "Hypertension",
            "diagnosis_details": null,
            "referral_needed": false,
            "referral_specialty": null,
            "referral_doctor_name": null,
            "referral_doctor_id": null,
            "referral_message": null,
            "created_at": "2025-03-10T10:00:00Z"
        })
    }

    pub fn medication_response(report_id: &str, patient_id: &str, doctor_id: &str) -> Value {
        json!({
            "medication_id": Uuid::new_v4(),
            "patient_id": patient_id,
            "medication_name": "Amlodipine",
            "dosage": "5mg",
            "frequency": "Once daily",
            "duration": "30 days",
            "instructions": null,
            "prescribing_doctor_name": "Dr. John Smith",
            "prescribing_doctor_id": doctor_id,
            "report_id": report_id,
            "created_at": "2025-03-10T10:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}
