use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{DoctorNameRecord, ReferralDoctor, ReferralSearchQuery};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

// "Dr." and "د." are stripped even when glued to the name; bare "Dr" and "د"
// only when followed by whitespace.
static HONORIFIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:dr)\.|د\.|(?i:dr)(?:\s|$)|د(?:\s|$))\s*")
        .expect("honorific pattern is valid")
});

/// Canonical form of a free-text doctor name: trimmed, single-spaced and
/// without a leading honorific.
pub fn normalize_doctor_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    HONORIFIC.replace(&collapsed, "").trim().to_string()
}

/// Key used to share lookups between reports naming the same doctor.
pub fn cache_key(name: &str) -> String {
    normalize_doctor_name(name).to_lowercase()
}

/// Strips PostgREST pattern and list syntax from user input before it is
/// embedded in a filter.
pub fn filter_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '*' | '%' | ',' | '(' | ')'))
        .collect();
    urlencoding::encode(&cleaned).into_owned()
}

pub struct ReferralResolver {
    supabase: SupabaseClient,
}

impl ReferralResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolves a free-text name to a doctor id. Only a single exact
    /// (case-insensitive) full-name match counts; none or several leave the
    /// name unresolved.
    pub async fn resolve_by_name(&self, name: &str, auth_token: &str) -> Result<Option<Uuid>> {
        let target = cache_key(name);
        let Some(first_token) = target.split(' ').next().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let path = format!(
            "/rest/v1/doctor_info?select=doctor_id,first_name,last_name&first_name=ilike.{}*",
            filter_value(first_token)
        );
        let candidates: Vec<DoctorNameRecord> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let matches: Vec<Uuid> = candidates
            .into_iter()
            .filter(|c| cache_key(&format!("{} {}", c.first_name, c.last_name)) == target)
            .map(|c| c.doctor_id)
            .collect();

        match matches.as_slice() {
            [doctor_id] => {
                debug!("Referral name '{}' resolved to {}", name, doctor_id);
                Ok(Some(*doctor_id))
            }
            [] => {
                debug!("Referral name '{}' matched no doctor", name);
                Ok(None)
            }
            _ => {
                debug!("Referral name '{}' is ambiguous ({} matches)", name, matches.len());
                Ok(None)
            }
        }
    }

    /// Resolves several names, querying the store once per distinct
    /// normalized name. The map is keyed by [`cache_key`]. Lookup failures
    /// are logged and leave the name unresolved.
    pub async fn resolve_many<'a, I>(&self, names: I, auth_token: &str) -> HashMap<String, Option<Uuid>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cache: HashMap<String, Option<Uuid>> = HashMap::new();

        for name in names {
            let key = cache_key(name);
            if key.is_empty() || cache.contains_key(&key) {
                continue;
            }

            let resolved = match self.resolve_by_name(name, auth_token).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("Referral lookup for '{}' failed: {}", name, e);
                    None
                }
            };
            cache.insert(key, resolved);
        }

        cache
    }

    /// Records a resolved referral on a report that still has none.
    /// Failures are logged and otherwise ignored.
    pub async fn backfill_referral(&self, report_id: Uuid, doctor_id: Uuid, auth_token: &str) {
        let path = format!(
            "/rest/v1/medical_reports?report_id=eq.{}&referral_doctor_id=is.null",
            report_id
        );

        let result: Result<serde_json::Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "referral_doctor_id": doctor_id })),
            Some(return_representation()),
        ).await;

        match result {
            Ok(_) => info!("Backfilled referral doctor {} on report {}", doctor_id, report_id),
            Err(e) => warn!("Failed to backfill referral on report {}: {}", report_id, e),
        }
    }

    /// Doctors a referral can be addressed to, best rated first.
    pub async fn search_doctors(&self, query: ReferralSearchQuery, auth_token: &str) -> Result<Vec<ReferralDoctor>> {
        let mut path = String::from(
            "/rest/v1/doctor_info?select=doctor_id,first_name,last_name,specialty_code,experience,rating_score,rating_count",
        );

        let text = query.q.as_deref().map(normalize_doctor_name).unwrap_or_default();
        let tokens: Vec<String> = text
            .split(' ')
            .map(filter_value)
            .filter(|t| !t.is_empty())
            .collect();

        match tokens.as_slice() {
            [] => {}
            [single] => path.push_str(&format!(
                "&or=(first_name.ilike.*{0}*,last_name.ilike.*{0}*,specialty_code.ilike.*{0}*)",
                single
            )),
            [first, rest @ ..] => path.push_str(&format!(
                "&first_name=ilike.*{}*&last_name=ilike.*{}*",
                first,
                rest.join("%20")
            )),
        }

        if let Some(specialty) = query.specialty.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            path.push_str(&format!("&specialty_code=ilike.{}", filter_value(specialty)));
        }

        let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        path.push_str(&format!(
            "&order=rating_score.desc.nullslast,experience.desc&limit={}",
            limit
        ));

        self.supabase.request(Method::GET, &path, Some(auth_token), None).await
    }
}
