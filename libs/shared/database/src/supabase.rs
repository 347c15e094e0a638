use std::fmt;

use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Non-success response returned by PostgREST.
///
/// Carried inside the `anyhow::Error` so callers can downcast and react to
/// specific statuses (409 from an exclusion constraint, 404, ...).
#[derive(Debug, Clone)]
pub struct SupabaseApiError {
    pub status: u16,
    pub body: String,
}

impl SupabaseApiError {
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl fmt::Display for SupabaseApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            401 | 403 => write!(f, "Authentication error: {}", self.body),
            404 => write!(f, "Resource not found: {}", self.body),
            _ => write!(f, "API error ({}): {}", self.status, self.body),
        }
    }
}

impl std::error::Error for SupabaseApiError {}

/// Returns the PostgREST error carried by `err`, if any.
pub fn api_error(err: &anyhow::Error) -> Option<&SupabaseApiError> {
    err.downcast_ref::<SupabaseApiError>()
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)
            .map_err(|_| anyhow!("Invalid anon key header value"))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| anyhow!("Invalid bearer token header value"))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(SupabaseApiError {
                status: status.as_u16(),
                body: error_text,
            }.into());
        }

        // DELETE/PATCH without return=representation answer 204 with no body
        let text = response.text().await?;
        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        let data = serde_json::from_str::<T>(payload)?;
        Ok(data)
    }

    /// Calls a Postgres function exposed at `/rest/v1/rpc/{function}`.
    ///
    /// Each function body runs inside a single transaction, which is how the
    /// multi-statement writes stay all-or-nothing.
    pub async fn rpc<T>(&self, function: &str, auth_token: Option<&str>, args: Value) -> Result<T>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }

    /// Counts the rows matched by `path` without transferring them.
    ///
    /// Sends `Prefer: count=exact` with `limit=0`; the total is read from
    /// `Content-Range` (`*/1500`), so the server row cap does not apply.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<u64> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}limit=0", self.base_url, path, separator);
        debug!("Counting rows at {}", url);

        let mut headers = self.get_headers(auth_token)?;
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.client.get(&url).headers(headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(SupabaseApiError {
                status: status.as_u16(),
                body: error_text,
            }.into());
        }

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("Missing Content-Range header on count response"))?;

        content_range_total(range)
            .ok_or_else(|| anyhow!("Unexpected Content-Range on count response: {}", range))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// Total from a PostgREST `Content-Range` value such as `0-24/3573` or `*/0`.
pub fn content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Standard `Prefer: return=representation` header for inserts and updates.
pub fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}
