//! Console REST backend client.
//!
//! Provides authenticated HTTP communication with the backend. The bearer
//! token is never stored on the client itself: every request asks the
//! injected [`TokenSource`] for the current token, so login/logout on the
//! session guard take effect without rebuilding the client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    DashboardStats, DiningTable, MenuItem, Order, OrderStatus, ReportData, RestaurantSettings,
};

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - ensure the path ends in exactly one `/api` segment
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if !url.ends_with("/api") {
        url.push_str("/api");
    }

    url
}

// ---------------------------------------------------------------------------
// Token injection
// ---------------------------------------------------------------------------

/// Supplies the bearer token for each outgoing request.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, used for anonymous flows (QR ordering) and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Envelope and error mapping
// ---------------------------------------------------------------------------

/// Uniform `{ success, message, data }` wrapper used by every resource
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, turning `success: false` into [`ApiError::Rejected`].
    pub fn into_data(self) -> ApiResult<T> {
        if !self.success {
            return Err(ApiError::Rejected {
                message: self
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Request was rejected by the server".to_string()),
            });
        }
        self.data
            .ok_or_else(|| ApiError::InvalidResponse("Missing data in response".to_string()))
    }

    /// Like [`into_data`](Self::into_data) for endpoints that answer with no payload.
    pub fn into_unit(self) -> ApiResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                message: self
                    .message
                    .unwrap_or_else(|| "Request was rejected by the server".to_string()),
            })
        }
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> ApiError {
    if err.is_connect() {
        return ApiError::Http(format!("Cannot reach the server at {url}"));
    }
    if err.is_timeout() {
        return ApiError::Http(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return ApiError::Http(format!("Invalid server URL: {url}"));
    }
    ApiError::Http(format!("Network error communicating with {url}: {err}"))
}

/// Generic message used when the body carries nothing better.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session is invalid or expired".to_string(),
        403 => "You are not allowed to do that".to_string(),
        404 => "Endpoint not found".to_string(),
        s if s >= 500 => format!("Server error (HTTP {s})"),
        s => format!("Unexpected response from server (HTTP {s})"),
    }
}

/// Map a non-success HTTP status and its body onto an [`ApiError`],
/// preferring the backend's own message.
pub(crate) fn error_from_status(status: StatusCode, body: &str) -> ApiError {
    let backend_message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    });
    let message = backend_message.unwrap_or_else(|| status_message(status));

    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::Validation(message)
        }
        other => ApiError::Server {
            status: other.as_u16(),
            message,
        },
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub menu_item_id: i64,
    pub quantity: i64,
}

/// Body of `POST /orders`, shared by staff carts and the QR menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderRequest {
    pub customer_name: String,
    pub table_number: Option<u32>,
    pub waiter_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub items: Vec<OrderLineRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
}

/// `POST /auth/login` answers with a bare JWT body, not the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Plain CRUD resources. Each maps to `/api/<path>` with the usual
/// list/create/update/delete verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Inventory,
    Customers,
    Staff,
    Suppliers,
    Reservations,
    Expenses,
    Jobs,
    Candidates,
    Menu,
    Tables,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Inventory => "inventory",
            Resource::Customers => "customers",
            Resource::Staff => "staff",
            Resource::Suppliers => "suppliers",
            Resource::Reservations => "reservations",
            Resource::Expenses => "expenses",
            Resource::Jobs => "jobs",
            Resource::Candidates => "candidates",
            Resource::Menu => "menu",
            Resource::Tables => "tables",
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_api_url(base_url),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a path relative to `/api`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Perform a request and decode the raw JSON body.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        let mut req = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = self.tokens.bearer_token().filter(|t| !t.trim().is_empty()) {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        debug!(method = %method, path, "api request");
        let resp = req.send().await.map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        if !status.is_success() {
            let err = error_from_status(status, &text);
            warn!(method = %method, path, status = status.as_u16(), error = %err, "api request failed");
            return Err(err);
        }

        let body_text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(body_text)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid JSON from server: {e}")))
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        self.request::<ApiResponse<T>, ()>(Method::GET, path, query, None)
            .await?
            .into_data()
    }

    async fn send_data<T, B>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request::<ApiResponse<T>, B>(method, path, &[], Some(body))
            .await?
            .into_data()
    }

    // ========== Orders ==========

    pub async fn orders(&self) -> ApiResult<Vec<Order>> {
        self.get_data("orders", &[]).await
    }

    pub async fn create_order(&self, request: &NewOrderRequest) -> ApiResult<Order> {
        self.send_data(Method::POST, "orders", request).await
    }

    /// `PUT /orders/{id}/status?status=<STATUS>`; returns the updated order.
    pub async fn update_order_status(&self, id: i64, status: OrderStatus) -> ApiResult<Order> {
        self.request::<ApiResponse<Order>, ()>(
            Method::PUT,
            &format!("orders/{id}/status"),
            &[("status", status.as_str().to_string())],
            None,
        )
        .await?
        .into_data()
    }

    // ========== Reference data ==========

    pub async fn menu(&self) -> ApiResult<Vec<MenuItem>> {
        self.get_data("menu", &[]).await
    }

    pub async fn tables(&self) -> ApiResult<Vec<DiningTable>> {
        self.get_data("tables", &[]).await
    }

    pub async fn settings(&self) -> ApiResult<RestaurantSettings> {
        self.get_data("settings", &[]).await
    }

    pub async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
        self.get_data("dashboard/stats", &[]).await
    }

    // ========== Reports / assistant ==========

    pub async fn reports(&self, year: Option<i32>, month: Option<u32>) -> ApiResult<ReportData> {
        let mut query = Vec::new();
        if let Some(y) = year {
            query.push(("year", y.to_string()));
        }
        if let Some(m) = month {
            query.push(("month", m.to_string()));
        }
        self.get_data("reports", &query).await
    }

    pub async fn analyze_report(&self, report: &ReportData) -> ApiResult<String> {
        self.send_data(Method::POST, "reports/analyze", report).await
    }

    pub async fn chat(&self, message: &str, context: &Value) -> ApiResult<String> {
        let payload = serde_json::json!({ "message": message, "context": context });
        self.send_data(Method::POST, "reports/chat", &payload).await
    }

    // ========== Auth ==========

    pub async fn login(&self, username_or_email: &str, password: &str) -> ApiResult<LoginResponse> {
        let payload = serde_json::json!({
            "usernameOrEmail": username_or_email,
            "password": password,
        });
        self.request(Method::POST, "auth/login", &[], Some(&payload))
            .await
    }

    pub async fn validate_token(&self) -> ApiResult<()> {
        self.request::<ApiResponse<Value>, ()>(Method::GET, "auth/validate", &[], None)
            .await?
            .into_unit()
    }

    pub async fn forgot_password(&self, email: &str) -> ApiResult<()> {
        let payload = serde_json::json!({ "email": email });
        self.request::<ApiResponse<Value>, _>(
            Method::POST,
            "auth/forgot-password",
            &[],
            Some(&payload),
        )
        .await?
        .into_unit()
    }

    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> ApiResult<()> {
        let payload = serde_json::json!({
            "email": email,
            "otp": otp,
            "newPassword": new_password,
        });
        self.request::<ApiResponse<Value>, _>(
            Method::POST,
            "auth/reset-password",
            &[],
            Some(&payload),
        )
        .await?
        .into_unit()
    }

    // ========== Generic CRUD ==========

    pub async fn list<T: DeserializeOwned>(&self, resource: Resource) -> ApiResult<Vec<T>> {
        self.get_data(resource.path(), &[]).await
    }

    pub async fn create<T, B>(&self, resource: Resource, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_data(Method::POST, resource.path(), body).await
    }

    pub async fn update<T, B>(&self, resource: Resource, id: i64, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_data(Method::PUT, &format!("{}/{id}", resource.path()), body)
            .await
    }

    pub async fn delete(&self, resource: Resource, id: i64) -> ApiResult<()> {
        self.request::<ApiResponse<Value>, ()>(
            Method::DELETE,
            &format!("{}/{id}", resource.path()),
            &[],
            None,
        )
        .await?
        .into_unit()
    }
}
