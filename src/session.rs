//! Session guard: the signed-in user, their bearer token, and route
//! authorization.
//!
//! The token and user are persisted through a [`SessionStore`] and always
//! written or cleared as a pair. On startup [`SessionGuard::bootstrap`]
//! restores a stored pair and validates the token once against the backend;
//! an invalid or partial pair is cleared without surfacing an error.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::{ApiClient, LoginResponse, TokenSource};
use crate::error::{ApiError, ApiResult, SessionError};
use crate::storage::SessionStore;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<&LoginResponse> for UserProfile {
    fn from(resp: &LoginResponse) -> Self {
        Self {
            id: resp.id,
            username: resp.username.clone(),
            email: resp.email.clone(),
            roles: resp.roles.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Bootstrap has not finished validating the stored session yet.
    Loading,
    /// Not signed in: go to the landing page, not straight to the login form.
    RedirectLanding,
    /// Signed in but missing every required role.
    RedirectDashboard,
}

/// What bootstrap found in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Restored,
    NoSession,
    ClearedPartial,
    ClearedInvalid,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// Auth endpoints the guard talks to. The bearer token for `validate_token`
/// comes from the client's token source, which is normally the guard itself.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn validate_token(&self) -> ApiResult<()>;
    async fn login(&self, username_or_email: &str, password: &str) -> ApiResult<LoginResponse>;
    async fn forgot_password(&self, email: &str) -> ApiResult<()>;
    async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> ApiResult<()>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn validate_token(&self) -> ApiResult<()> {
        ApiClient::validate_token(self).await
    }

    async fn login(&self, username_or_email: &str, password: &str) -> ApiResult<LoginResponse> {
        ApiClient::login(self, username_or_email, password).await
    }

    async fn forgot_password(&self, email: &str) -> ApiResult<()> {
        ApiClient::forgot_password(self, email).await
    }

    async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> ApiResult<()> {
        ApiClient::reset_password(self, email, otp, new_password).await
    }
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

struct SessionState {
    token: Option<Zeroizing<String>>,
    user: Option<UserProfile>,
    loading: bool,
}

pub struct SessionGuard {
    state: RwLock<SessionState>,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionGuard")
            .field("authenticated", &state.token.is_some())
            .field("user", &state.user.as_ref().map(|u| u.username.as_str()))
            .field("loading", &state.loading)
            .finish()
    }
}

impl SessionGuard {
    /// A guard in the loading state; call [`bootstrap`](Self::bootstrap) next.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            state: RwLock::new(SessionState {
                token: None,
                user: None,
                loading: true,
            }),
            store,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn token(&self) -> Option<Zeroizing<String>> {
        self.read().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// Restore a persisted session. Runs once at startup.
    pub async fn bootstrap(&self, api: &dyn AuthApi) -> BootstrapOutcome {
        let outcome = self.restore(api).await;
        self.write().loading = false;
        outcome
    }

    async fn restore(&self, api: &dyn AuthApi) -> BootstrapOutcome {
        let stored = match self.store.load() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "session store unreadable; starting signed out");
                return BootstrapOutcome::NoSession;
            }
        };

        let (token, user) = match (stored.token, stored.user) {
            (Some(token), Some(user)) if !token.trim().is_empty() => (token, user),
            (None, None) => return BootstrapOutcome::NoSession,
            _ => {
                info!("partial stored session discarded");
                self.clear_store();
                return BootstrapOutcome::ClearedPartial;
            }
        };

        // The token has to be visible to the client before validation.
        {
            let mut state = self.write();
            state.token = Some(token);
            state.user = Some(user);
        }

        match api.validate_token().await {
            Ok(()) => {
                info!(user = ?self.current_user().map(|u| u.username), "session restored");
                BootstrapOutcome::Restored
            }
            Err(e) => {
                info!(error = %e, "stored session rejected; signing out");
                self.forget();
                self.clear_store();
                BootstrapOutcome::ClearedInvalid
            }
        }
    }

    /// Adopt a freshly issued token. Persisted first so memory and storage
    /// never disagree.
    pub fn login(&self, user: UserProfile, token: &str) -> Result<(), SessionError> {
        self.store.save(token, &user)?;
        info!(user = %user.username, roles = ?user.roles, "signed in");
        let mut state = self.write();
        state.token = Some(Zeroizing::new(token.to_string()));
        state.user = Some(user);
        state.loading = false;
        Ok(())
    }

    /// Forget the session in memory, then in storage. Memory is cleared even
    /// when the store fails.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.forget();
        self.store.clear()?;
        info!("signed out");
        Ok(())
    }

    fn forget(&self) {
        let mut state = self.write();
        state.token = None;
        state.user = None;
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored session");
        }
    }

    /// Route check. An empty `required_roles` admits any signed-in user;
    /// otherwise one matching role is enough. Nothing is admitted while a
    /// restored token is still being validated.
    pub fn authorize(&self, required_roles: &[&str]) -> RouteDecision {
        let state = self.read();
        if state.loading {
            return RouteDecision::Loading;
        }
        if state.token.is_none() {
            return RouteDecision::RedirectLanding;
        }
        match &state.user {
            Some(user) if !required_roles.is_empty() => {
                if required_roles.iter().any(|r| user.has_role(r)) {
                    RouteDecision::Allow
                } else {
                    RouteDecision::RedirectDashboard
                }
            }
            _ => RouteDecision::Allow,
        }
    }

    /// Exchange credentials for a token and sign in.
    pub async fn sign_in(
        &self,
        api: &dyn AuthApi,
        username_or_email: &str,
        password: &str,
    ) -> Result<UserProfile, SessionError> {
        let resp = api
            .login(username_or_email.trim(), password)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized | ApiError::Validation(_) => SessionError::InvalidCredentials,
                other => SessionError::Api(other),
            })?;
        if resp.token.trim().is_empty() {
            return Err(ApiError::InvalidResponse("Login response carried no token".into()).into());
        }
        let user = UserProfile::from(&resp);
        self.login(user.clone(), &resp.token)?;
        Ok(user)
    }

    pub async fn request_password_reset(
        &self,
        api: &dyn AuthApi,
        email: &str,
    ) -> Result<(), SessionError> {
        api.forgot_password(email.trim()).await?;
        info!("password reset code requested");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        api: &dyn AuthApi,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        api.reset_password(email.trim(), otp.trim(), new_password)
            .await?;
        info!("password reset completed");
        Ok(())
    }
}

impl TokenSource for SessionGuard {
    fn bearer_token(&self) -> Option<String> {
        self.read().token.as_ref().map(|t| t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySessionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeAuth {
        valid: bool,
        validate_delay: Duration,
        validations: AtomicUsize,
        login_result: Mutex<Option<ApiResult<LoginResponse>>>,
    }

    impl FakeAuth {
        fn new(valid: bool) -> Self {
            Self {
                valid,
                validate_delay: Duration::ZERO,
                validations: AtomicUsize::new(0),
                login_result: Mutex::new(None),
            }
        }

        fn with_login(result: ApiResult<LoginResponse>) -> Self {
            let fake = Self::new(true);
            *fake.login_result.lock().unwrap() = Some(result);
            fake
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn validate_token(&self) -> ApiResult<()> {
            self.validations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.validate_delay).await;
            if self.valid {
                Ok(())
            } else {
                Err(ApiError::Unauthorized)
            }
        }

        async fn login(&self, _: &str, _: &str) -> ApiResult<LoginResponse> {
            self.login_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ApiError::Unauthorized))
        }

        async fn forgot_password(&self, email: &str) -> ApiResult<()> {
            if email.contains('@') {
                Ok(())
            } else {
                Err(ApiError::Validation("Email not found".into()))
            }
        }

        async fn reset_password(&self, _: &str, otp: &str, _: &str) -> ApiResult<()> {
            if otp == "123456" {
                Ok(())
            } else {
                Err(ApiError::Validation("Invalid OTP".into()))
            }
        }
    }

    fn admin() -> UserProfile {
        UserProfile {
            id: Some(1),
            username: "admin".into(),
            email: Some("admin@rishitha.com".into()),
            roles: vec!["ADMIN".into()],
        }
    }

    fn guard(store: MemorySessionStore) -> (Arc<MemorySessionStore>, SessionGuard) {
        let store = Arc::new(store);
        let guard = SessionGuard::new(store.clone());
        (store, guard)
    }

    #[tokio::test]
    async fn bootstrap_restores_a_valid_pair() {
        let (_, session) = guard(MemorySessionStore::with(Some("tok-1"), Some(admin())));
        assert!(session.is_loading());

        let api = FakeAuth::new(true);
        assert_eq!(session.bootstrap(&api).await, BootstrapOutcome::Restored);
        assert_eq!(api.validations.load(Ordering::SeqCst), 1);
        assert!(!session.is_loading());
        assert_eq!(session.bearer_token().as_deref(), Some("tok-1"));
        assert_eq!(session.current_user(), Some(admin()));
    }

    #[tokio::test]
    async fn bootstrap_clears_a_rejected_token_silently() {
        let (store, session) = guard(MemorySessionStore::with(Some("expired"), Some(admin())));
        let api = FakeAuth::new(false);

        assert_eq!(session.bootstrap(&api).await, BootstrapOutcome::ClearedInvalid);
        assert!(!session.is_authenticated());
        assert!(session.current_user().is_none());
        assert!(!session.is_loading());
        let stored = store.load().unwrap();
        assert!(stored.token.is_none() && stored.user.is_none());
    }

    #[tokio::test]
    async fn bootstrap_discards_partial_data_without_validating() {
        let (store, session) = guard(MemorySessionStore::with(Some("tok"), None));
        let api = FakeAuth::new(true);
        assert_eq!(session.bootstrap(&api).await, BootstrapOutcome::ClearedPartial);
        assert_eq!(api.validations.load(Ordering::SeqCst), 0);
        assert!(store.load().unwrap().token.is_none());

        let (_, empty) = guard(MemorySessionStore::default());
        assert_eq!(empty.bootstrap(&api).await, BootstrapOutcome::NoSession);
        assert!(!empty.is_loading());
    }

    #[test]
    fn login_and_logout_move_the_pair_together() {
        let (store, session) = guard(MemorySessionStore::default());
        session.login(admin(), "tok-2").unwrap();
        let stored = store.load().unwrap();
        assert_eq!(stored.token.as_deref().map(String::as_str), Some("tok-2"));
        assert_eq!(stored.user, Some(admin()));

        session.logout().unwrap();
        assert!(session.bearer_token().is_none());
        let stored = store.load().unwrap();
        assert!(stored.token.is_none() && stored.user.is_none());
    }

    #[tokio::test]
    async fn route_authorization() {
        let (_, session) = guard(MemorySessionStore::default());
        assert_eq!(session.authorize(&[]), RouteDecision::Loading);
        session.bootstrap(&FakeAuth::new(true)).await;
        assert_eq!(session.authorize(&[]), RouteDecision::RedirectLanding);

        let mut waiter = admin();
        waiter.roles = vec!["WAITER".into()];
        session.login(waiter, "tok").unwrap();
        assert_eq!(session.authorize(&[]), RouteDecision::Allow);
        assert_eq!(session.authorize(&["WAITER", "CHEF"]), RouteDecision::Allow);
        assert_eq!(session.authorize(&["ADMIN"]), RouteDecision::RedirectDashboard);
        // Exact match only.
        assert_eq!(session.authorize(&["waiter"]), RouteDecision::RedirectDashboard);
    }

    #[tokio::test]
    async fn routes_wait_while_the_stored_token_is_validated() {
        let (_, session) = guard(MemorySessionStore::with(Some("expired"), Some(admin())));
        let api = FakeAuth {
            validate_delay: Duration::from_millis(100),
            ..FakeAuth::new(false)
        };

        let (outcome, during) = tokio::join!(session.bootstrap(&api), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.authorize(&["ADMIN"])
        });
        assert_eq!(during, RouteDecision::Loading);
        assert_eq!(outcome, BootstrapOutcome::ClearedInvalid);
        assert_eq!(session.authorize(&["ADMIN"]), RouteDecision::RedirectLanding);
    }

    #[tokio::test]
    async fn sign_in_maps_rejections_to_invalid_credentials() {
        let (_, session) = guard(MemorySessionStore::default());

        let api = FakeAuth::with_login(Err(ApiError::Unauthorized));
        let err = session.sign_in(&api, "admin", "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));

        let api = FakeAuth::with_login(Err(ApiError::Validation("Bad credentials".into())));
        let err = session.sign_in(&api, "admin", "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));

        let api = FakeAuth::with_login(Err(ApiError::Http("Cannot connect".into())));
        let err = session.sign_in(&api, "admin", "pw").await.unwrap_err();
        assert!(matches!(err, SessionError::Api(ApiError::Http(_))));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn sign_in_persists_the_issued_token() {
        let (store, session) = guard(MemorySessionStore::default());
        let resp: LoginResponse = serde_json::from_str(
            r#"{"accessToken":"jwt-abc","id":1,"username":"admin","email":"admin@rishitha.com","roles":["ADMIN"]}"#,
        )
        .unwrap();
        let api = FakeAuth::with_login(Ok(resp));

        let user = session.sign_in(&api, " admin ", "secret").await.unwrap();
        assert_eq!(user, admin());
        assert_eq!(session.bearer_token().as_deref(), Some("jwt-abc"));
        assert_eq!(store.load().unwrap().user, Some(admin()));
    }

    #[tokio::test]
    async fn password_reset_passes_backend_errors_through() {
        let (_, session) = guard(MemorySessionStore::default());
        let api = FakeAuth::new(true);
        session.request_password_reset(&api, "admin@rishitha.com").await.unwrap();
        session
            .reset_password(&api, "admin@rishitha.com", "123456", "n3w")
            .await
            .unwrap();
        let err = session
            .reset_password(&api, "admin@rishitha.com", "000000", "n3w")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid OTP");
    }
}
