//! Per-user sessions: opaque bearer tokens mapped to studios, the
//! busy-rejection rule for overlapping operations, and the deferred
//! auto-clear timer lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;
use tokio::task::AbortHandle;

use crate::assets::digest_hex;
use crate::backend::GenerationBackend;
use crate::config::SharedAdminConfig;
use crate::error::StudioError;
use crate::payments::PaymentVerifier;
use crate::studio::{AutoClear, Studio};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("passwords do not match")]
    PasswordMismatch,
}

pub struct Session {
    token: String,
    email: String,
    studio: Arc<AsyncMutex<Studio>>,
    /// At most one pending auto-clear timer; arming a new one aborts the
    /// previous, and session teardown aborts whatever is left.
    auto_clear: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn studio(&self) -> Arc<AsyncMutex<Studio>> {
        self.studio.clone()
    }

    /// Claim the studio for one operation. A second claim while an
    /// operation is in flight is refused, not queued.
    pub fn try_studio(&self) -> Result<OwnedMutexGuard<Studio>, StudioError> {
        self.studio
            .clone()
            .try_lock_owned()
            .map_err(|_| StudioError::Busy)
    }

    pub fn arm_auto_clear(&self, directive: AutoClear) {
        let mut slot = lock(&self.auto_clear);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let weak: Weak<AsyncMutex<Studio>> = Arc::downgrade(&self.studio);
        let task = tokio::spawn(async move {
            tokio::time::sleep(directive.after).await;
            if let Some(studio) = weak.upgrade() {
                studio.lock().await.clear_generated(directive.epoch);
            }
        });
        *slot = Some(task.abort_handle());
        tracing::debug!(after_secs = directive.after.as_secs(), "auto-clear timer armed");
    }

    pub fn cancel_auto_clear(&self) {
        if let Some(handle) = lock(&self.auto_clear).take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_auto_clear();
    }
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    backend: Arc<dyn GenerationBackend>,
    verifier: Arc<dyn PaymentVerifier>,
    admin: SharedAdminConfig,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        verifier: Arc<dyn PaymentVerifier>,
        admin: SharedAdminConfig,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            backend,
            verifier,
            admin,
        }
    }

    pub fn admin(&self) -> &SharedAdminConfig {
        &self.admin
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Arc<Session>, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(self.open_session(email))
    }

    pub fn signup(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Arc<Session>, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        Ok(self.open_session(email))
    }

    pub fn get(&self, token: &str) -> Option<Arc<Session>> {
        lock(&self.sessions).get(token).cloned()
    }

    /// Tear a session down; any pending auto-clear timer dies with it.
    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        let session = lock(&self.sessions).remove(token);
        if let Some(session) = &session {
            session.cancel_auto_clear();
        }
        session
    }

    fn open_session(&self, email: &str) -> Arc<Session> {
        let mut studio = Studio::new(
            self.backend.clone(),
            self.verifier.clone(),
            self.admin.clone(),
        );
        studio.login(email);

        static SESSION_SERIAL: AtomicU64 = AtomicU64::new(0);
        let serial = SESSION_SERIAL.fetch_add(1, Ordering::Relaxed);
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let token = digest_hex(&format!("session:{email}:{nanos}:{serial}"));
        let session = Arc::new(Session {
            token: token.clone(),
            email: email.to_string(),
            studio: Arc::new(AsyncMutex::new(studio)),
            auto_clear: Mutex::new(None),
        });
        lock(&self.sessions).insert(token, session.clone());
        session
    }
}
