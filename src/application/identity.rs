use crate::domain::models::AuthSession;
use crate::domain::time_window::NowProvider;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::SessionStore;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

const SESSION_LEEWAY_SECONDS: i64 = 60;

/// Who is signed in. `user_id` is the owner key for every store record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl From<AuthSession> for Identity {
    fn from(session: AuthSession) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email,
            display_name: session.display_name,
        }
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Result<Option<Identity>, InfraError>;

    fn is_signed_in(&self) -> Result<bool, InfraError> {
        Ok(self.current_identity()?.is_some())
    }
}

pub struct SessionIdentityProvider<S>
where
    S: SessionStore + ?Sized,
{
    session_store: Arc<S>,
    now_provider: NowProvider,
}

impl<S> SessionIdentityProvider<S>
where
    S: SessionStore + ?Sized,
{
    pub fn new(session_store: Arc<S>) -> Self {
        Self {
            session_store,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn sign_in(
        &self,
        user_id: &str,
        email: Option<String>,
        display_name: Option<String>,
        valid_for: Duration,
    ) -> Result<Identity, InfraError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(InfraError::Validation("user id must not be empty".to_string()));
        }
        if valid_for <= Duration::zero() {
            return Err(InfraError::Validation("session lifetime must be positive".to_string()));
        }

        let session = AuthSession {
            user_id: user_id.to_string(),
            email: email.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()),
            display_name: display_name
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            expires_at: (self.now_provider)() + valid_for,
        };
        self.session_store.save_session(&session)?;
        tracing::info!(user_id = %session.user_id, "signed in");
        Ok(Identity::from(session))
    }

    pub fn sign_out(&self) -> Result<(), InfraError> {
        self.session_store.delete_session()?;
        tracing::info!("signed out");
        Ok(())
    }
}

impl<S> IdentityProvider for SessionIdentityProvider<S>
where
    S: SessionStore + ?Sized,
{
    fn current_identity(&self) -> Result<Option<Identity>, InfraError> {
        let Some(session) = self.session_store.load_session()? else {
            return Ok(None);
        };
        if !session.is_valid_at((self.now_provider)(), SESSION_LEEWAY_SECONDS) {
            return Ok(None);
        }
        Ok(Some(Identity::from(session)))
    }
}
