//! Server-side agent sessions keyed by opaque token.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::Actor;
use super::repository::RepositoryError;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

// Tokens are bearer credentials; keep them out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    pub token: SessionToken,
    pub agent_email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AgentSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn actor(&self) -> Actor {
        Actor::Agent(self.agent_email.clone())
    }
}

pub trait SessionStore: Send + Sync {
    fn insert(&self, session: AgentSession) -> Result<(), RepositoryError>;
    fn fetch(&self, token: &SessionToken) -> Result<Option<AgentSession>, RepositoryError>;
    fn revoke(&self, token: &SessionToken) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("an agent email is required to open a session")]
    MissingAgentEmail,
    #[error("session token is not recognised")]
    Unknown,
    #[error("session expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Issues and validates sessions against a [`SessionStore`]. Holds no session state itself.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn open(&self, agent_email: &str, now: DateTime<Utc>) -> Result<AgentSession, SessionError> {
        let agent_email = agent_email.trim();
        if agent_email.is_empty() {
            return Err(SessionError::MissingAgentEmail);
        }

        let session = AgentSession {
            token: SessionToken::generate(),
            agent_email: agent_email.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.store.insert(session.clone())?;
        Ok(session)
    }

    /// Look up a token for the current request. Expired sessions are revoked on sight.
    pub fn validate(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<AgentSession, SessionError> {
        let session = self.store.fetch(token)?.ok_or(SessionError::Unknown)?;
        if session.is_expired(now) {
            self.store.revoke(token)?;
            return Err(SessionError::Expired {
                expired_at: session.expires_at,
            });
        }
        Ok(session)
    }

    pub fn revoke(&self, token: &SessionToken) -> Result<(), SessionError> {
        self.store.revoke(token)?;
        Ok(())
    }
}
