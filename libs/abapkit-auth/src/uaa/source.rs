use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use abapkit_utils::SecretString;

use super::Uaa;
use crate::error::AuthError;
use crate::layer::TokenSource;

/// Tokens are renewed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Cached {
    access_token: Option<SecretString>,
    expires_at: Option<Instant>,
    refresh_token: Option<SecretString>,
}

impl Cached {
    fn valid_token(&self, now: Instant) -> Option<SecretString> {
        let token = self.access_token.as_ref()?;
        match self.expires_at {
            Some(at) if at <= now + EXPIRY_MARGIN => None,
            _ => Some(token.clone()),
        }
    }
}

/// [`TokenSource`] backed by a [`Uaa`] client.
///
/// The first call logs in (or redeems the stored refresh token); later calls
/// reuse the access token until it is about to expire. Concurrent callers
/// wait for a single login.
pub struct UaaTokenSource {
    uaa: Arc<Uaa>,
    state: Mutex<Cached>,
}

impl UaaTokenSource {
    #[must_use]
    pub fn new(uaa: Uaa, refresh_token: Option<SecretString>) -> Self {
        Self {
            uaa: Arc::new(uaa),
            state: Mutex::new(Cached {
                refresh_token,
                ..Cached::default()
            }),
        }
    }
}

impl std::fmt::Debug for UaaTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UaaTokenSource")
            .field("uaa", &self.uaa)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for UaaTokenSource {
    async fn token(&self) -> Result<SecretString, AuthError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.valid_token(Instant::now()) {
            return Ok(token);
        }

        let grant = self
            .uaa
            .get_access_token(state.refresh_token.as_ref())
            .await?;

        state.expires_at = grant.expires_in.map(|d| Instant::now() + d);
        if grant.refresh_token.is_some() {
            state.refresh_token.clone_from(&grant.refresh_token);
        }
        state.access_token = Some(grant.access_token.clone());
        Ok(grant.access_token)
    }
}
