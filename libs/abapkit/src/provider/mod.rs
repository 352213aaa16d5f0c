//! Provider of the services mounted on one backend connection.

mod abap;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ProviderConfig;
use crate::connection::{AuthInterceptor, Connection};
use crate::error::AbapError;
use crate::odata::{ODataService, mount_path};

pub use abap::{AbapServiceProvider, BtpOptions, ReentranceOptions};

/// A typed service wrapping the [`ODataService`] at its mount path.
pub trait AbapService: Send + Sync + 'static {
    fn from_odata(odata: Arc<ODataService>) -> Self;

    fn odata(&self) -> &Arc<ODataService>;
}

/// Result of probing for something that may legitimately not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

struct Typed {
    type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

struct Registered {
    odata: Arc<ODataService>,
    typed: Option<Typed>,
}

/// Hands out one service instance per mount path.
///
/// All services share the provider's connection, so cookies, the CSRF
/// token and the session check apply across them.
pub struct ServiceProvider {
    conn: Arc<Connection>,
    services: Mutex<HashMap<String, Registered>>,
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("conn", &self.conn)
            .field("services", &self.services.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceProvider {
    /// Provider for `config`, with basic auth if it carries credentials.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::InvalidArgument` for an unusable base URL and
    /// `AbapError::Http` if the HTTP client cannot be built.
    pub fn create(config: &ProviderConfig) -> Result<Self, AbapError> {
        Self::with_auth(config, AuthInterceptor::None)
    }

    pub(crate) fn with_auth(
        config: &ProviderConfig,
        auth: AuthInterceptor,
    ) -> Result<Self, AbapError> {
        let config = config.clone();
        Ok(Self {
            conn: Arc::new(Connection::open(&config, auth)?),
            services: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// The service mounted at `path`, created on first use.
    #[must_use]
    pub fn service(&self, path: &str) -> Arc<ODataService> {
        let key = mount_path(path);
        let mut services = self.services.lock();
        let entry = services
            .entry(key)
            .or_insert_with_key(|key| self.register(key));
        Arc::clone(&entry.odata)
    }

    /// The `T` mounted at `path`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns `AbapError::ServiceTypeMismatch` if `path` already hosts a
    /// different service type.
    pub fn create_service<T: AbapService>(&self, path: &str) -> Result<Arc<T>, AbapError> {
        let key = mount_path(path);
        let mut services = self.services.lock();
        let entry = services
            .entry(key.clone())
            .or_insert_with_key(|key| self.register(key));

        if let Some(typed) = &entry.typed {
            return Arc::clone(&typed.instance)
                .downcast::<T>()
                .map_err(|_| AbapError::ServiceTypeMismatch {
                    path: key,
                    registered: typed.type_name,
                });
        }

        let instance = Arc::new(T::from_odata(Arc::clone(&entry.odata)));
        entry.typed = Some(Typed {
            type_name: std::any::type_name::<T>(),
            instance: Arc::clone(&instance) as Arc<dyn Any + Send + Sync>,
        });
        tracing::debug!(path = %key, service = std::any::type_name::<T>(), "registered service");
        Ok(instance)
    }

    fn register(&self, key: &str) -> Registered {
        Registered {
            odata: Arc::new(ODataService::new(Arc::clone(&self.conn), key)),
            typed: None,
        }
    }
}
