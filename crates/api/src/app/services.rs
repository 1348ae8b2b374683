use std::sync::Arc;

use contacthub_auth::{GuardChain, IdentityAdmin};
use contacthub_infra::identity::{GoTrueAdmin, InMemoryIdentityProvider};
use contacthub_infra::store::{
    ContactStore, InMemoryStore, PostgresStore, ProfileStore, StoreError, StoreProfileLookup,
};
use contacthub_infra::{ContactService, OperationExecutor, RetryPolicy};

use crate::config::AppConfig;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub identity: Arc<dyn IdentityAdmin>,
    pub contact_store: Arc<dyn ContactStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub contacts: ContactService,
    pub executor: Arc<OperationExecutor>,
    pub guards: GuardChain,
    /// Retry policy for the store calls made by the admin endpoints.
    pub admin_retry: RetryPolicy,
}

impl AppServices {
    pub fn new(
        identity: Arc<dyn IdentityAdmin>,
        contact_store: Arc<dyn ContactStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let executor = Arc::new(OperationExecutor::default());
        Self {
            contacts: ContactService::new(Arc::clone(&contact_store), Arc::clone(&executor)),
            identity,
            contact_store,
            profiles,
            executor,
            guards: GuardChain::standard(),
            admin_retry: RetryPolicy::default(),
        }
    }

    /// In-memory provider and store sharing one backing `InMemoryStore`.
    pub fn in_memory(identity: Arc<InMemoryIdentityProvider>, store: Arc<InMemoryStore>) -> Self {
        Self::new(identity, store.clone(), store)
    }

    pub fn with_guards(mut self, guards: GuardChain) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_admin_retry(mut self, retry: RetryPolicy) -> Self {
        self.admin_retry = retry;
        self
    }

    pub fn profile_lookup(&self) -> Arc<StoreProfileLookup> {
        Arc::new(StoreProfileLookup::new(Arc::clone(&self.profiles)))
    }
}

/// Wire services from configuration: hosted provider and Postgres when
/// configured, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let identity: Arc<dyn IdentityAdmin> = match &config.provider {
        Some(provider) => {
            tracing::info!(url = %provider.url, "using hosted identity provider");
            Arc::new(GoTrueAdmin::new(provider.clone()))
        }
        None => {
            tracing::warn!("no identity provider configured; using in-memory provider");
            Arc::new(InMemoryIdentityProvider::new(config.jwt_secret.as_bytes()))
        }
    };

    let services = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PostgresStore::connect(url).await?);
            tracing::info!("connected to postgres");
            AppServices::new(identity, store.clone(), store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            let store = Arc::new(InMemoryStore::new());
            AppServices::new(identity, store.clone(), store)
        }
    };

    let guards = GuardChain::standard().with_sensitive_prefixes(config.sensitive_prefixes.clone());
    Ok(services.with_guards(guards))
}
