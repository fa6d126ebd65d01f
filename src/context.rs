// Application context: every shared component, wired once from Config
//
// Gateway and Coordinator both hold the same SessionState; the stores hold
// clones of the Gateway. Nothing here is global: tests build their own.

use crate::api::{Endpoints, Gateway, ReqwestTransport, Transport};
use crate::channel::{ChannelConfig, LiveChannel};
use crate::config::Config;
use crate::events::EventBus;
use crate::list_view::ListOptions;
use crate::models::{Queue, Service};
use crate::resources::{Pagination, Resource, ResourceStore};
use crate::session::{Coordinator, FileStore, KeyValueStore, SessionState};
use std::sync::Arc;

pub struct AppContext {
    pub config: Config,
    pub events: EventBus,
    pub gateway: Gateway,
    pub session: Coordinator,
    pub queues: Arc<ResourceStore<Queue>>,
    pub services: Arc<ResourceStore<Service>>,
}

impl AppContext {
    /// Build against the real backend with file-backed credential storage
    pub fn new(config: Config) -> Self {
        let persistent: Arc<dyn KeyValueStore> = Arc::new(FileStore::in_dir(
            "persistent",
            &config.session.persistent_dir,
        ));
        let scoped: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::in_dir("session", &config.session.session_dir));

        Self::with_parts(config, Arc::new(ReqwestTransport::new()), persistent, scoped)
    }

    /// Build from explicit parts, then restore any stored credential
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        persistent: Arc<dyn KeyValueStore>,
        scoped: Arc<dyn KeyValueStore>,
    ) -> Self {
        let events = EventBus::new();
        let state = Arc::new(SessionState::new(persistent, scoped));
        let gateway = Gateway::new(
            transport,
            Endpoints::new(config.api_base_url.as_str()),
            state,
            events.clone(),
        );

        let session =
            Coordinator::new(gateway.clone()).with_login_scope(config.session.login_scope.as_str());
        if session.restore_from_storage() {
            tracing::debug!("Restored stored session");
        }

        Self {
            queues: Arc::new(ResourceStore::new(gateway.clone())),
            services: Arc::new(ResourceStore::new(gateway.clone())),
            config,
            events,
            gateway,
            session,
        }
    }

    /// List options for resource `R` using the configured page size
    pub fn list_options<R: Resource>(&self) -> ListOptions<R> {
        ListOptions {
            pagination: Pagination {
                per_page: self.config.list.per_page,
                ..Pagination::default()
            },
            ..ListOptions::default()
        }
    }

    /// Open the live notification channel with the configured reconnect policy
    pub fn connect_channel(&self) -> LiveChannel {
        LiveChannel::connect(
            ChannelConfig::new(self.config.ws_url.as_str()).with_policy(self.config.channel.policy()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeTransport;
    use crate::session::storage::{ACCESS_TOKEN_KEY, USER_KEY};
    use crate::session::MemoryStore;
    use serde_json::json;

    fn context(transport: Arc<FakeTransport>, persistent: MemoryStore) -> AppContext {
        let config = Config {
            api_base_url: "http://api.test".to_string(),
            ..Config::default()
        };
        AppContext::with_parts(
            config,
            transport,
            Arc::new(persistent),
            Arc::new(MemoryStore::new("session")),
        )
    }

    #[test]
    fn test_boot_restores_remembered_session() {
        let persistent = MemoryStore::new("persistent");
        persistent.set(ACCESS_TOKEN_KEY, "tok").unwrap();
        persistent
            .set(USER_KEY, r#"{"id":1,"email":"desk@example.com"}"#)
            .unwrap();

        let ctx = context(FakeTransport::new(), persistent);

        assert!(ctx.session.is_authenticated());
        assert_eq!(ctx.session.current_user().unwrap().email, "desk@example.com");
    }

    #[tokio::test]
    async fn test_stores_share_the_session() {
        let transport = FakeTransport::new();
        let persistent = MemoryStore::new("persistent");
        persistent.set(ACCESS_TOKEN_KEY, "tok").unwrap();
        let ctx = context(transport.clone(), persistent);
        let mut events = ctx.events.subscribe();

        transport.push(401, json!({"detail": "expired"}));
        let err = ctx
            .queues
            .get_all(&Default::default(), &Default::default(), &Pagination::default())
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(!ctx.session.is_authenticated());
        assert!(events.try_recv().unwrap().is_unauthorized());

        // The services store sees the cleared credential too
        transport.push(200, json!([]));
        ctx.services
            .get_all(&Default::default(), &Default::default(), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(transport.last().header_value("Authorization"), None);
    }

    #[test]
    fn test_list_options_use_configured_page_size() {
        let mut ctx = context(FakeTransport::new(), MemoryStore::new("persistent"));
        ctx.config.list.per_page = 25;

        let options = ctx.list_options::<Queue>();

        assert_eq!(options.pagination.per_page, 25);
        assert_eq!(options.pagination.page, 1);
        assert!(!options.lazy);
    }
}
