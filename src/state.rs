use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clients::replicate::ReplicateClient;
use crate::clients::webui::WebUiClient;
use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, CaptionService, GenerationService, SeaOrmAuthService};

/// One HTTP client for all outbound calls; reqwest pools connections per
/// host internally.
fn build_shared_http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("easel/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(10)
        .build()?)
}

/// Long-lived handles shared by the API layer and background tasks.
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,
    pub store: Store,
    pub auth_service: Arc<dyn AuthService>,
    pub generation_service: Arc<GenerationService>,
    pub caption_service: Arc<CaptionService>,
}

impl SharedState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let timeout = config
            .webui
            .request_timeout_seconds
            .max(config.replicate.request_timeout_seconds);
        let http_client = build_shared_http_client(timeout)?;

        let webui = Arc::new(WebUiClient::new(http_client.clone(), &config.webui.url));

        let replicate = (!config.replicate.api_token.is_empty()).then(|| {
            Arc::new(ReplicateClient::new(
                http_client,
                &config.replicate.api_base,
                &config.replicate.api_token,
            ))
        });

        let config = Arc::new(RwLock::new(config));

        let auth_service: Arc<dyn AuthService> =
            Arc::new(SeaOrmAuthService::new(store.clone(), config.clone()));

        let generation_service = Arc::new(GenerationService::new(
            config.clone(),
            webui,
            replicate.clone(),
            store.clone(),
        ));

        let caption_service = Arc::new(CaptionService::new(config.clone(), replicate));

        Ok(Self {
            config,
            store,
            auth_service,
            generation_service,
            caption_service,
        })
    }
}
