use std::sync::Arc;

use anyhow::Context;
use sea_orm::DatabaseConnection;

use crate::{
    config::Config,
    entity_impl::haiku_like::LikeStore,
    pinata::{Pinata, PinningService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pinning: Arc<dyn PinningService>,
    pub likes: Arc<dyn LikeStore>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseConnection) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.debug)
            .build()
            .context("failed to build HTTP client")?;
        let pinata = Pinata::new(http_client, &config).context("failed to build Pinata client")?;
        Ok(AppState {
            config: Arc::new(config),
            pinning: Arc::new(pinata),
            likes: Arc::new(db),
        })
    }
}
