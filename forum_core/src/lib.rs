pub mod entity;
pub mod ids;
pub mod models;

use std::{sync::Arc, time::Duration};

use iroh::Endpoint;
use zel_core::{prelude::RpcServerBuilder, protocol::RpcClient, IrohBundle};

use crate::{
    restructure::{collaborators::PermissionAuthority, Restructurer},
    service::moderation::{ModerationClient, ModerationServer, ModerationService},
};

pub mod restructure;

pub mod service;

pub mod error;

pub mod config;

#[cfg(test)]
mod test_utils;

static ALPN: &[u8] = b"forum::0.1.0";

/// Main runtime handle for the forum node.
pub struct ForumCore {
    pub config: config::ForumConfig,

    /// Engine behind the moderation service, for in-process callers.
    pub restructurer: Restructurer,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    /// Client-side endpoint used by local tools to reach the server.
    pub client_endpoint: Endpoint,

    /// Typed clients for the local server.
    pub moderation: ModerationClient,
}

impl ForumCore {
    /// `permissions` decides who may split, merge, move, remove and toggle.
    pub async fn start(
        permissions: Arc<dyn PermissionAuthority>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::get_or_init().await?;
        tracing::info!(database = %config.database_path.display(), "starting forum core");
        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone())).await?;
        let server_endpoint = server_builder.endpoint().clone();

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let restructurer = Restructurer::new(db, config.restructure.clone(), permissions);
        let moderation_service = ModerationService::new(restructurer.clone());

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());

        let rpc_server_builder = moderation_service.register_service(rpc_server_builder);

        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;

        server.wait_online().await;

        // ----------------
        // Client endpoint
        // ----------------
        let client_endpoint = Endpoint::builder()
            .secret_key(config.client_secret_key.clone())
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await?;

        client_endpoint.online().await;

        // Connect client endpoint -> server endpoint
        let conn = client_endpoint
            .connect(server.endpoint.addr(), ALPN)
            .await?;

        let rpc = RpcClient::new(conn).await?;
        let moderation = ModerationClient::new(rpc);

        tracing::info!("forum core online");

        Ok(Self {
            config,
            restructurer,
            server,
            client_endpoint,
            moderation,
        })
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        // Close client endpoint
        self.client_endpoint.close().await;

        // Shutdown server bundle
        self.server.shutdown(Duration::from_secs(5)).await?;
        tracing::info!("forum core stopped");
        Ok(())
    }
}

pub mod prelude {
    pub use super::ids;
    pub use super::entity;
    pub use super::models;

    pub use super::restructure;
    pub use super::service;

    pub use super::error;

    pub use super::config;

    pub use zel_core;
}
