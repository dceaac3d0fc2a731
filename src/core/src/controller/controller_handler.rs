use std::fs;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::configuration::{Config, ProviderKind};
use crate::data_capture::{BroadcastPublisher, CaptureProvider, ReplayProvider};
use crate::error_handling::types::*;
use crate::session_management::SessionRegistry;
use crate::storage::{DurableSink, FileObjectStore, ObjectStore};
use crate::web_interface::{WebContext, WebServer};

/// Time each live session gets to finalize when the service shuts down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Wires configuration, storage, publisher, capture provider and session
/// registry together and owns the web server's lifetime.
pub struct Controller {
    pub config: Config,
    registry: Arc<SessionRegistry>,
    context: Arc<WebContext>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config
            .validate()
            .map_err(ControllerError::ConfigurationError)?;

        fs::create_dir_all(&config.staging_dir).map_err(|e| {
            ControllerError::InitializationFailed(format!(
                "unable to create staging dir {}: {}",
                config.staging_dir.display(),
                e
            ))
        })?;

        let store: Arc<dyn ObjectStore> = Arc::new(
            FileObjectStore::new(&config.store_dir).map_err(ControllerError::StorageError)?,
        );
        let sink = Arc::new(DurableSink::new(
            &config.staging_dir,
            &config.key_prefix,
            store.clone(),
        ));
        let publisher = Arc::new(BroadcastPublisher::new(config.publish_capacity));
        let provider = build_provider(&config)?;

        let registry = Arc::new(SessionRegistry::new(
            provider,
            publisher.clone(),
            sink,
            config.packet_limit,
        ));
        let context = Arc::new(WebContext {
            registry: registry.clone(),
            publisher,
            store,
            key_prefix: config.key_prefix.clone(),
            default_interface: config.interface.clone(),
        });

        info!(
            "Controller ready: provider={:?}, staging={}, store={}",
            config.provider,
            config.staging_dir.display(),
            config.store_dir.display()
        );
        Ok(Self {
            config,
            registry,
            context,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serves the web interface until it fails or the process is interrupted,
    /// then shuts every live session down.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        let server = WebServer::new(self.context.clone());

        let served = tokio::select! {
            res = server.start(&self.config.bind_address, self.config.web_port) => res,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                Ok(())
            }
        };

        self.shutdown().await;
        served.map_err(|e| {
            error!("Web server stopped: {}", e);
            ControllerError::WebError(e)
        })
    }

    pub async fn shutdown(&self) {
        for snapshot in self.registry.shutdown_all(SHUTDOWN_GRACE).await {
            match &snapshot.finalize {
                Some(outcome) if outcome.is_failure() => {
                    warn!("[{}] Finished with {:?}", snapshot.id, outcome)
                }
                _ => info!(
                    "[{}] Finished as {:?} after {} packet(s)",
                    snapshot.id, snapshot.status, snapshot.count
                ),
            }
        }
        self.registry.reap();
    }
}

fn build_provider(config: &Config) -> Result<Arc<dyn CaptureProvider>, ControllerError> {
    match config.provider {
        ProviderKind::Replay => Ok(Arc::new(ReplayProvider::new(config.replay_pace))),
        #[cfg(feature = "pcap")]
        ProviderKind::Pcap => Ok(Arc::new(crate::data_capture::PcapProvider::new(true))),
        #[cfg(not(feature = "pcap"))]
        ProviderKind::Pcap => Err(ControllerError::CaptureError(CaptureError::ProviderOpen(
            "built without the `pcap` feature".into(),
        ))),
    }
}
