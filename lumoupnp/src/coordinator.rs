//! Coordinateur de cycle de vie du device.
//!
//! [`UpnpHost::start`] assemble tout dans l'ordre : registre d'actions,
//! descripteur mis en cache, listener HTTP, puis une session d'annonce SSDP
//! par interface éligible. Tout échec avant le retour de `start` est fatal.
//! [`UpnpHost::close`] diffuse le signal d'arrêt et ne rend la main qu'une
//! fois toutes les boucles d'annonce terminées.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};

use crate::allowlist::parse_allowed_ips;
use crate::descriptor::{DescriptorError, build_root_descriptor};
use crate::device::{DeviceDefinition, DeviceError};
use crate::eventing::EventingManager;
use crate::host::{HostOptions, HostState, build_router};
use crate::router::ActionRouter;
use crate::ssdp::{Announcer, AnnouncerConfig};
use crate::SERVER_FIELD;

/// Configuration du host UPnP.
///
/// Reflète la surface de configuration externe (fichier YAML + variables
/// d'environnement via `lumoconfig`).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Port HTTP (0 = port éphémère, utile en test)
    pub http_port: u16,

    /// Filtre optionnel sur le nom d'interface SSDP
    pub interface: Option<String>,

    /// Miroir des requêtes HTTP vers le flux de diagnostic
    pub log_headers: bool,

    /// IPs/CIDRs clients admis, séparés par des virgules (vide = tout)
    pub allowed_ips: String,

    /// Retarde les réponses SUBSCRIBE jusqu'à l'abandon du client
    pub stall_event_subscribe: bool,

    /// Intervalle entre deux salves d'annonces SSDP
    pub notify_interval: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            http_port: 1338,
            interface: None,
            log_headers: false,
            allowed_ips: String::new(),
            stall_event_subscribe: false,
            notify_interval: Duration::from_secs(180),
        }
    }
}

impl HostConfig {
    /// Construit la configuration depuis le singleton `lumoconfig`.
    pub fn from_config() -> Self {
        let config = lumoconfig::get_config();
        Self {
            http_port: config.get_http_port(),
            interface: config.get_interface_name(),
            log_headers: config.get_log_headers(),
            allowed_ips: config.get_allowed_ips(),
            stall_event_subscribe: config.get_stall_event_subscribe(),
            notify_interval: Duration::from_secs(config.get_notify_interval_secs()),
        }
    }
}

/// Erreurs fatales au démarrage du host.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to bind HTTP listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Host UPnP en cours d'exécution.
pub struct UpnpHost {
    definition: Arc<DeviceDefinition>,
    eventing: Arc<EventingManager>,
    local_addr: SocketAddr,
    http_task: tokio::task::JoinHandle<()>,
    announcer: Option<Announcer>,
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
}

impl UpnpHost {
    /// Démarre le host : listener HTTP puis annonceurs SSDP.
    ///
    /// Au retour, le système est "running" : le descripteur est en cache,
    /// le listener accepte des connexions et chaque session d'annonce a
    /// émis sa première salve alive.
    pub async fn start(
        definition: DeviceDefinition,
        eventing: Arc<EventingManager>,
        config: HostConfig,
    ) -> Result<Self, HostError> {
        let definition = Arc::new(definition);

        // Registre et descripteur : toute erreur ici est fatale.
        let router = Arc::new(ActionRouter::from_definition(&definition)?);
        let root_desc = Arc::new(build_root_descriptor(&definition)?);

        let options = Arc::new(HostOptions {
            server_field: SERVER_FIELD.to_string(),
            log_headers: config.log_headers,
            stall_event_subscribe: config.stall_event_subscribe,
            allowed_nets: parse_allowed_ips(&config.allowed_ips),
        });

        let state = HostState {
            definition: Arc::clone(&definition),
            root_desc,
            router,
            eventing: Arc::clone(&eventing),
            options,
        };
        let app = build_router(state)?;

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
        let local_addr = listener.local_addr()?;
        info!("✅ UPnP control plane listening on {}", local_addr);

        let http_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                error!("HTTP server error: {}", e);
            }
        });

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded();
        let announcer_config = AnnouncerConfig {
            http_port: local_addr.port(),
            server_field: SERVER_FIELD.to_string(),
            notify_interval: config.notify_interval,
            interface: config.interface.clone(),
        };
        let announcer = Announcer::spawn(&definition, &announcer_config, shutdown_rx);
        info!(
            "📡 SSDP announcing {} on {} interface(s)",
            definition.friendly_name(),
            announcer.session_count()
        );

        Ok(Self {
            definition,
            eventing,
            local_addr,
            http_task,
            announcer: Some(announcer),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Adresse effective du listener HTTP.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Définition du device hébergé.
    pub fn definition(&self) -> Arc<DeviceDefinition> {
        Arc::clone(&self.definition)
    }

    /// Gestionnaire d'événements du host.
    pub fn eventing(&self) -> Arc<EventingManager> {
        Arc::clone(&self.eventing)
    }

    /// Arrêt gracieux.
    ///
    /// Diffuse le signal d'arrêt aux annonceurs (qui émettent leurs byebye),
    /// ferme le listener HTTP, puis bloque jusqu'à la sortie de toutes les
    /// boucles d'interface.
    pub async fn close(&mut self) {
        drop(self.shutdown_tx.take());
        self.http_task.abort();

        if let Some(announcer) = self.announcer.take() {
            let joined = tokio::task::spawn_blocking(move || announcer.join()).await;
            if joined.is_err() {
                error!("Failed to join SSDP announcer threads");
            }
        }
        info!("✅ UPnP host closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_production_defaults() {
        let config = HostConfig::default();
        assert_eq!(config.http_port, 1338);
        assert_eq!(config.notify_interval, Duration::from_secs(180));
        assert!(!config.stall_event_subscribe);
        assert!(config.allowed_ips.is_empty());
    }
}
