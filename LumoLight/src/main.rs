//! LumoLight : device UPnP BinaryLight de démonstration.
//!
//! Assemble la configuration, le gestionnaire d'événements et le host UPnP,
//! puis attend un signal d'interruption pour s'arrêter proprement (byebye
//! SSDP inclus).

mod light;
mod switch_power;
mod switch_power_desc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lumoconfig::get_config;
use lumoupnp::{EventingManager, HostConfig, UpnpHost};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = get_config();
    let eventing = Arc::new(EventingManager::new());
    let (definition, switch) = light::light_device(&config, Arc::clone(&eventing))?;

    info!("💡 Starting {} ...", definition.friendly_name());
    let mut host = UpnpHost::start(definition, eventing, HostConfig::from_config()).await?;
    info!(
        "✅ LumoLight is ready at http://{}:{}",
        config.get_base_url(),
        host.local_addr().port()
    );
    info!("Press Ctrl+C to stop...");

    // Actionneur simulé : le statut rejoint la cible demandée, ce qui
    // déclenche les notifications d'événements.
    let actuator = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            switch.apply_target();
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");
    actuator.abort();
    host.close().await;
    Ok(())
}

/// Attend SIGINT ou SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
