//! # lumoupnp - Hébergement de devices UPnP
//!
//! Ce crate implémente le moteur protocolaire d'un device UPnP/DLNA :
//!
//! - ✅ Annonces SSDP multi-interfaces (alive, byebye, réponses M-SEARCH)
//! - ✅ Descripteur racine généré et mis en cache au démarrage
//! - ✅ Dispatch SOAP vers des handlers de services enregistrés
//! - ✅ Abonnements aux événements GENA (SUBSCRIBE/UNSUBSCRIBE/NOTIFY)
//! - ✅ Arrêt gracieux coordonné (byebye puis fermeture des sockets)
//!
//! ## Architecture
//!
//! ```text
//! UpnpHost (coordinator)
//! ├── Descripteur racine (bytes, immuable)
//! ├── ActionRouter (clé de service -> ServiceHandler)
//! ├── EventingManager (SID -> Subscription)
//! ├── Serveur HTTP Axum (host)
//! └── Announcer SSDP (une session par interface)
//! ```
//!
//! Le point d'entrée est [`UpnpHost::start`] : il reçoit une
//! [`DeviceDefinition`] immuable et publie le device sur le réseau local.

pub mod allowlist;
pub mod coordinator;
pub mod descriptor;
pub mod device;
pub mod eventing;
pub mod host;
pub mod router;
pub mod soap;
pub mod ssdp;

pub use coordinator::{HostConfig, HostError, UpnpHost};
pub use device::{
    ActionArgs, ActionResults, DeviceDefinition, DeviceError, DeviceIcon, HandlerError,
    RequestContext, ServiceDefinition, ServiceHandler, make_device_udn, service_key,
};
pub use eventing::EventingManager;
pub use router::ActionRouter;

/// Identification du serveur envoyée dans les réponses HTTP et SSDP.
pub const SERVER_FIELD: &str = "Linux/3.4 DLNADOC/1.50 UPnP/1.0 LumoLight/1";

/// Chemin du descripteur racine.
pub const ROOT_DESC_PATH: &str = "/rootDesc.xml";

/// Chemin de contrôle SOAP partagé par tous les services.
pub const CONTROL_PATH: &str = "/ctl";

/// Préfixe des chemins d'icônes du device.
pub const DEVICE_ICON_PATH: &str = "/deviceIcon";
