//! Définition immuable d'un device UPnP et de ses services.
//!
//! Une [`DeviceDefinition`] décrit le device une fois pour toutes au
//! démarrage : identité, services, icônes. Le reste du crate (descripteur,
//! routeur, annonceur) ne fait que la lire.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::CONTROL_PATH;

/// Arguments d'une action, tels qu'extraits de l'enveloppe SOAP.
pub type ActionArgs = HashMap<String, String>;

/// Résultat d'une action : paires (nom, valeur) ordonnées.
pub type ActionResults = Vec<(String, String)>;

/// Contexte de la requête de contrôle transmis au handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Adresse du client, si connue.
    pub peer: Option<SocketAddr>,
}

/// Échec typé retourné par un [`ServiceHandler`].
///
/// Chaque variante correspond à un code de fault UPnP stable (voir
/// [`crate::soap::error_codes`]).
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Action inconnue du service
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Valeur d'argument invalide ou manquante
    #[error("Invalid argument value: {0}")]
    InvalidArgumentValue(String),

    /// Échec interne de l'action
    #[error("Action failed: {0}")]
    ActionFailed(String),
}

/// Erreurs de construction d'une définition de device.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Clé de service déjà utilisée dans ce device
    #[error("Service '{0}' already exists in device")]
    ServiceAlreadyExists(String),

    /// URN de service inexploitable
    #[error("Invalid service URN '{0}'")]
    InvalidServiceUrn(String),
}

/// Handler d'un service UPnP.
///
/// Une instance par service ; le handler est responsable de la
/// synchronisation de son propre état mutable. L'exécution est sûre pour un
/// nombre illimité d'invocations concurrentes.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Exécute une action et retourne les arguments de sortie ordonnés.
    async fn handle(
        &self,
        action: &str,
        args: &ActionArgs,
        ctx: &RequestContext,
    ) -> Result<ActionResults, HandlerError>;

    /// Valeurs courantes des variables événementielles du service.
    ///
    /// Utilisé pour l'événement initial envoyé à chaque nouvel abonné.
    /// `None` désactive l'événement initial.
    async fn evented_state(&self) -> Option<ActionResults> {
        None
    }
}

/// Icône déclarée par le device.
#[derive(Debug, Clone)]
pub struct DeviceIcon {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

/// Définition d'un service UPnP.
#[derive(Clone)]
pub struct ServiceDefinition {
    service_type: String,
    service_id: String,
    control_path: String,
    event_path: String,
    scpd: String,
    handler: Arc<dyn ServiceHandler>,
}

impl std::fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("service_type", &self.service_type)
            .field("service_id", &self.service_id)
            .field("event_path", &self.event_path)
            .finish()
    }
}

impl ServiceDefinition {
    /// Crée une définition de service.
    ///
    /// Le chemin de contrôle est partagé par tous les services
    /// ([`CONTROL_PATH`]) : le service visé est déduit de l'en-tête
    /// `SOAPACTION` de la requête.
    pub fn new(
        service_type: impl Into<String>,
        service_id: impl Into<String>,
        event_path: impl Into<String>,
        scpd: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            service_id: service_id.into(),
            control_path: CONTROL_PATH.to_string(),
            event_path: event_path.into(),
            scpd: scpd.into(),
            handler,
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn control_path(&self) -> &str {
        &self.control_path
    }

    pub fn event_path(&self) -> &str {
        &self.event_path
    }

    pub fn scpd(&self) -> &str {
        &self.scpd
    }

    pub fn handler(&self) -> Arc<dyn ServiceHandler> {
        Arc::clone(&self.handler)
    }

    /// Chemin du document SCPD, dérivé de la clé du service.
    pub fn scpd_path(&self) -> Result<String, DeviceError> {
        Ok(format!("/scpd/{}.xml", service_key(&self.service_type)?))
    }
}

/// Définition immuable du device racine.
#[derive(Debug, Clone)]
pub struct DeviceDefinition {
    device_type: String,
    friendly_name: String,
    manufacturer: String,
    model_name: String,
    udn: String,
    services: Vec<ServiceDefinition>,
    icons: Vec<DeviceIcon>,
}

impl DeviceDefinition {
    /// Crée la définition du device.
    ///
    /// L'UDN est dérivé du nom convivial ([`make_device_udn`]) : un
    /// redémarrage avec le même nom conserve la même identité réseau.
    pub fn new(
        device_type: impl Into<String>,
        friendly_name: impl Into<String>,
        manufacturer: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        let friendly_name = friendly_name.into();
        let udn = make_device_udn(&friendly_name);
        Self {
            device_type: device_type.into(),
            friendly_name,
            manufacturer: manufacturer.into(),
            model_name: model_name.into(),
            udn,
            services: Vec::new(),
            icons: Vec::new(),
        }
    }

    /// Ajoute un service.
    ///
    /// Rejette immédiatement une clé de service déjà présente plutôt que
    /// d'écraser silencieusement le handler existant.
    pub fn add_service(&mut self, service: ServiceDefinition) -> Result<(), DeviceError> {
        let key = service_key(service.service_type())?;
        for existing in &self.services {
            if service_key(existing.service_type())? == key {
                return Err(DeviceError::ServiceAlreadyExists(key));
            }
        }
        self.services.push(service);
        Ok(())
    }

    /// Ajoute une icône.
    pub fn add_icon(&mut self, icon: DeviceIcon) {
        self.icons.push(icon);
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// UDN du device, préfixe `uuid:` inclus.
    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn icons(&self) -> &[DeviceIcon] {
        &self.icons
    }
}

/// Dérive la clé d'un service depuis son URN de type.
///
/// # Examples
///
/// ```
/// use lumoupnp::service_key;
///
/// let key = service_key("urn:schemas-upnp-org:service:SwitchPower:1").unwrap();
/// assert_eq!(key, "SwitchPower");
/// ```
pub fn service_key(service_urn: &str) -> Result<String, DeviceError> {
    let parts: Vec<&str> = service_urn.split(':').collect();
    if parts.len() < 4 || parts[3].is_empty() {
        return Err(DeviceError::InvalidServiceUrn(service_urn.to_string()));
    }
    Ok(parts[3].to_string())
}

/// Dérive un UDN déterministe depuis une chaîne d'identité.
///
/// Le condensat SHA-256 du nom est tronqué à 16 octets et formaté comme un
/// UUID canonique : même nom, même UDN, à chaque démarrage.
pub fn make_device_udn(unique: &str) -> String {
    let digest = Sha256::digest(unique.as_bytes());
    let h = hex::encode(&digest[..16]);
    format!(
        "uuid:{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}
