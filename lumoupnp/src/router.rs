//! Routage des actions SOAP vers les handlers de services.
//!
//! Le registre (clé de service -> handler) est construit une seule fois au
//! démarrage puis n'est plus modifié : le dispatch se fait sans verrou.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::device::{
    ActionArgs, ActionResults, DeviceDefinition, DeviceError, HandlerError, RequestContext,
    ServiceHandler, service_key,
};
use crate::soap::{SoapFault, error_codes};

struct RegisteredService {
    service_type: String,
    handler: Arc<dyn ServiceHandler>,
}

/// Routeur d'actions : localise le service désigné par l'URN et lui délègue
/// l'exécution de l'action.
pub struct ActionRouter {
    services: HashMap<String, RegisteredService>,
}

impl ActionRouter {
    /// Construit le registre depuis la définition du device.
    ///
    /// Une clé de service dupliquée est une erreur immédiate, jamais un
    /// écrasement silencieux.
    pub fn from_definition(def: &DeviceDefinition) -> Result<Self, DeviceError> {
        let mut services = HashMap::new();
        for service in def.services() {
            let key = service_key(service.service_type())?;
            if services.contains_key(&key) {
                return Err(DeviceError::ServiceAlreadyExists(key));
            }
            services.insert(
                key,
                RegisteredService {
                    service_type: service.service_type().to_string(),
                    handler: service.handler(),
                },
            );
        }
        Ok(Self { services })
    }

    /// Retourne le handler enregistré pour une clé de service.
    pub fn handler(&self, key: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.services.get(key).map(|s| Arc::clone(&s.handler))
    }

    /// Exécute une action sur le service désigné par son URN.
    ///
    /// Sûr pour un nombre illimité d'invocations concurrentes : le registre
    /// est en lecture seule et les handlers gèrent leur propre état.
    pub async fn dispatch(
        &self,
        service_urn: &str,
        action: &str,
        args: &ActionArgs,
        ctx: &RequestContext,
    ) -> Result<ActionResults, SoapFault> {
        let key = match service_key(service_urn) {
            Ok(key) => key,
            Err(_) => return Err(invalid_service_fault(service_urn)),
        };

        let service = match self.services.get(&key) {
            Some(service) => service,
            None => {
                error!("❌ Unknown service URN: {}", service_urn);
                return Err(invalid_service_fault(service_urn));
            }
        };

        debug!(
            "🎬 Dispatching {}#{} ({})",
            key, action, service.service_type
        );

        service
            .handler
            .handle(action, args, ctx)
            .await
            .map_err(|e| fault_for_handler_error(action, e))
    }
}

fn invalid_service_fault(service_urn: &str) -> SoapFault {
    SoapFault::with_upnp_error(
        "s:Client",
        "Invalid Service",
        error_codes::INVALID_SERVICE,
        format!("Unknown service: {}", service_urn),
    )
}

fn fault_for_handler_error(action: &str, err: HandlerError) -> SoapFault {
    match err {
        HandlerError::InvalidAction(_) => SoapFault::with_upnp_error(
            "s:Client",
            "Invalid Action",
            error_codes::INVALID_ACTION,
            format!("Action '{}' not found", action),
        ),
        HandlerError::InvalidArgumentValue(detail) => SoapFault::with_upnp_error(
            "s:Client",
            "Invalid Arguments",
            error_codes::ARGUMENT_VALUE_INVALID,
            detail,
        ),
        HandlerError::ActionFailed(detail) => SoapFault::with_upnp_error(
            "s:Server",
            "Action Failed",
            error_codes::ACTION_FAILED,
            detail,
        ),
    }
}
