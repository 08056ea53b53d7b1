//! # Module SOAP - Simple Object Access Protocol
//!
//! Ce module implémente le support SOAP pour UPnP : décodage des enveloppes
//! de contrôle entrantes, encodage des réponses et des faults.
//!
//! ## Fonctionnalités
//!
//! - ✅ Parsing d'enveloppes SOAP
//! - ✅ Extraction de l'action UPnP avec ses arguments
//! - ✅ Parsing de l'en-tête `SOAPACTION`
//! - ✅ Construction de réponses SOAP
//! - ✅ Gestion des SOAP Faults avec détail `UPnPError`
//!
//! ## Example
//!
//! ```
//! use lumoupnp::soap::{parse_soap_action, build_soap_response};
//!
//! let body = r#"<?xml version="1.0"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <u:SetTarget xmlns:u="urn:schemas-upnp-org:service:SwitchPower:1">
//!       <NewTargetValue>1</NewTargetValue>
//!     </u:SetTarget>
//!   </s:Body>
//! </s:Envelope>"#;
//!
//! let action = parse_soap_action(body.as_bytes()).unwrap();
//! assert_eq!(action.name, "SetTarget");
//! assert_eq!(action.args.get("NewTargetValue"), Some(&"1".to_string()));
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{SoapFault, build_soap_fault};
pub use parser::{SoapAction, SoapParseError, parse_soap_action, parse_soap_action_header};

/// Codes d'erreur SOAP UPnP stables attendus par les control points.
pub mod error_codes {
    /// Action inconnue du service visé
    pub const INVALID_ACTION: &str = "401";

    /// Enveloppe ou arguments illisibles
    pub const INVALID_ARGS: &str = "402";

    /// Service inconnu du device (distinct d'une action inconnue)
    pub const INVALID_SERVICE: &str = "404";

    /// Échec interne de l'action
    pub const ACTION_FAILED: &str = "501";

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: &str = "600";

    /// Valeur d'argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: &str = "601";

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: &str = "602";
}
