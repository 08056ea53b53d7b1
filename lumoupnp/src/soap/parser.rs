//! Parser SOAP pour les requêtes de contrôle UPnP

use super::{SoapBody, SoapEnvelope, SoapHeader};
use std::collections::HashMap;
use std::io::BufReader;
use xmltree::Element;

/// Action UPnP extraite d'une enveloppe SOAP
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "SetTarget")
    pub name: String,

    /// Namespace de l'action (l'URN du service)
    pub namespace: Option<String>,

    /// Arguments de l'action
    pub args: HashMap<String, String>,
}

/// Erreur de décodage SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,

    #[error("Invalid SOAPACTION header: {0}")]
    InvalidSoapActionHeader(String),
}

/// Parse l'en-tête HTTP `SOAPACTION` en couple (URN du service, action).
///
/// Format attendu : `"urn:schemas-upnp-org:service:SwitchPower:1#SetTarget"`,
/// guillemets optionnels.
pub fn parse_soap_action_header(value: &str) -> Result<(String, String), SoapParseError> {
    let trimmed = value.trim().trim_matches('"');
    let (urn, action) = trimmed
        .split_once('#')
        .ok_or_else(|| SoapParseError::InvalidSoapActionHeader(value.to_string()))?;
    if urn.is_empty() || action.is_empty() {
        return Err(SoapParseError::InvalidSoapActionHeader(value.to_string()));
    }
    Ok((urn.to_string(), action.to_string()))
}

/// Parse une action SOAP à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    extract_action_from_body(&envelope.body)
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    // Header optionnel
    let header = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Header")))
        .map(|e| SoapHeader { content: e.clone() });

    // Body obligatoire
    let body_elem = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

/// Extrait l'action UPnP du corps SOAP
///
/// Le Body contient un unique élément enfant de la forme
/// `<u:ActionName xmlns:u="service-urn">...</u:ActionName>`.
fn extract_action_from_body(body: &SoapBody) -> Result<SoapAction, SoapParseError> {
    let action_elem = body
        .content
        .children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or(SoapParseError::NoAction)?;

    let name = action_elem.name.clone();
    let namespace = action_elem.namespace.clone();

    let mut args = HashMap::new();
    for child in &action_elem.children {
        if let Some(elem) = child.as_element() {
            let arg_value = elem.get_text().unwrap_or_default().to_string();
            args.insert(elem.name.clone(), arg_value);
        }
    }

    Ok(SoapAction {
        name,
        namespace,
        args,
    })
}
