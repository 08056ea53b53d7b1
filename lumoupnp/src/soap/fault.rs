//! SOAP Faults pour UPnP

use xmltree::{Element, EmitterConfig, XMLNode};

/// Enveloppe de secours émise si la sérialisation du fault échoue elle-même.
const FALLBACK_FAULT: &str = "<?xml version=\"1.0\"?><s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\"><s:Body><s:Fault><faultcode>s:Server</faultcode><faultstring>Internal Error</faultstring></s:Fault></s:Body></s:Envelope>";

/// Erreur SOAP (Fault)
#[derive(Debug, Clone)]
pub struct SoapFault {
    /// Code du fault (ex: "s:Client", "s:Server")
    pub fault_code: String,

    /// Description du fault
    pub fault_string: String,

    /// Détail UPnP optionnel
    pub upnp_error: Option<UpnpError>,
}

/// Erreur UPnP transportée dans le détail du fault
#[derive(Debug, Clone)]
pub struct UpnpError {
    /// Code d'erreur UPnP stable (ex: "401", "404")
    pub error_code: String,

    /// Description de l'erreur
    pub error_description: String,
}

impl SoapFault {
    /// Crée un fault SOAP simple
    pub fn new(fault_code: impl Into<String>, fault_string: impl Into<String>) -> Self {
        Self {
            fault_code: fault_code.into(),
            fault_string: fault_string.into(),
            upnp_error: None,
        }
    }

    /// Crée un fault SOAP portant un code d'erreur UPnP
    pub fn with_upnp_error(
        fault_code: impl Into<String>,
        fault_string: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            fault_code: fault_code.into(),
            fault_string: fault_string.into(),
            upnp_error: Some(UpnpError {
                error_code: error_code.into(),
                error_description: error_description.into(),
            }),
        }
    }

    /// Code d'erreur UPnP porté par ce fault, s'il y en a un.
    pub fn upnp_error_code(&self) -> Option<&str> {
        self.upnp_error.as_ref().map(|e| e.error_code.as_str())
    }

    /// Sérialise le fault en enveloppe SOAP complète.
    pub fn to_envelope(&self) -> String {
        build_soap_fault(
            &self.fault_code,
            &self.fault_string,
            self.upnp_error.as_ref().map(|e| e.error_code.as_str()),
            self.upnp_error
                .as_ref()
                .map(|e| e.error_description.as_str()),
        )
        .unwrap_or_else(|_| FALLBACK_FAULT.to_string())
    }
}

/// Construit un SOAP Fault XML complet (enveloppe incluse).
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message d'erreur
/// * `upnp_error_code` - Code d'erreur UPnP optionnel (ex: "401")
/// * `upnp_error_desc` - Description d'erreur UPnP optionnelle
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<&str>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");

    let mut faultcode_elem = Element::new("faultcode");
    faultcode_elem
        .children
        .push(XMLNode::Text(fault_code.to_string()));
    fault.children.push(XMLNode::Element(faultcode_elem));

    let mut faultstring_elem = Element::new("faultstring");
    faultstring_elem
        .children
        .push(XMLNode::Text(fault_string.to_string()));
    fault.children.push(XMLNode::Element(faultstring_elem));

    // detail (si erreur UPnP)
    if let (Some(code), Some(desc)) = (upnp_error_code, upnp_error_desc) {
        let mut detail = Element::new("detail");

        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );

        let mut error_code_elem = Element::new("errorCode");
        error_code_elem.children.push(XMLNode::Text(code.to_string()));
        upnp_error.children.push(XMLNode::Element(error_code_elem));

        let mut error_desc_elem = Element::new("errorDescription");
        error_desc_elem.children.push(XMLNode::Text(desc.to_string()));
        upnp_error.children.push(XMLNode::Element(error_desc_elem));

        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).to_string())
}
