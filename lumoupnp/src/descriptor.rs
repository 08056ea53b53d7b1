//! Génération du descripteur racine du device.
//!
//! Le descripteur est rendu une seule fois au démarrage à partir de la
//! [`DeviceDefinition`], puis servi tel quel : le contenu est invariant et
//! lu concurremment sans verrou.

use thiserror::Error;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::DEVICE_ICON_PATH;
use crate::device::{DeviceDefinition, DeviceError};

/// Erreur de rendu du descripteur. Fatale au démarrage : elle signale une
/// définition de device corrompue.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("XML write error: {0}")]
    Xml(#[from] xmltree::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

fn text_element(name: &str, value: impl Into<String>) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(value.into()));
    elem
}

/// Construit le document de description du device racine.
///
/// La sortie est déterministe : deux appels sur la même définition rendent
/// exactement les mêmes octets.
pub fn build_root_descriptor(def: &DeviceDefinition) -> Result<Vec<u8>, DescriptorError> {
    let mut root = Element::new("root");
    root.attributes.insert(
        "xmlns".to_string(),
        "urn:schemas-upnp-org:device-1-0".to_string(),
    );

    // specVersion
    let mut spec = Element::new("specVersion");
    spec.children.push(XMLNode::Element(text_element("major", "1")));
    spec.children.push(XMLNode::Element(text_element("minor", "0")));
    root.children.push(XMLNode::Element(spec));

    root.children.push(XMLNode::Element(device_element(def)?));

    let config = EmitterConfig::new().perform_indent(true).indent_string("  ");

    let mut xml_output = Vec::new();
    root.write_with_config(&mut xml_output, config)?;

    let mut bytes = b"<?xml version=\"1.0\"?>".to_vec();
    bytes.extend_from_slice(&xml_output);
    Ok(bytes)
}

fn device_element(def: &DeviceDefinition) -> Result<Element, DeviceError> {
    let mut elem = Element::new("device");

    elem.children
        .push(XMLNode::Element(text_element("deviceType", def.device_type())));
    elem.children.push(XMLNode::Element(text_element(
        "friendlyName",
        def.friendly_name(),
    )));
    elem.children.push(XMLNode::Element(text_element(
        "manufacturer",
        def.manufacturer(),
    )));
    elem.children
        .push(XMLNode::Element(text_element("modelName", def.model_name())));
    elem.children
        .push(XMLNode::Element(text_element("UDN", def.udn())));

    if !def.icons().is_empty() {
        let mut icon_list = Element::new("iconList");
        for (index, icon) in def.icons().iter().enumerate() {
            let mut icon_elem = Element::new("icon");
            icon_elem
                .children
                .push(XMLNode::Element(text_element("mimetype", &icon.mimetype)));
            icon_elem.children.push(XMLNode::Element(text_element(
                "width",
                icon.width.to_string(),
            )));
            icon_elem.children.push(XMLNode::Element(text_element(
                "height",
                icon.height.to_string(),
            )));
            icon_elem.children.push(XMLNode::Element(text_element(
                "depth",
                icon.depth.to_string(),
            )));
            icon_elem.children.push(XMLNode::Element(text_element(
                "url",
                format!("{}/{}", DEVICE_ICON_PATH, index),
            )));
            icon_list.children.push(XMLNode::Element(icon_elem));
        }
        elem.children.push(XMLNode::Element(icon_list));
    }

    if !def.services().is_empty() {
        let mut service_list = Element::new("serviceList");
        for service in def.services() {
            let mut service_elem = Element::new("service");
            service_elem.children.push(XMLNode::Element(text_element(
                "serviceType",
                service.service_type(),
            )));
            service_elem.children.push(XMLNode::Element(text_element(
                "serviceId",
                service.service_id(),
            )));
            service_elem.children.push(XMLNode::Element(text_element(
                "SCPDURL",
                service.scpd_path()?,
            )));
            service_elem.children.push(XMLNode::Element(text_element(
                "controlURL",
                service.control_path(),
            )));
            service_elem.children.push(XMLNode::Element(text_element(
                "eventSubURL",
                service.event_path(),
            )));
            service_list.children.push(XMLNode::Element(service_elem));
        }
        elem.children.push(XMLNode::Element(service_list));
    }

    elem.children
        .push(XMLNode::Element(text_element("presentationURL", "/")));

    Ok(elem)
}
