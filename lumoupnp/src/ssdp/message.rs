//! Formatage et analyse des messages SSDP.
//!
//! Fonctions pures : l'annonceur leur fournit les champs, elles rendent les
//! datagrammes texte. Testables sans socket.

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT};
use crate::device::DeviceDefinition;

/// Types de notification annoncés pour un device : le root device, son UDN,
/// son type, puis le type de chacun de ses services.
pub fn notification_types(def: &DeviceDefinition) -> Vec<String> {
    let mut nts = vec![
        "upnp:rootdevice".to_string(),
        def.udn().to_string(),
        def.device_type().to_string(),
    ];
    for service in def.services() {
        nts.push(service.service_type().to_string());
    }
    nts
}

/// USN associé à un type de notification.
pub fn usn_for(udn: &str, nt: &str) -> String {
    if nt.starts_with("uuid:") {
        nt.to_string()
    } else {
        format!("{}::{}", udn, nt)
    }
}

/// Message NOTIFY ssdp:alive.
pub fn build_alive(location: &str, server: &str, nt: &str, usn: &str, max_age: u64) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, max_age, location, nt, server, usn
    )
}

/// Message NOTIFY ssdp:byebye.
pub fn build_byebye(nt: &str, usn: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR, SSDP_PORT, nt, usn
    )
}

/// Réponse unicast à un M-SEARCH.
pub fn build_search_response(
    st: &str,
    usn: &str,
    location: &str,
    server: &str,
    max_age: u64,
) -> String {
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         \r\n",
        max_age, date, location, server, st, usn
    )
}

/// Extrait la cible de recherche (ST) d'un datagramme M-SEARCH.
///
/// Retourne `None` pour tout autre type de message (NOTIFY d'un autre
/// device, réponse de recherche, bruit).
pub fn parse_search_target(data: &str) -> Option<String> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    if !first_line.to_ascii_uppercase().starts_with("M-SEARCH") {
        return None;
    }

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(colon) = line.find(':') {
            let (name, value) = line.split_at(colon);
            if name.trim().eq_ignore_ascii_case("ST") {
                let st = value[1..].trim();
                if !st.is_empty() {
                    return Some(st.to_string());
                }
            }
        }
    }
    None
}

/// Types de notification correspondant à une cible de recherche.
///
/// `ssdp:all` les sélectionne tous ; sinon seule la correspondance exacte
/// répond.
pub fn matching_targets<'a>(st: &str, nts: &'a [String]) -> Vec<&'a str> {
    if st == "ssdp:all" {
        nts.iter().map(String::as_str).collect()
    } else {
        nts.iter()
            .filter(|nt| nt.as_str() == st)
            .map(String::as_str)
            .collect()
    }
}
