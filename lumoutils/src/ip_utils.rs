use std::net::{Ipv4Addr, UdpSocket};

use get_if_addrs::get_if_addrs;
use tracing::warn;

/// Adresse IPv4 unicast d'une interface réseau utilisable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceAddr {
    /// Nom de l'interface (ex: "eth0", "wlan0", "en0")
    pub name: String,

    /// Adresse IPv4 unicast de l'interface
    pub ip: Ipv4Addr,
}

/// Devine l'adresse IP locale de la machine.
///
/// Crée un socket UDP lié à `0.0.0.0:0` et demande au système quelle
/// interface serait utilisée pour joindre un serveur DNS public. Aucun
/// datagramme n'est émis (UDP est sans connexion).
///
/// Retourne `"127.0.0.1"` si la détection échoue.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Énumère les interfaces réseau candidates pour l'annonce SSDP.
///
/// Une interface est candidate si elle porte une adresse IPv4 unicast
/// non-loopback. Les indicateurs bas niveau (MTU, capacité multicast) ne
/// sont pas exposés par `get_if_addrs` ; c'est l'échec du bind multicast
/// qui élimine les interfaces réellement inutilisables.
///
/// # Arguments
///
/// * `filter` - Si renseigné, seule l'interface portant exactement ce nom
///   est retenue.
///
/// Une interface portant plusieurs adresses IPv4 n'est retournée qu'une
/// fois, avec sa première adresse.
pub fn usable_ipv4_interfaces(filter: Option<&str>) -> Vec<IfaceAddr> {
    let mut found: Vec<IfaceAddr> = Vec::new();

    let interfaces = match get_if_addrs() {
        Ok(ifs) => ifs,
        Err(e) => {
            warn!("Failed to enumerate network interfaces: {}", e);
            return found;
        }
    };

    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        if let Some(name) = filter {
            if iface.name != name {
                continue;
            }
        }
        if let std::net::IpAddr::V4(ipv4) = iface.ip() {
            if found.iter().any(|f| f.name == iface.name) {
                continue;
            }
            found.push(IfaceAddr {
                name: iface.name,
                ip: ipv4,
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn test_guess_local_ip_returns_valid_ip() {
        let ip = guess_local_ip();
        assert!(
            ip.parse::<IpAddr>().is_ok(),
            "Should return a valid IP address"
        );
    }

    #[test]
    fn test_usable_interfaces_excludes_loopback() {
        for iface in usable_ipv4_interfaces(None) {
            assert!(!iface.ip.is_loopback());
        }
    }

    #[test]
    fn test_usable_interfaces_filter_unknown_name() {
        let ifaces = usable_ipv4_interfaces(Some("no-such-interface-0"));
        assert!(ifaces.is_empty());
    }

    #[test]
    fn test_usable_interfaces_unique_names() {
        let ifaces = usable_ipv4_interfaces(None);
        for (i, a) in ifaces.iter().enumerate() {
            for b in &ifaces[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
