//! Annonceur SSDP multi-interfaces.
//!
//! Une session par interface éligible, chacune avec deux threads partageant
//! le même socket multicast : une boucle d'annonces périodiques et une
//! boucle d'écoute des M-SEARCH. Les sessions sont indépendantes ; l'échec
//! d'une interface n'affecte jamais les autres.
//!
//! Cycle de vie d'une session : Idle -> Binding -> Advertising -> Closed.
//! Un bind ou un join multicast refusé renvoie la session en Idle (interface
//! ignorée, non fatal). À l'arrêt, les byebye partent avant la fermeture du
//! socket, sur tous les chemins de sortie.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use super::message::{
    build_alive, build_byebye, build_search_response, matching_targets, notification_types,
    parse_search_target, usn_for,
};
use super::{SSDP_MULTICAST_GROUP, SSDP_PORT};
use crate::ROOT_DESC_PATH;
use crate::device::DeviceDefinition;

/// Paramètres de l'annonceur.
#[derive(Debug, Clone)]
pub struct AnnouncerConfig {
    /// Port du listener HTTP servant le descripteur
    pub http_port: u16,

    /// Champ SERVER des annonces
    pub server_field: String,

    /// Intervalle entre deux salves d'annonces
    pub notify_interval: Duration,

    /// Filtre optionnel sur le nom d'interface
    pub interface: Option<String>,
}

struct AnnounceSession {
    iface: String,
    handles: Vec<JoinHandle<()>>,
}

/// Ensemble des sessions d'annonce en cours.
pub struct Announcer {
    sessions: Vec<AnnounceSession>,
}

impl Announcer {
    /// Démarre une session par interface éligible.
    ///
    /// Le signal d'arrêt est partagé : la fermeture du `Sender` associé au
    /// `shutdown` reçu déclenche les byebye puis la sortie des boucles.
    pub fn spawn(
        def: &Arc<DeviceDefinition>,
        config: &AnnouncerConfig,
        shutdown: Receiver<()>,
    ) -> Self {
        let mut sessions = Vec::new();

        for iface in lumoutils::usable_ipv4_interfaces(config.interface.as_deref()) {
            match bind_multicast_socket(iface.ip) {
                Ok(socket) => {
                    match spawn_session(&iface.name, iface.ip, socket, def, config, &shutdown) {
                        Ok(session) => {
                            info!("📡 Started SSDP on {:?} ({})", session.iface, iface.ip);
                            sessions.push(session);
                        }
                        Err(e) => {
                            warn!("Failed to start SSDP session on {:?}: {}", iface.name, e);
                        }
                    }
                }
                Err(e) => {
                    // Interfaces jamais viables sur certaines plateformes :
                    // un refus de bind/join n'est pas une erreur.
                    debug!("Skipping interface {:?}: {}", iface.name, e);
                }
            }
        }

        Self { sessions }
    }

    /// Nombre de sessions effectivement démarrées.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Attend la sortie de toutes les boucles d'annonce.
    ///
    /// Borné : les boucles observent le signal d'arrêt au pire après le
    /// timeout de lecture du socket (1 s).
    pub fn join(self) {
        for session in self.sessions {
            for handle in session.handles {
                if handle.join().is_err() {
                    warn!("SSDP session thread for {:?} panicked", session.iface);
                }
            }
        }
    }
}

/// Prépare le socket multicast d'une interface.
///
/// SO_REUSEADDR permet à plusieurs interfaces (et à d'autres stacks UPnP de
/// la machine) d'écouter le même port multicast.
fn bind_multicast_socket(iface_ip: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT).into();
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(&SSDP_MULTICAST_GROUP, &iface_ip)?;
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    socket.set_multicast_loop_v4(false)?;
    Ok(socket)
}

fn spawn_session(
    iface_name: &str,
    iface_ip: Ipv4Addr,
    socket: UdpSocket,
    def: &Arc<DeviceDefinition>,
    config: &AnnouncerConfig,
    shutdown: &Receiver<()>,
) -> std::io::Result<AnnounceSession> {
    let listener_socket = socket.try_clone()?;

    // L'URL annoncée pointe l'adresse de cette interface : les clients la
    // joignent par le même chemin que celui d'où vient l'annonce.
    let location = format!("http://{}:{}{}", iface_ip, config.http_port, ROOT_DESC_PATH);
    let nts = notification_types(def);
    let udn = def.udn().to_string();
    let max_age = (config.notify_interval.as_secs() * 2).max(1);

    let announce_handle = {
        let nts = nts.clone();
        let udn = udn.clone();
        let location = location.clone();
        let server = config.server_field.clone();
        let interval = config.notify_interval;
        let shutdown = shutdown.clone();
        let iface = iface_name.to_string();
        std::thread::spawn(move || {
            announce_loop(
                socket, &iface, &nts, &udn, &location, &server, max_age, interval, shutdown,
            );
        })
    };

    let listen_handle = {
        let server = config.server_field.clone();
        let shutdown = shutdown.clone();
        let iface = iface_name.to_string();
        std::thread::spawn(move || {
            listen_loop(
                listener_socket,
                &iface,
                &nts,
                &udn,
                &location,
                &server,
                max_age,
                shutdown,
            );
        })
    };

    Ok(AnnounceSession {
        iface: iface_name.to_string(),
        handles: vec![announce_handle, listen_handle],
    })
}

#[allow(clippy::too_many_arguments)]
fn announce_loop(
    socket: UdpSocket,
    iface: &str,
    nts: &[String],
    udn: &str,
    location: &str,
    server: &str,
    max_age: u64,
    interval: Duration,
    shutdown: Receiver<()>,
) {
    let group = SocketAddrV4::new(SSDP_MULTICAST_GROUP, SSDP_PORT);

    send_alive_burst(&socket, group, nts, udn, location, server, max_age);

    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                send_alive_burst(&socket, group, nts, udn, location, server, max_age);
            }
            // Signal d'arrêt ou émetteur fermé.
            _ => break,
        }
    }

    // Départ annoncé avant la fermeture du socket.
    for nt in nts {
        let usn = usn_for(udn, nt);
        let msg = build_byebye(nt, &usn);
        match socket.send_to(msg.as_bytes(), group) {
            Ok(_) => info!("👋 NOTIFY byebye on {:?}: {}", iface, usn),
            Err(e) => warn!("Failed to send byebye on {:?} for {}: {}", iface, usn, e),
        }
    }
}

fn send_alive_burst(
    socket: &UdpSocket,
    group: SocketAddrV4,
    nts: &[String],
    udn: &str,
    location: &str,
    server: &str,
    max_age: u64,
) {
    for nt in nts {
        let usn = usn_for(udn, nt);
        let msg = build_alive(location, server, nt, &usn, max_age);
        match socket.send_to(msg.as_bytes(), group) {
            Ok(_) => debug!("✅ NOTIFY alive: {} (NT={})", usn, nt),
            Err(e) => warn!("Failed to send NOTIFY alive for {}: {}", usn, e),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn listen_loop(
    socket: UdpSocket,
    iface: &str,
    nts: &[String],
    udn: &str,
    location: &str,
    server: &str,
    max_age: u64,
    shutdown: Receiver<()>,
) {
    let mut buf = [0u8; 8192];

    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        match socket.recv_from(&mut buf) {
            Ok((n, src)) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                if let Some(st) = parse_search_target(&data) {
                    debug!("✅ M-SEARCH from {} with ST={}", src, st);
                    respond_to_search(&socket, src, &st, nts, udn, location, server, max_age);
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Timeout de lecture : on repasse par le test d'arrêt.
                continue;
            }
            Err(e) => {
                warn!("SSDP read error on {:?}: {}", iface, e);
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn respond_to_search(
    socket: &UdpSocket,
    src: SocketAddr,
    st: &str,
    nts: &[String],
    udn: &str,
    location: &str,
    server: &str,
    max_age: u64,
) {
    for nt in matching_targets(st, nts) {
        let usn = usn_for(udn, nt);
        let resp = build_search_response(nt, &usn, location, server, max_age);
        match socket.send_to(resp.as_bytes(), src) {
            Ok(_) => debug!("📡 M-SEARCH response sent to {} (ST={})", src, nt),
            Err(e) => warn!("Failed to send M-SEARCH response to {}: {}", src, e),
        }
    }
}
