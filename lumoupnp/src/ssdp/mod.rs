//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Annonce du device sur le réseau local et réponse aux recherches des
//! control points.
//!
//! ## Fonctionnalités
//!
//! - ✅ NOTIFY alive périodiques en multicast, une session par interface
//! - ✅ Réponses unicast aux M-SEARCH
//! - ✅ NOTIFY byebye garantis avant la fermeture des sockets
//! - ✅ Interfaces inéligibles ignorées sans impacter les autres
//!
//! ## Constantes SSDP
//!
//! - **Groupe multicast** : 239.255.255.250:1900
//! - **Intervalle d'annonce** : configurable, 180 s par défaut
//! - **Max-Age** : deux fois l'intervalle d'annonce

mod announcer;
mod message;

pub use announcer::{Announcer, AnnouncerConfig};
pub use message::{
    build_alive, build_byebye, build_search_response, matching_targets, notification_types,
    parse_search_target, usn_for,
};

use std::net::Ipv4Addr;

/// Adresse du groupe multicast SSDP
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Groupe multicast SSDP sous forme typée
pub const SSDP_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;
