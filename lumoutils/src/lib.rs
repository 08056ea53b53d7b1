//! Utilitaires réseau partagés par LumoLight.
//!
//! Ce crate regroupe les fonctions d'inspection des interfaces réseau
//! utilisées par la configuration (URL de base) et par l'annonceur SSDP
//! (énumération des interfaces candidates).

mod ip_utils;

pub use ip_utils::{IfaceAddr, guess_local_ip, usable_ipv4_interfaces};
