//! Liste blanche d'adresses clientes.
//!
//! La configuration fournit une liste d'IPs ou de blocs CIDR séparés par
//! des virgules ; vide, elle autorise tout (IPv4 et IPv6). Une expression
//! illisible est journalisée et ignorée plutôt que de bloquer le démarrage.

use std::net::IpAddr;

use tracing::warn;

/// Bloc d'adresses au format CIDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    /// Crée un bloc, en validant la longueur du préfixe.
    pub fn new(addr: IpAddr, prefix: u8) -> Option<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return None;
        }
        Some(Self { addr, prefix })
    }

    /// Teste l'appartenance d'une adresse au bloc.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix)
                };
                (u32::from(net) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix)
                };
                (u128::from(net) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }
}

/// Parse la liste configurée en blocs CIDR.
///
/// Chaîne vide : tout le trafic IPv4 et IPv6 est admis. Une IP nue devient
/// un bloc /32 (ou /128).
pub fn parse_allowed_ips(spec: &str) -> Vec<IpNet> {
    let spec = spec.trim();
    if spec.is_empty() {
        return vec![
            IpNet {
                addr: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                prefix: 0,
            },
            IpNet {
                addr: IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
                prefix: 0,
            },
        ];
    }

    let mut nets = Vec::new();
    for expr in spec.split(',') {
        let expr = expr.trim();
        if expr.is_empty() {
            continue;
        }
        match parse_one(expr) {
            Some(net) => nets.push(net),
            None => warn!("Unable to parse allowed ip expression {:?}", expr),
        }
    }
    nets
}

fn parse_one(expr: &str) -> Option<IpNet> {
    if let Some((addr, prefix)) = expr.split_once('/') {
        let addr: IpAddr = addr.trim().parse().ok()?;
        let prefix: u8 = prefix.trim().parse().ok()?;
        IpNet::new(addr, prefix)
    } else {
        let addr: IpAddr = expr.parse().ok()?;
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        IpNet::new(addr, prefix)
    }
}

/// Une adresse est admise si elle appartient à au moins un bloc.
pub fn ip_allowed(nets: &[IpNet], ip: &IpAddr) -> bool {
    nets.iter().any(|net| net.contains(ip))
}
