//! Probe target parsing and capture filter construction.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use crate::error::TargetError;

/// The host/port whose traffic is being observed.
///
/// `host == None` means any host, `port == 0` means any port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Target {
    pub host: Option<Ipv4Addr>,
    pub port: u16,
}

impl Target {
    /// `0.0.0.0` is treated as "any host".
    pub fn new(host: Option<Ipv4Addr>, port: u16) -> Self {
        Self {
            host: host.filter(|h| !h.is_unspecified()),
            port,
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    /// Whether `addr` is the target endpoint.
    ///
    /// Without a target port nothing matches, so every segment is classified
    /// as unknown direction.
    pub fn matches(&self, addr: SocketAddrV4) -> bool {
        self.port != 0
            && addr.port() == self.port
            && self.host.map_or(true, |h| h == *addr.ip())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            Some(host) => write!(f, "{host}:{}", self.port),
            None => write!(f, "0.0.0.0:{}", self.port),
        }
    }
}

/// Parse a `host:port`, `host` or `port` target string.
///
/// - empty: any host, any port
/// - contains `:`: host and port, host names are resolved (first IPv4 address wins)
/// - contains `.`: host only
/// - otherwise: port only
pub fn parse_target(target: &str) -> Result<Target, TargetError> {
    let target = target.trim();
    if target.is_empty() {
        return Ok(Target::any());
    }

    if target.contains(':') {
        let addr = target
            .to_socket_addrs()
            .map_err(|_| TargetError::Unresolvable(target.to_string()))?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| TargetError::Unresolvable(target.to_string()))?;
        return Ok(Target::new(Some(*addr.ip()), addr.port()));
    }

    if target.contains('.') {
        let host = resolve_host(target)?;
        return Ok(Target::new(Some(host), 0));
    }

    let port = target
        .parse::<u16>()
        .map_err(|_| TargetError::InvalidPort(target.to_string()))?;
    Ok(Target::new(None, port))
}

fn resolve_host(host: &str) -> Result<Ipv4Addr, TargetError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    (host, 0)
        .to_socket_addrs()
        .map_err(|_| TargetError::Unresolvable(host.to_string()))?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| TargetError::Unresolvable(host.to_string()))
}

/// BPF filter expression selecting the target's TCP traffic.
pub fn bpf_filter(target: &Target) -> String {
    match (target.host, target.port) {
        (Some(host), 0) => format!("tcp and host {host}"),
        (Some(host), port) => format!("tcp and host {host} and port {port}"),
        (None, 0) => "tcp".to_string(),
        (None, port) => format!("tcp port {port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_target(""), Ok(Target::any()));
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_target("10.0.0.5:5432"),
            Ok(Target::new(Some(Ipv4Addr::new(10, 0, 0, 5)), 5432))
        );
    }

    #[test]
    fn test_parse_localhost_name() {
        let target = parse_target("localhost:3306").unwrap();
        assert_eq!(target.port, 3306);
        assert!(target.host.is_some_and(|h| h.is_loopback()));
    }

    #[test]
    fn test_parse_unspecified_host_is_any() {
        assert_eq!(parse_target("0.0.0.0:80"), Ok(Target::new(None, 80)));
    }

    #[test]
    fn test_parse_host_only() {
        assert_eq!(
            parse_target("192.168.1.7"),
            Ok(Target::new(Some(Ipv4Addr::new(192, 168, 1, 7)), 0))
        );
    }

    #[test]
    fn test_parse_port_only() {
        assert_eq!(parse_target("3306"), Ok(Target::new(None, 3306)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_target("mysql"),
            Err(TargetError::InvalidPort("mysql".to_string()))
        );
        assert_eq!(
            parse_target("70000"),
            Err(TargetError::InvalidPort("70000".to_string()))
        );
        assert!(matches!(
            parse_target("10.0.0.5:notaport"),
            Err(TargetError::Unresolvable(_))
        ));
    }

    #[test]
    fn test_bpf_filter() {
        let host = Some(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(bpf_filter(&Target::new(host, 5432)), "tcp and host 10.0.0.5 and port 5432");
        assert_eq!(bpf_filter(&Target::new(None, 5432)), "tcp port 5432");
        assert_eq!(bpf_filter(&Target::new(host, 0)), "tcp and host 10.0.0.5");
        assert_eq!(bpf_filter(&Target::any()), "tcp");
        assert_eq!(
            bpf_filter(&Target::new(Some(Ipv4Addr::UNSPECIFIED), 0)),
            "tcp"
        );
    }

    #[test]
    fn test_matches() {
        let target = Target::new(Some(Ipv4Addr::new(10, 0, 0, 5)), 5432);
        assert!(target.matches(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 5432)));
        assert!(!target.matches(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 5433)));
        assert!(!Target::any().matches(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 0)));
    }
}
