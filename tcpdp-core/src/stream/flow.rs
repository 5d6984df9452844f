use std::fmt;
use std::net::SocketAddrV4;

use crate::target::Target;

/// Direction of a segment relative to the configured target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    /// Neither endpoint matches the target (host/port-agnostic monitoring).
    Unknown,
}

impl Direction {
    pub const ALL: [Direction; 3] = [
        Direction::ClientToServer,
        Direction::ServerToClient,
        Direction::Unknown,
    ];

    /// Classify a segment against the target.
    ///
    /// An endpoint matches when its port equals the target port and the target
    /// host is unset or equal to its address.
    pub fn classify(target: &Target, src: SocketAddrV4, dst: SocketAddrV4) -> Self {
        if target.matches(dst) {
            Direction::ClientToServer
        } else if target.matches(src) {
            Direction::ServerToClient
        } else {
            Direction::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "client_to_server",
            Direction::ServerToClient => "server_to_client",
            Direction::Unknown => "unknown",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::ClientToServer => 0,
            Direction::ServerToClient => 1,
            Direction::Unknown => 2,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered (source, destination) pair identifying one direction of a connection.
///
/// Tracking tables are keyed by the canonical key of a connection, which
/// points from client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
}

impl FlowKey {
    pub fn new(src: SocketAddrV4, dst: SocketAddrV4) -> Self {
        Self { src, dst }
    }

    /// The key of the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::addr;
    use std::net::Ipv4Addr;

    #[test]
    fn test_flow_key_display_and_reverse() {
        let key = FlowKey::new(addr(10, 0, 0, 1, 54321), addr(10, 0, 0, 5, 5432));
        assert_eq!(key.to_string(), "10.0.0.1:54321->10.0.0.5:5432");
        assert_eq!(key.reversed().to_string(), "10.0.0.5:5432->10.0.0.1:54321");
        assert_eq!(key.reversed().reversed(), key);
    }

    #[test]
    fn test_classify_with_host() {
        let target = Target::new(Some(Ipv4Addr::new(10, 0, 0, 5)), 5432);
        let client = addr(10, 0, 0, 1, 54321);
        let server = addr(10, 0, 0, 5, 5432);

        assert_eq!(Direction::classify(&target, client, server), Direction::ClientToServer);
        assert_eq!(Direction::classify(&target, server, client), Direction::ServerToClient);
        // Same port, different host
        let other = addr(10, 0, 0, 6, 5432);
        assert_eq!(Direction::classify(&target, client, other), Direction::Unknown);
    }

    #[test]
    fn test_classify_any_host() {
        let target = Target::new(None, 3306);
        let client = addr(192, 168, 1, 10, 40000);
        let server = addr(192, 168, 1, 20, 3306);
        assert_eq!(Direction::classify(&target, client, server), Direction::ClientToServer);
        assert_eq!(Direction::classify(&target, server, client), Direction::ServerToClient);
    }

    #[test]
    fn test_classify_port_zero_is_unknown() {
        let target = Target::any();
        let a = addr(10, 0, 0, 1, 1234);
        let b = addr(10, 0, 0, 2, 80);
        assert_eq!(Direction::classify(&target, a, b), Direction::Unknown);
    }
}
