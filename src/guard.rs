use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

/// Network address allowlist.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    allowed: HashSet<String>,
    enabled: bool,
}

impl AccessGuard {
    /// Entries that parse as IP addresses are stored in canonical form,
    /// everything else is kept literally.
    pub fn new<I, S>(allowed: I, enabled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<IpAddr>()
                    .map_or_else(|_| entry.to_owned(), |ip| ip.to_canonical().to_string())
            })
            .collect();
        Self { allowed, enabled }
    }

    /// Whether `peer` may reach the command routes. The port is ignored.
    ///
    /// An enabled guard with an empty set denies everyone.
    pub fn check(&self, peer: SocketAddr) -> bool {
        if !self.enabled {
            return true;
        }
        let host = peer.ip().to_canonical().to_string();
        self.allowed.contains(&host)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
