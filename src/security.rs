//! Hashing for the accept loop's IP ban list. Grounded on the same
//! `sha2::Sha256` primitive the relay uses elsewhere for deterministic
//! identifiers, applied here to the peer IP only (never the port).

use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Hex-encoded SHA-256 digest of a peer IP address.
pub fn hash_ip(ip: IpAddr) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn same_ip_hashes_identically() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(hash_ip(ip), hash_ip(ip));
    }

    #[test]
    fn different_ips_hash_differently() {
        let a = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));
        assert_ne!(hash_ip(a), hash_ip(b));
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let hash = hash_ip(ip);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
