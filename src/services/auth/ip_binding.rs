//! IP binding: a session is tied to the literal value of the trusted
//! forwarded-client-IP header it was issued for.
//!
//! The comparison is on strings, not on network addresses. What is being
//! guarded is the value the edge proxy injected, so any drift of that value
//! (even to an "equivalent" address) counts as a violation.

use super::token::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    /// The forwarded IP is not a dotted-quad IPv4 address.
    MalformedIp,
    /// The claimed IP is absent, or differs from the forwarded IP.
    Violation,
}

/// Whether the forwarded IP must be a syntactically valid IPv4 before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpBindingPolicy {
    require_ipv4: bool,
}

impl IpBindingPolicy {
    pub const fn exact() -> Self {
        Self {
            require_ipv4: false,
        }
    }

    pub const fn ipv4_then_exact() -> Self {
        Self { require_ipv4: true }
    }

    pub fn check(&self, claims: &Claims, forwarded_ip: &str) -> Result<(), BindingError> {
        if self.require_ipv4 && !is_valid_ipv4(forwarded_ip) {
            return Err(BindingError::MalformedIp);
        }

        if ip_matches(claims.ip.as_deref(), forwarded_ip) {
            Ok(())
        } else {
            Err(BindingError::Violation)
        }
    }
}

/// An absent claim never matches, and neither does an empty header.
pub fn ip_matches(claimed: Option<&str>, forwarded_ip: &str) -> bool {
    match claimed {
        Some(ip) => !forwarded_ip.is_empty() && ip == forwarded_ip,
        None => false,
    }
}

/// Dotted-quad IPv4: four groups `0`..=`255`, no leading zeros, nothing else.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    let mut groups = 0;
    for group in candidate.split('.') {
        groups += 1;
        if groups > 4 || !is_octet(group) {
            return false;
        }
    }
    groups == 4
}

fn is_octet(group: &str) -> bool {
    let bytes = group.as_bytes();
    if bytes.is_empty() || bytes.len() > 3 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    group.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
}
