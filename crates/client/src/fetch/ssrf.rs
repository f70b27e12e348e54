//! SSRF (Server-Side Request Forgery) protection.
//!
//! Callers supply arbitrary URLs, so before fetching the host is resolved and
//! every answer must be a public address.

use std::net::IpAddr;
use url::{Host, Url};

/// Error type for SSRF validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsrfError {
    #[error("blocked IP: {0} (private/reserved)")]
    BlockedIp(IpAddr),

    #[error("blocked host: {0}")]
    BlockedHost(String),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),
}

/// Check if an IP address is private, reserved, or otherwise blocked.
///
/// This covers:
/// - Loopback addresses (127.0.0.0/8, ::1)
/// - RFC 1918 private ranges (10/8, 172.16/12, 192.168/16)
/// - Link-local addresses (169.254/16, fe80::/10)
/// - Multicast and broadcast
/// - Unspecified addresses (0.0.0.0/8, ::)
/// - IPv6 unique local (fc00::/7)
/// - IPv4-mapped IPv6 addresses of any of the above
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_or_reserved(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

pub fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Synchronous check on the URL alone: IP-literal hosts and `localhost`.
///
/// Used by the redirect policy, which cannot resolve names.
pub fn check_literal_host(url: &Url) -> Result<(), SsrfError> {
    match url.host() {
        Some(Host::Ipv4(v4)) => validate_ip(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => validate_ip(IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            if domain == "localhost" || domain.ends_with(".localhost") {
                Err(SsrfError::BlockedHost(domain.to_string()))
            } else {
                Ok(())
            }
        }
        None => Err(SsrfError::BlockedHost(String::new())),
    }
}

/// Resolve the URL's host and require every answer to be public.
pub async fn check_resolved(url: &Url) -> Result<(), SsrfError> {
    check_literal_host(url)?;

    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| SsrfError::DnsError(format!("{domain}: {e}")))?;

    let mut resolved = 0usize;
    for addr in addrs {
        validate_ip(addr.ip())?;
        resolved += 1;
    }

    if resolved == 0 {
        return Err(SsrfError::DnsError(format!("{domain}: no addresses")));
    }

    Ok(())
}
