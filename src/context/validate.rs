//! Product URL validation
//!
//! Runs before any network call. Hosts given as literal private or internal
//! IP addresses are refused, since the relay would fetch them on our behalf.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::{Error, Result};

/// Parse and validate a product page URL
///
/// # Errors
///
/// Returns `Error::Validation` if:
/// - the URL is empty or does not parse
/// - the scheme is not http or https
/// - there is no host, or the host is a blocked IP literal
pub fn validate_product_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("product URL is empty".to_string()));
    }

    let parsed =
        Url::parse(trimmed).map_err(|e| Error::Validation(format!("invalid URL: {e}")))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::Validation(format!(
            "invalid scheme: {scheme}. Only http and https are allowed"
        )));
    }

    let blocked = match parsed.host() {
        None => return Err(Error::Validation("URL has no host".to_string())),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => is_blocked_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_blocked_ip(IpAddr::V6(ip)),
    };

    if blocked {
        return Err(Error::Validation(format!(
            "refusing to fetch private/internal host {}",
            parsed.host_str().unwrap_or_default()
        )));
    }

    Ok(parsed)
}

/// Check if an IP address is private or otherwise blocked
///
/// Blocks the following ranges:
/// - IPv4: 127.0.0.0/8 (loopback), 10.0.0.0/8, 172.16.0.0/12,
///   192.168.0.0/16 (private), 169.254.0.0/16 (link-local),
///   0.0.0.0/8 (current network)
/// - IPv6: `::1` (loopback), `fc00::/7` (unique local), `fe80::/10` (link-local), `::`
#[must_use]
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_blocked_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_blocked_ipv6(ipv6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0
        || a == 127
        || a == 10
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 169 && b == 254)
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }

    let first = ip.segments()[0];

    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_product_page() {
        let url = validate_product_url("https://shop.example/item/1").unwrap();
        assert_eq!(url.host_str(), Some("shop.example"));
    }

    #[test]
    fn test_trims_whitespace() {
        assert!(validate_product_url("  https://shop.example/item/1\n").is_ok());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(validate_product_url("   "), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            validate_product_url("not a url"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(matches!(
            validate_product_url("ftp://shop.example/item"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            validate_product_url("file:///etc/passwd"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_internal_hosts() {
        for url in [
            "http://127.0.0.1/admin",
            "http://localhost:8080/",
            "http://192.168.1.10/",
            "http://[::1]/",
            "http://[fd00::1]/",
        ] {
            assert!(
                matches!(validate_product_url(url), Err(Error::Validation(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_blocked_ipv4_ranges() {
        assert!(is_blocked_ip("10.255.255.255".parse().unwrap()));
        assert!(is_blocked_ip("172.16.0.1".parse().unwrap()));
        assert!(is_blocked_ip("172.31.255.255".parse().unwrap()));
        assert!(!is_blocked_ip("172.32.0.1".parse().unwrap()));
        assert!(is_blocked_ip("169.254.0.1".parse().unwrap()));
        assert!(is_blocked_ip("0.0.0.0".parse().unwrap()));
        assert!(!is_blocked_ip("93.184.216.34".parse().unwrap()));
    }

    #[test]
    fn test_blocked_ipv6_ranges() {
        assert!(is_blocked_ip("fe80::1234:5678:abcd:ef01".parse().unwrap()));
        assert!(is_blocked_ip("fc00::1".parse().unwrap()));
        assert!(is_blocked_ip("::".parse().unwrap()));
        assert!(!is_blocked_ip("2606:4700:4700::1111".parse().unwrap()));
    }
}
