//! Destination address validation.
//!
//! A hostname is safe only if every address it resolves to is safe. Rejecting
//! on any single unsafe address defends against DNS rebinding, where a public
//! address is returned alongside an internal one.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tokio::net::lookup_host;
use tracing::warn;

use super::types::{SafeNetError, SafeTarget, SafetyPolicy};

/// The fixed AWS IPv6 instance-metadata address.
const AWS_METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Validate a single address against the policy.
pub fn is_ip_safe(addr: IpAddr, policy: &SafetyPolicy) -> bool {
    match addr {
        IpAddr::V4(v4) => is_ipv4_safe(v4, policy),
        IpAddr::V6(v6) => is_ipv6_safe(v6, policy),
    }
}

fn is_ipv4_safe(addr: Ipv4Addr, policy: &SafetyPolicy) -> bool {
    // The cloud-metadata block is rejected regardless of policy.
    if addr.is_link_local() {
        return false;
    }
    if addr.is_unspecified() || addr.is_broadcast() {
        return false;
    }
    if !policy.allow_private && (addr.is_private() || addr.is_loopback()) {
        return false;
    }
    true
}

fn is_ipv6_safe(addr: Ipv6Addr, policy: &SafetyPolicy) -> bool {
    // IPv4-mapped encodings are classified as the IPv4 address they wrap,
    // so ::ffff:169.254.169.254 cannot slip through.
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_ipv4_safe(v4, policy);
    }
    if addr == AWS_METADATA_V6 {
        return false;
    }
    // fe80::/10 link-local.
    if (addr.segments()[0] & 0xffc0) == 0xfe80 {
        return false;
    }
    if addr.is_unspecified() {
        return false;
    }
    if !policy.allow_private {
        if addr.is_loopback() {
            return false;
        }
        // fc00::/7 unique-local.
        if (addr.segments()[0] & 0xfe00) == 0xfc00 {
            return false;
        }
    }
    true
}

/// Parse and validate a URL, resolving its hostname if needed.
///
/// Every resolved address must pass [`is_ip_safe`]; one unsafe address
/// rejects the whole hostname.
pub async fn resolve_safe(url: &str, policy: &SafetyPolicy) -> Result<SafeTarget, SafeNetError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| SafeNetError::InvalidUrl(e.to_string()))?;

    let scheme = parsed.scheme().to_string();
    if scheme != "http" && scheme != "https" {
        return Err(SafeNetError::UnsupportedScheme(scheme));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| SafeNetError::InvalidUrl("URL has no host".to_string()))?
        .trim_matches(['[', ']'])
        .to_string();
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| SafeNetError::InvalidUrl("URL has no port".to_string()))?;

    // Literal IP: validate directly, no DNS involved.
    if let Ok(addr) = host.parse::<IpAddr>() {
        if !is_ip_safe(addr, policy) {
            crate::metrics::SSRF_REJECTIONS.inc();
            warn!(host = %host, addr = %addr, "Blocked unsafe literal address");
            return Err(SafeNetError::UnsafeAddress { host, addr });
        }
        return Ok(SafeTarget {
            scheme,
            host,
            port,
            addr,
        });
    }

    let addrs: Vec<IpAddr> = lookup_host((host.as_str(), port))
        .await
        .map_err(|e| SafeNetError::DnsFailed {
            host: host.clone(),
            reason: e.to_string(),
        })?
        .map(|sa| sa.ip())
        .collect();

    if addrs.is_empty() {
        return Err(SafeNetError::NoAddresses(host));
    }

    for addr in &addrs {
        if !is_ip_safe(*addr, policy) {
            crate::metrics::SSRF_REJECTIONS.inc();
            warn!(host = %host, addr = %addr, "Blocked hostname resolving to unsafe address");
            return Err(SafeNetError::UnsafeAddress { host, addr: *addr });
        }
    }

    Ok(SafeTarget {
        scheme,
        host,
        port,
        addr: addrs[0],
    })
}

/// Convenience wrapper: true if the URL's destination validates.
pub async fn is_safe(url: &str, policy: &SafetyPolicy) -> bool {
    resolve_safe(url, policy).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_metadata_block_always_unsafe() {
        let default = SafetyPolicy::default();
        let strict = SafetyPolicy::strict();
        assert!(!is_ip_safe(v4("169.254.169.254"), &default));
        assert!(!is_ip_safe(v4("169.254.169.254"), &strict));
        assert!(!is_ip_safe(v4("169.254.0.1"), &default));
    }

    #[test]
    fn test_private_ranges_policy_dependent() {
        let default = SafetyPolicy::default();
        let strict = SafetyPolicy::strict();

        for ip in ["10.0.0.1", "172.16.5.5", "192.168.1.1", "127.0.0.1"] {
            assert!(is_ip_safe(v4(ip), &default), "{ip} should be allowed by default");
            assert!(!is_ip_safe(v4(ip), &strict), "{ip} should be rejected in strict mode");
        }
    }

    #[test]
    fn test_public_always_safe() {
        let strict = SafetyPolicy::strict();
        assert!(is_ip_safe(v4("8.8.8.8"), &strict));
        assert!(is_ip_safe(v6("2001:4860:4860::8888"), &strict));
    }

    #[test]
    fn test_ipv6_link_local_always_unsafe() {
        let default = SafetyPolicy::default();
        assert!(!is_ip_safe(v6("fe80::1"), &default));
        assert!(!is_ip_safe(v6("febf::1"), &default));
        // fec0:: is outside fe80::/10
        assert!(is_ip_safe(v6("fec0::1"), &default));
    }

    #[test]
    fn test_aws_metadata_v6_always_unsafe() {
        let default = SafetyPolicy::default();
        assert!(!is_ip_safe(v6("fd00:ec2::254"), &default));
    }

    #[test]
    fn test_ipv4_mapped_classified_as_v4() {
        let default = SafetyPolicy::default();
        let strict = SafetyPolicy::strict();
        assert!(!is_ip_safe(v6("::ffff:169.254.169.254"), &default));
        assert!(!is_ip_safe(v6("::ffff:10.0.0.1"), &strict));
        assert!(is_ip_safe(v6("::ffff:8.8.8.8"), &strict));
    }

    #[test]
    fn test_unique_local_policy_dependent() {
        let default = SafetyPolicy::default();
        let strict = SafetyPolicy::strict();
        assert!(is_ip_safe(v6("fd12::1"), &default));
        assert!(!is_ip_safe(v6("fd12::1"), &strict));
        assert!(!is_ip_safe(v6("::1"), &strict));
        assert!(is_ip_safe(v6("::1"), &default));
    }

    #[tokio::test]
    async fn test_is_safe_loopback_default_vs_strict() {
        assert!(is_safe("http://127.0.0.1", &SafetyPolicy::default()).await);
        assert!(!is_safe("http://127.0.0.1", &SafetyPolicy::strict()).await);
    }

    #[tokio::test]
    async fn test_literal_metadata_url_rejected() {
        let result = resolve_safe("http://169.254.169.254/latest/meta-data", &SafetyPolicy::default()).await;
        assert!(matches!(result, Err(SafeNetError::UnsafeAddress { .. })));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let result = resolve_safe("ftp://example.com/file", &SafetyPolicy::default()).await;
        assert!(matches!(result, Err(SafeNetError::UnsupportedScheme(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = resolve_safe("not a url", &SafetyPolicy::default()).await;
        assert!(matches!(result, Err(SafeNetError::InvalidUrl(_))));
    }
}
