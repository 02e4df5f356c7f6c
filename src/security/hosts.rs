//! Host/URL validation for outbound object-storage requests.
//!
//! A [`TrustedHosts`] set is built once from the configured storage base
//! URL(s). A target URL is allowed only when:
//!
//! 1. its scheme is `http` or `https`;
//! 2. plain `http` targets a local host (loopback, private range,
//!    `localhost`, or a configured local suffix such as `.local`);
//! 3. its normalised `host:port` is one of the configured authorities.
//!
//! Validation never errors; it answers `true` or `false`.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Allow-set of storage authorities plus the local-host policy for plain http.
#[derive(Debug, Clone, Default)]
pub struct TrustedHosts {
    allowed: HashSet<String>,
    local_suffixes: Vec<String>,
}

impl TrustedHosts {
    /// Build the allow-set from base URLs. Unparseable or host-less entries
    /// are skipped, so an invalid base simply allows nothing.
    pub fn from_base_urls<'a, I>(urls: I, local_suffixes: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let allowed = urls
            .into_iter()
            .filter_map(|raw| Url::parse(raw.trim()).ok())
            .filter_map(|url| authority(&url))
            .collect();
        let local_suffixes = local_suffixes
            .iter()
            .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            allowed,
            local_suffixes,
        }
    }

    /// `true` when `url` may be requested.
    pub fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host() else {
            return false;
        };
        match url.scheme() {
            "https" => {}
            "http" if self.is_local(&host) => {}
            _ => return false,
        }
        authority(url).is_some_and(|a| self.allowed.contains(&a))
    }

    /// String convenience over [`is_allowed`](Self::is_allowed).
    pub fn is_allowed_str(&self, raw: &str) -> bool {
        Url::parse(raw).is_ok_and(|url| self.is_allowed(&url))
    }

    /// Number of configured authorities.
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    fn is_local(&self, host: &Host<&str>) -> bool {
        match host {
            Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(*ip)),
            Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(*ip)),
            Host::Domain(name) => {
                let name = name.trim_end_matches('.').to_ascii_lowercase();
                name == "localhost"
                    || name.ends_with(".localhost")
                    || self
                        .local_suffixes
                        .iter()
                        .any(|suffix| name.ends_with(&format!(".{suffix}")))
            }
        }
    }
}

/// Normalised `host:port` with the scheme's default port filled in.
pub fn authority(url: &Url) -> Option<String> {
    let host = match url.host()? {
        Host::Domain(name) => name.trim_end_matches('.').to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => format!("[{ip}]"),
    };
    let port = url.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

/// Loopback, RFC 1918, link-local and IPv6 unique-local addresses.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => is_private_v6(v6),
        },
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(urls: &[&str]) -> TrustedHosts {
        TrustedHosts::from_base_urls(urls.iter().copied(), &[".local".to_string()])
    }

    #[test]
    fn https_configured_host_allowed() {
        let t = hosts(&["https://storage.example.com"]);
        assert!(t.is_allowed_str("https://storage.example.com/storage/v1/object/a/b"));
        assert!(t.is_allowed_str("https://STORAGE.example.com:443/x"));
    }

    #[test]
    fn unknown_host_denied() {
        let t = hosts(&["https://storage.example.com"]);
        assert!(!t.is_allowed_str("https://evil.example.com/x"));
        assert!(!t.is_allowed_str("https://storage.example.com.evil.io/x"));
    }

    #[test]
    fn port_must_match() {
        let t = hosts(&["https://storage.example.com"]);
        assert!(!t.is_allowed_str("https://storage.example.com:8443/x"));
    }

    #[test]
    fn non_http_schemes_denied() {
        let t = hosts(&["https://storage.example.com", "ftp://files.local"]);
        assert!(!t.is_allowed_str("ftp://files.local/x"));
        assert!(!t.is_allowed_str("file:///etc/passwd"));
        assert!(!t.is_allowed_str("gopher://storage.example.com/x"));
    }

    #[test]
    fn plain_http_public_host_denied_even_if_listed() {
        let t = hosts(&["http://storage.example.com"]);
        assert!(!t.is_allowed_str("http://storage.example.com/x"));
    }

    #[test]
    fn plain_http_local_hosts_allowed_when_listed() {
        let t = hosts(&[
            "http://127.0.0.1:54321",
            "http://supabase.local:8000",
            "http://10.1.2.3:9000",
            "http://localhost:54321",
            "http://[::1]:8080",
            "http://[fd00::1]:8080",
        ]);
        assert!(t.is_allowed_str("http://127.0.0.1:54321/a"));
        assert!(t.is_allowed_str("http://supabase.local:8000/a"));
        assert!(t.is_allowed_str("http://10.1.2.3:9000/a"));
        assert!(t.is_allowed_str("http://LOCALHOST:54321/a"));
        assert!(t.is_allowed_str("http://[::1]:8080/a"));
        assert!(t.is_allowed_str("http://[fd00::1]:8080/a"));
        assert!(!t.is_allowed_str("http://127.0.0.1:9999/a"));
    }

    #[test]
    fn custom_local_suffix() {
        let t = TrustedHosts::from_base_urls(["http://minio.lan:9000"], &["lan".to_string()]);
        assert!(t.is_allowed_str("http://minio.lan:9000/a"));
    }

    #[test]
    fn invalid_base_allows_nothing() {
        let t = hosts(&["not a url", ""]);
        assert!(t.is_empty());
        assert!(!t.is_allowed_str("https://anything.example.com/"));
    }

    #[test]
    fn private_ip_classification() {
        assert!(is_private_ip(&"192.168.1.10".parse().unwrap()));
        assert!(is_private_ip(&"172.16.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.1.1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(is_private_ip(&"::ffff:10.0.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860::8888".parse().unwrap()));
    }

    #[test]
    fn authority_fills_default_port() {
        let url = Url::parse("https://Storage.Example.com/x").unwrap();
        assert_eq!(authority(&url).as_deref(), Some("storage.example.com:443"));
        let url = Url::parse("http://[::1]/x").unwrap();
        assert_eq!(authority(&url).as_deref(), Some("[::1]:80"));
    }
}
