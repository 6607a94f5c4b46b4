use std::net::IpAddr;

use http::HeaderMap;

use crate::fingerprinting::forwarded;

/// Resolve the client address of a request
///
/// Returns the first entry of `X-Forwarded-For` that is a valid IP address.
/// Entries that are not addresses are skipped, so junk injected by a client
/// never becomes the recorded address. Without a usable entry the peer
/// address is used with its port stripped, or verbatim if it cannot be split.
pub fn resolve_client_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    let forwarded_ip = headers
        .get_all(forwarded::FOR)
        .iter()
        .flat_map(|value| value.as_bytes().split(|b| *b == b','))
        // an entry with non-UTF-8 bytes is skipped on its own
        .filter_map(|entry| std::str::from_utf8(entry).ok())
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok());

    if let Some(ip) = forwarded_ip {
        return ip.to_string();
    }

    match split_host_port(remote_addr) {
        Some(host) => host.to_string(),
        None => remote_addr.to_string(),
    }
}

/// Host part of `host:port` or `[host]:port`
fn split_host_port(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        after.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        // unbracketed IPv6 or several colons
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn xff(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(forwarded::FOR, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn first_forwarded_entry_wins() {
        assert_eq!(resolve_client_ip(&xff("10.0.0.5, 192.168.1.1"), "127.0.0.1:80"), "10.0.0.5");
    }

    #[test]
    fn invalid_forwarded_entries_are_skipped() {
        assert_eq!(resolve_client_ip(&xff("not-an-ip, 8.8.8.8"), "127.0.0.1:80"), "8.8.8.8");
        assert_eq!(resolve_client_ip(&xff(" , 2001:db8::1 "), "127.0.0.1:80"), "2001:db8::1");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, "203.0.113.9:54321"), "203.0.113.9");
        assert_eq!(resolve_client_ip(&headers, "[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(resolve_client_ip(&xff("junk, more-junk"), "203.0.113.9:1"), "203.0.113.9");
        assert_eq!(resolve_client_ip(&xff(""), "203.0.113.9:1"), "203.0.113.9");
    }

    #[test]
    fn malformed_peer_address_is_returned_verbatim() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, "garbage"), "garbage");
        assert_eq!(resolve_client_ip(&headers, "2001:db8::1"), "2001:db8::1");
        assert_eq!(resolve_client_ip(&headers, "[2001:db8::1"), "[2001:db8::1");
    }

    #[test]
    fn opaque_bytes_do_not_hide_later_entries() -> Result<(), http::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(forwarded::FOR, HeaderValue::from_bytes(b"\xff-junk, 8.8.8.8")?);
        assert_eq!(resolve_client_ip(&headers, "10.1.1.1:80"), "8.8.8.8");

        headers.insert(forwarded::FOR, HeaderValue::from_bytes(b"\xfe\xff")?);
        assert_eq!(resolve_client_ip(&headers, "10.1.1.1:80"), "10.1.1.1");
        Ok(())
    }

    #[test]
    fn multiple_header_lines_are_scanned_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(forwarded::FOR, HeaderValue::from_static("unknown"));
        headers.append(forwarded::FOR, HeaderValue::from_static("198.51.100.20, 10.0.0.1"));
        assert_eq!(resolve_client_ip(&headers, "127.0.0.1:80"), "198.51.100.20");
    }
}
