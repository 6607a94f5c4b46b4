/// Default HTTP header names for fingerprint injection
///
/// Every name can be overridden in the `[fingerprint]` configuration section.
pub mod names {
    /// Header name for TLS (JA4) fingerprint injection
    ///
    /// This header contains the JA4 fingerprint normalized from the TLS ClientHello.
    /// It is injected for TLS connections when fingerprinting is enabled.
    pub const JA4: &str = "x-ja4-fingerprint";

    /// Header name for TLS JA4_r fingerprint injection
    ///
    /// JA4_r keeps cipher suites and extensions in original ClientHello order.
    pub const JA4_R: &str = "x-ja4-r-fingerprint";

    /// Header name for HTTP/2 (Akamai) fingerprint injection
    ///
    /// This header contains the Akamai-style fingerprint extracted from HTTP/2 frames.
    /// It is only injected for HTTP/2 connections when fingerprinting is enabled.
    pub const HTTP2_AKAMAI: &str = "x-http2-fingerprint";
}

/// Header names the proxy always writes on the outbound request
pub mod forwarded {
    /// Header name for X-Forwarded-For
    ///
    /// Replaced by the single resolved client address.
    pub const FOR: &str = "x-forwarded-for";

    /// Header name for the per-request correlation identifier
    pub const REQUEST_ID: &str = "x-request-id";

    /// Host the client asked for, taken from `Host` or the HTTP/2 authority
    pub const HOST: &str = "x-forwarded-host";

    /// Source port of the client connection
    pub const PORT: &str = "x-forwarded-port";

    /// `https` when the client connection was TLS, `http` otherwise
    pub const PROTO: &str = "x-forwarded-proto";
}
