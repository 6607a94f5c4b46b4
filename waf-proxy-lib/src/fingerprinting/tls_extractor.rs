use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::debug;

use super::ja4::Ja4Fingerprints;
use crate::telemetry::Metrics;

/// TLS record header: content type (1) + version (2) + length (2)
const TLS_RECORD_HEADER_LEN: usize = 5;
const MAX_CLIENT_HELLO_BYTES: usize = 64 * 1024;

/// Reads the TLS ClientHello from the stream and extracts JA4 fingerprints
///
/// Returns every byte consumed from the stream so the caller can replay them
/// into the TLS acceptor.
pub async fn read_client_hello<S>(
    stream: &mut S,
    metrics: Option<&Arc<Metrics>>,
) -> std::io::Result<(Vec<u8>, Option<Ja4Fingerprints>)>
where
    S: AsyncRead + Unpin,
{
    use huginn_net_tls::tls_process::parse_tls_client_hello;

    let start = Instant::now();
    let mut buf = Vec::with_capacity(8192);
    loop {
        if buf.len() >= TLS_RECORD_HEADER_LEN {
            let len = u16::from_be_bytes([buf[3], buf[4]]) as usize;
            let needed = len.saturating_add(TLS_RECORD_HEADER_LEN);
            if buf.len() >= needed {
                break;
            }
        }
        let read = stream.read_buf(&mut buf).await?;
        if read == 0 {
            break;
        }
        if buf.len() > MAX_CLIENT_HELLO_BYTES {
            break;
        }
    }

    let fingerprints = parse_tls_client_hello(&buf).ok().map(|signature| {
        Ja4Fingerprints::from_payloads(&signature.generate_ja4(), &signature.generate_ja4_original())
    });

    let duration = start.elapsed().as_secs_f64();
    debug!(found = fingerprints.is_some(), bytes = buf.len(), "client hello parsed");

    if let Some(m) = metrics {
        m.record_tls_fingerprint(fingerprints.is_some(), duration);
    }

    Ok((buf, fingerprints))
}
