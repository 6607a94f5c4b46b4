use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use huginn_net_http::akamai_extractor::extract_akamai_fingerprint;
use huginn_net_http::http2_parser::Http2Parser;
use huginn_net_http::Http2FrameType;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry::Metrics;

/// HTTP/2 frame header: 3 length + 1 type + 1 flags + 4 stream id
const MIN_FRAME_LEN: usize = 9;

/// Client connection preface every HTTP/2 connection starts with
const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Stream wrapper that watches the first client bytes of a connection and
/// publishes the Akamai HTTP/2 fingerprint once SETTINGS and HEADERS frames
/// have both been seen.
///
/// All data passes through untouched. Capture stops after `max_capture`
/// bytes or once a fingerprint was extracted.
pub struct CapturingStream<S> {
    inner: S,
    fingerprint_tx: watch::Sender<Option<String>>,
    done: bool,
    max_capture: usize,
    buffer: Vec<u8>,
    parser: Http2Parser<'static>,
    parsed_offset: usize,
    // SETTINGS and HEADERS may arrive in different reads
    seen_settings_frame: bool,
    seen_headers_frame: bool,
    extraction_start: Instant,
    metrics: Option<Arc<Metrics>>,
}

impl<S> CapturingStream<S> {
    pub fn new(
        inner: S,
        max_capture: usize,
        metrics: Option<Arc<Metrics>>,
    ) -> (Self, watch::Receiver<Option<String>>) {
        let (fingerprint_tx, fingerprint_rx) = watch::channel(None);
        (
            Self {
                inner,
                fingerprint_tx,
                done: false,
                max_capture,
                buffer: Vec::with_capacity(max_capture.min(16 * 1024)),
                parser: Http2Parser::new(),
                parsed_offset: 0,
                seen_settings_frame: false,
                seen_headers_frame: false,
                extraction_start: Instant::now(),
                metrics,
            },
            fingerprint_rx,
        )
    }

    fn capture(&mut self, read_data: &[u8]) {
        let remaining = self.max_capture.saturating_sub(self.buffer.len());
        if remaining == 0 {
            self.give_up();
            return;
        }
        let to_capture = read_data.len().min(remaining);
        self.buffer.extend_from_slice(&read_data[..to_capture]);

        // HTTP/1.x: nothing to fingerprint, and not an extraction failure
        let seen = self.buffer.len().min(HTTP2_PREFACE.len());
        if self.buffer[..seen] != HTTP2_PREFACE[..seen] {
            debug!("not an HTTP/2 connection, skipping fingerprint capture");
            self.finish();
            return;
        }

        let frame_data = &self.buffer[self.parsed_offset..];
        if frame_data.len() < MIN_FRAME_LEN {
            return;
        }

        // parse errors usually mean more data is needed
        let Ok((frames, bytes_consumed)) = self.parser.parse_frames_skip_preface(frame_data)
        else {
            return;
        };
        if frames.is_empty() {
            return;
        }
        self.parsed_offset = self.parsed_offset.saturating_add(bytes_consumed);

        self.seen_settings_frame |= frames
            .iter()
            .any(|f| f.frame_type == Http2FrameType::Settings && f.stream_id == 0);
        self.seen_headers_frame |= frames
            .iter()
            .any(|f| f.frame_type == Http2FrameType::Headers && f.stream_id > 0);

        if !(self.seen_settings_frame && self.seen_headers_frame) {
            return;
        }

        let fingerprint = self
            .parser
            .parse_frames_skip_preface(&self.buffer)
            .ok()
            .and_then(|(all_frames, _)| extract_akamai_fingerprint(&all_frames).ok());

        if let Some(fingerprint) = fingerprint {
            debug!(fingerprint = %fingerprint.fingerprint, "http2 fingerprint extracted");
            let _ = self.fingerprint_tx.send(Some(fingerprint.fingerprint));
            if let Some(m) = &self.metrics {
                m.record_http2_fingerprint(true, self.extraction_start.elapsed().as_secs_f64());
            }
            self.finish();
        }
    }

    fn give_up(&mut self) {
        if let Some(m) = &self.metrics {
            m.record_http2_fingerprint(false, self.extraction_start.elapsed().as_secs_f64());
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer = Vec::new();
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CapturingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        let after = buf.filled().len();

        if after > before && !self.done {
            self.capture(&buf.filled()[before..after]);
        }

        result
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CapturingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
