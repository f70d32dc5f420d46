//! Metric declarations for the meshlink client.
//!
//! Every metric the client records is declared once in [`metric_defs`] as a
//! [`Metric`] constant, so call sites never spell a metric name by hand. The
//! `metrics` crate is re-exported; install any recorder before calling
//! [`describe_metrics`].
//!
//! ```rust,ignore
//! use meshlink_metrics::{describe_metrics, metric_defs, LinkLabels};
//!
//! describe_metrics();
//!
//! let labels = LinkLabels::new("serial");
//! metrics::counter!(metric_defs::QUEUE_ENQUEUED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// What kind of instrument a [`Metric`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

/// A metric name together with the metadata handed to the recorder.
///
/// ```rust
/// use meshlink_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("meshlink.example.retries")
///     .with_description("Retried writes")
///     .with_unit(Unit::Count);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys recorded alongside the metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description and unit with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All metrics recorded by the client.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every client metric.
    pub const LINK_LABELS: &[&str] = &["link"];

    // ========================================================================
    // Stream framing
    // ========================================================================

    pub const FRAME_DECODED: Metric = Metric::counter("meshlink.frame.decoded")
        .with_description("Complete frames decoded from the device stream")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    pub const FRAME_DEBUG_BYTES: Metric = Metric::counter("meshlink.frame.debug_bytes")
        .with_description("Bytes received outside of any frame")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    /// Frame payloads that did not decode as a device envelope.
    pub const FRAME_UNDECODABLE: Metric = Metric::counter("meshlink.frame.undecodable")
        .with_description("Frames whose payload failed to decode")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Outbound queue
    // ========================================================================

    pub const QUEUE_ENQUEUED: Metric = Metric::counter("meshlink.queue.enqueued")
        .with_description("Packets accepted into the outbound queue")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    pub const QUEUE_WRITTEN: Metric = Metric::counter("meshlink.queue.written")
        .with_description("Packets written to the transport")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    pub const QUEUE_ACKED: Metric = Metric::counter("meshlink.queue.acked")
        .with_description("Packets resolved by an acknowledgement")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Labels: link, reason (`routing`, `timeout`, `dropped`, `duplicate`)
    pub const QUEUE_FAILED: Metric = Metric::counter("meshlink.queue.failed")
        .with_description("Packets that completed with an error")
        .with_unit(Unit::Count)
        .with_labels(&["link", "reason"]);

    pub const QUEUE_WRITE_ERRORS: Metric = Metric::counter("meshlink.queue.write_errors")
        .with_description("Transport write failures while draining the queue")
        .with_unit(Unit::Count)
        .with_labels(&["link", "fatal"]);

    pub const QUEUE_DEPTH: Metric = Metric::gauge("meshlink.queue.depth")
        .with_description("Packets currently held in the outbound queue")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Time from enqueue until the packet is resolved either way.
    pub const QUEUE_LATENCY: Metric = Metric::histogram("meshlink.queue.latency_ms")
        .with_description("Time from enqueue to completion")
        .with_unit(Unit::Milliseconds)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Session
    // ========================================================================

    /// Labels: link, status
    pub const SESSION_STATUS_CHANGES: Metric = Metric::counter("meshlink.session.status_changes")
        .with_description("Device status transitions")
        .with_unit(Unit::Count)
        .with_labels(&["link", "status"]);

    pub const SESSION_DISPATCH_ERRORS: Metric = Metric::counter("meshlink.session.dispatch_errors")
        .with_description("Inbound packets that could not be dispatched")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // File transfer
    // ========================================================================

    pub const XMODEM_CHUNKS_SENT: Metric = Metric::counter("meshlink.xmodem.chunks_sent")
        .with_description("XModem data chunks sent, including retransmissions")
        .with_unit(Unit::Count);

    pub const XMODEM_CHUNKS_RECEIVED: Metric = Metric::counter("meshlink.xmodem.chunks_received")
        .with_description("XModem data chunks accepted")
        .with_unit(Unit::Count);

    pub const XMODEM_CRC_FAILURES: Metric = Metric::counter("meshlink.xmodem.crc_failures")
        .with_description("XModem chunks rejected for a checksum mismatch")
        .with_unit(Unit::Count);

    /// Every declared metric, in declaration order.
    pub const ALL: &[&Metric] = &[
        &FRAME_DECODED,
        &FRAME_DEBUG_BYTES,
        &FRAME_UNDECODABLE,
        &QUEUE_ENQUEUED,
        &QUEUE_WRITTEN,
        &QUEUE_ACKED,
        &QUEUE_FAILED,
        &QUEUE_WRITE_ERRORS,
        &QUEUE_DEPTH,
        &QUEUE_LATENCY,
        &SESSION_STATUS_CHANGES,
        &SESSION_DISPATCH_ERRORS,
        &XMODEM_CHUNKS_SENT,
        &XMODEM_CHUNKS_RECEIVED,
        &XMODEM_CRC_FAILURES,
    ];
}

/// Labels identifying which link a metric was recorded on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLabels {
    /// Link kind, e.g. `serial` or `bluetooth`.
    pub link: String,
}

impl LinkLabels {
    pub fn new(link: impl Into<String>) -> Self {
        Self { link: link.into() }
    }

    /// Key/value pairs in the form the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("link", self.link.clone())]
    }

    /// Base labels plus `extra`.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
