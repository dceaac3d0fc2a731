//! Frame to record conversion.
//!
//! Field extraction follows an explicit ordered fallback per field, without
//! ever failing on an absent optional attribute:
//! - addresses: link layer (`eth`), then network layer (`ip`, `ipv6`)
//! - ports: `tcp`, then `udp`
//!
//! Only the timestamp, the protocol and the length are mandatory. A frame
//! missing one of them (or carrying a malformed length) is reported as a
//! [`ParseError`], logged, and skipped by the caller. A malformed port is
//! logged and treated like an absent one.

use chrono::{DateTime, Utc};
use log::warn;

use crate::error_handling::types::ParseError;

use super::types::{Frame, Record};

const LINK_LAYERS: [&str; 1] = ["eth"];
const NETWORK_LAYERS: [&str; 2] = ["ip", "ipv6"];
const TRANSPORT_LAYERS: [&str; 2] = ["tcp", "udp"];

/// Parses `frame` against `base_time`.
///
/// Returns the record (or `None` when the frame could not be parsed) together
/// with the base time to use for the next frame. The base time is set by the
/// first frame that parses successfully and is never changed afterwards.
pub fn parse_frame(
    frame: &Frame,
    base_time: Option<DateTime<Utc>>,
) -> (Option<Record>, Option<DateTime<Utc>>) {
    match extract_record(frame, base_time) {
        Ok((record, base)) => (Some(record), Some(base)),
        Err(e) => {
            warn!("Skipping unparseable frame: {}", e);
            (None, base_time)
        }
    }
}

/// Fallible core of [`parse_frame`]; returns the record and the effective base time.
pub fn extract_record(
    frame: &Frame,
    base_time: Option<DateTime<Utc>>,
) -> Result<(Record, DateTime<Utc>), ParseError> {
    let sniff_time = frame.sniff_time.ok_or(ParseError::MissingTimestamp)?;
    let protocol = frame
        .highest_layer()
        .ok_or(ParseError::MissingProtocol)?
        .to_ascii_uppercase();

    let raw_length = frame
        .length
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingLength)?;
    let length = raw_length
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidLength(raw_length.to_string()))?;

    let source_port = port_field(frame, "srcport");
    let destination_port = port_field(frame, "dstport");

    let base = base_time.unwrap_or(sniff_time);

    let record = Record {
        relative_time: relative_seconds(base, sniff_time),
        source: address_field(frame, "src"),
        destination: address_field(frame, "dst"),
        protocol,
        length,
        source_port,
        destination_port,
        label: 0,
    };

    Ok((record, base))
}

/// Stateful wrapper carrying the base time across frames of one session.
#[derive(Debug, Default)]
pub struct FrameParser {
    base_time: Option<DateTime<Utc>>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_time(&self) -> Option<DateTime<Utc>> {
        self.base_time
    }

    pub fn parse(&mut self, frame: &Frame) -> Option<Record> {
        let (record, base) = parse_frame(frame, self.base_time);
        self.base_time = base;
        record
    }
}

fn first_field<'a>(frame: &'a Frame, layers: &[&str], field: &str) -> Option<&'a str> {
    layers.iter().find_map(|layer| frame.field(layer, field))
}

fn address_field(frame: &Frame, field: &str) -> Option<String> {
    first_field(frame, &LINK_LAYERS, field)
        .or_else(|| first_field(frame, &NETWORK_LAYERS, field))
        .map(str::to_string)
}

fn port_field(frame: &Frame, field: &str) -> Option<u16> {
    TRANSPORT_LAYERS.iter().find_map(|layer| {
        let raw = frame.field(layer, field)?;
        match raw.trim().parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!("Ignoring malformed {}.{} value {:?}", layer, field, raw);
                None
            }
        }
    })
}

// Nanosecond precision; a frame stamped before the base clamps to 0.
fn relative_seconds(base: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    let delta = at - base;
    match delta.num_nanoseconds() {
        Some(nanos) if nanos > 0 => nanos as f64 / 1e9,
        Some(_) => 0.0,
        None => delta.num_milliseconds().max(0) as f64 / 1e3,
    }
}
