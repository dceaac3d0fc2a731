//! Live capture through libpcap (cargo feature `pcap`).
//!
//! The pcap handle is read with a short timeout on a dedicated thread that
//! forwards frames into a [`ChannelSource`]; aborting the source releases the
//! session immediately, and the thread notices the closed flag on its next
//! timeout. Only the headers needed to expose `eth`, `ip`/`ipv6` and
//! `tcp`/`udp` layers are looked at.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::thread;

use chrono::DateTime;
use log::{debug, info};

use crate::error_handling::types::CaptureError;

use super::channel_capture::ChannelSource;
use super::provider::{CaptureProvider, FrameSource};
use super::types::{Frame, Layer};

const READ_TIMEOUT_MS: i32 = 250;
const SNAPLEN: i32 = 65535;

#[derive(Debug, Clone)]
pub struct PcapProvider {
    promiscuous: bool,
}

impl PcapProvider {
    pub fn new(promiscuous: bool) -> Self {
        Self { promiscuous }
    }
}

impl CaptureProvider for PcapProvider {
    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let mut cap = pcap::Capture::from_device(interface)
            .and_then(|c| {
                c.promisc(self.promiscuous)
                    .snaplen(SNAPLEN)
                    .timeout(READ_TIMEOUT_MS)
                    .open()
            })
            .map_err(|e| CaptureError::ProviderOpen(format!("{}: {}", interface, e)))?;
        info!("Opened live capture on {}", interface);

        let (feeder, source) = ChannelSource::pair(interface);
        let label = interface.to_string();
        thread::Builder::new()
            .name(format!("pcap-{}", interface))
            .spawn(move || loop {
                if feeder.is_closed() {
                    debug!("{}: pcap reader exiting", label);
                    return;
                }
                match cap.next_packet() {
                    Ok(packet) => {
                        let frame = dissect(
                            packet.header.ts.tv_sec as i64,
                            packet.header.ts.tv_usec as i64,
                            packet.header.len,
                            packet.data,
                        );
                        // Live traffic cannot wait for the loop; excess frames are dropped.
                        if feeder.offer(frame).is_err() {
                            return;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(pcap::Error::NoMorePackets) => return,
                    Err(e) => {
                        feeder.fail(e.to_string());
                        return;
                    }
                }
            })
            .map_err(|e| CaptureError::ProviderOpen(e.to_string()))?;

        Ok(Box::new(source))
    }
}

fn mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn dissect(secs: i64, usecs: i64, wire_len: u32, data: &[u8]) -> Frame {
    let mut frame = Frame {
        sniff_time: DateTime::from_timestamp(secs, (usecs.clamp(0, 999_999) * 1000) as u32),
        length: Some(wire_len.to_string()),
        layers: Vec::new(),
    };
    if data.len() < 14 {
        return frame;
    }
    frame.layers.push(
        Layer::new("eth")
            .with_field("dst", mac(&data[0..6]))
            .with_field("src", mac(&data[6..12])),
    );
    let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
    let mut offset = 14;
    if ethertype == 0x8100 && data.len() >= 18 {
        ethertype = u16::from_be_bytes([data[16], data[17]]);
        offset = 18;
    }
    let rest = &data[offset..];

    let (proto, transport) = match ethertype {
        0x0800 if rest.len() >= 20 => {
            let ihl = ((rest[0] & 0x0f) as usize) * 4;
            let src = Ipv4Addr::new(rest[12], rest[13], rest[14], rest[15]);
            let dst = Ipv4Addr::new(rest[16], rest[17], rest[18], rest[19]);
            frame.layers.push(
                Layer::new("ip")
                    .with_field("src", src.to_string())
                    .with_field("dst", dst.to_string()),
            );
            (rest[9], rest.get(ihl..).unwrap_or(&[]))
        }
        0x86dd if rest.len() >= 40 => {
            let mut src = [0u8; 16];
            let mut dst = [0u8; 16];
            src.copy_from_slice(&rest[8..24]);
            dst.copy_from_slice(&rest[24..40]);
            frame.layers.push(
                Layer::new("ipv6")
                    .with_field("src", Ipv6Addr::from(src).to_string())
                    .with_field("dst", Ipv6Addr::from(dst).to_string()),
            );
            (rest[6], &rest[40..])
        }
        0x0806 => {
            frame.layers.push(Layer::new("arp"));
            return frame;
        }
        _ => return frame,
    };

    let (name, header_len) = match proto {
        6 => ("tcp", 20),
        17 => ("udp", 8),
        1 => ("icmp", 0),
        58 => ("icmpv6", 0),
        _ => return frame,
    };
    if header_len == 0 {
        frame.layers.push(Layer::new(name));
        return frame;
    }
    if transport.len() < header_len {
        return frame;
    }
    let srcport = u16::from_be_bytes([transport[0], transport[1]]);
    let dstport = u16::from_be_bytes([transport[2], transport[3]]);
    frame.layers.push(
        Layer::new(name)
            .with_field("srcport", srcport.to_string())
            .with_field("dstport", dstport.to_string()),
    );
    let payload_offset = if name == "tcp" {
        ((transport[12] >> 4) as usize) * 4
    } else {
        header_len
    };
    if transport.len() > payload_offset {
        frame.layers.push(Layer::new("data"));
    }
    frame
}
