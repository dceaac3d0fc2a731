use serde::{Deserialize, Serialize};

/// Which capture provider backs new sessions.
///
/// Defaults to live capture when built with the `pcap` feature, to replay
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Interface names are JSON-lines files of dissected frames.
    Replay,
    /// Live capture through libpcap (requires the `pcap` feature).
    Pcap,
}

impl Default for ProviderKind {
    fn default() -> Self {
        if cfg!(feature = "pcap") {
            ProviderKind::Pcap
        } else {
            ProviderKind::Replay
        }
    }
}
