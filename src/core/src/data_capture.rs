pub mod channel_capture;
pub mod frame_parser;
#[cfg(feature = "pcap")]
pub mod pcap_capture;
pub mod provider;
pub mod publisher;
pub mod replay_capture;
pub mod types;

pub use channel_capture::{ChannelProvider, ChannelSource, FrameFeeder};
pub use frame_parser::{parse_frame, FrameParser};
#[cfg(feature = "pcap")]
pub use pcap_capture::PcapProvider;
pub use provider::{CaptureProvider, FrameAbort, FrameSource};
pub use publisher::{BroadcastPublisher, Publisher};
pub use replay_capture::ReplayProvider;
pub use types::{Frame, Layer, Record, RecordEvent};
