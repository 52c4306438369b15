//! UDP ASSOCIATE support

mod packet;
mod relay;

pub use packet::{encode_udp_frame, parse_udp_frame, UdpFrame};
pub use relay::UdpSession;
