//! WebRTC layer: signaling, peer lifecycle and the media transform path
//!
//! Control flow per connection:
//! ```text
//! POST /offer
//!     |
//!     v
//! PeerSession::new --> ConnectionRegistry::add --> LifecycleHooks::register
//!     |
//!     v
//! negotiate answer (remote desc -> answer -> local desc -> ICE gathering)
//!     |
//!     v  (connection's own event dispatch)
//! on_track(video) --> FrameTransformer wraps the inbound track
//!                     annotated frames -> outbound track
//! on_state(failed) --> close + deregister
//! ```

pub mod codec;
pub mod config;
pub mod h264;
pub mod peer;
pub mod registry;
pub mod signaling;
pub mod track;
pub mod transform;

pub use codec::{CodecBackend, CodecFactory, EncodedChunk, VideoDecoder, VideoEncoder};
pub use h264::H264CodecFactory;
pub use config::{TurnServer, WebRtcConfig};
pub use peer::{LifecycleHooks, PeerSession};
pub use registry::ConnectionRegistry;
pub use signaling::{ConnectionState, SessionDescription};
pub use track::{OutboundVideo, ProcessedVideoTrack, RemoteFrameSource};
pub use transform::{FrameSource, FrameTransformer};
