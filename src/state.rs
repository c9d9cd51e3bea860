use std::sync::Arc;

use crate::config::AppConfig;
use crate::detect::Detector;
use crate::webrtc::{CodecFactory, ConnectionRegistry};

/// Application-wide state shared across handlers
///
/// The connection registry is the single owner of live peer-connection
/// handles; the offer handler adds to it, the state-change hook and the
/// shutdown path remove from it.
pub struct AppState {
    /// Configuration
    pub config: AppConfig,
    /// Active peer connections
    pub registry: Arc<ConnectionRegistry>,
    /// Detection capability; `None` means frames pass through unannotated
    pub detector: Option<Arc<dyn Detector>>,
    /// Frame codec collaborator; `None` means RTP loopback
    pub codec: Option<Arc<dyn CodecFactory>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        detector: Option<Arc<dyn Detector>>,
        codec: Option<Arc<dyn CodecFactory>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            detector,
            codec,
        })
    }
}
