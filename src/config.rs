//! Application configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detect::DetectorConfig;
use crate::webrtc::{CodecBackend, WebRtcConfig};

/// Application configuration, assembled from CLI arguments in `main`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen address
    pub address: IpAddr,
    /// HTTP port
    pub port: u16,
    /// Directory the static assets (index.html, client script) live in
    pub static_dir: PathBuf,
    /// Detection configuration
    pub detector: DetectorConfig,
    /// Video codec backend for the processed outbound track
    pub codec: CodecBackend,
    /// WebRTC configuration
    pub webrtc: WebRtcConfig,
}

impl AppConfig {
    /// Socket address to bind the HTTP server on
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Path of the page served at `/`
    pub fn index_path(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            static_dir: PathBuf::from("static"),
            detector: DetectorConfig::default(),
            codec: CodecBackend::default(),
            webrtc: WebRtcConfig::default(),
        }
    }
}
