use std::time::Duration;

use crate::engine::MediaKind;

/// Settings for one negotiation session.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Media kind published on the send transport.
    pub produce_kind: MediaKind,
    /// Ask the SFU to allocate TCP candidates only.
    pub force_tcp: bool,
    /// Deadline for every signaling request/acknowledgement round trip.
    pub request_timeout: Duration,
    /// How long to wait for a transport to reach `connected`.
    pub connect_timeout: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            produce_kind: MediaKind::Video,
            force_tcp: false,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl NegotiationConfig {
    pub fn builder() -> NegotiationConfigBuilder {
        NegotiationConfigBuilder::new()
    }
}

/// Builder for [`NegotiationConfig`].
pub struct NegotiationConfigBuilder {
    config: NegotiationConfig,
}

impl NegotiationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: NegotiationConfig::default(),
        }
    }

    pub fn produce_kind(mut self, kind: MediaKind) -> Self {
        self.config.produce_kind = kind;
        self
    }

    pub fn force_tcp(mut self, force_tcp: bool) -> Self {
        self.config.force_tcp = force_tcp;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> NegotiationConfig {
        self.config
    }
}

impl Default for NegotiationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
