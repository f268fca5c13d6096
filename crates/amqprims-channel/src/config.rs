use amqprims_frame::{DEFAULT_CHANNEL_MAX, DEFAULT_FRAME_MAX};

/// Limits negotiated for a connection during tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest frame either side may send, overhead included. 0 = no limit.
    pub frame_max: u32,
    /// Highest usable channel id. 0 = no limit.
    pub channel_max: u16,
}

impl ConnectionConfig {
    /// Highest channel id the factory may hand out.
    pub fn max_channel_id(&self) -> u16 {
        if self.channel_max == 0 {
            u16::MAX
        } else {
            self.channel_max
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            frame_max: DEFAULT_FRAME_MAX,
            channel_max: DEFAULT_CHANNEL_MAX,
        }
    }
}
