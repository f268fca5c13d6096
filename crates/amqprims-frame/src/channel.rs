//! Channel number conventions.
//!
//! Channel 0 carries connection-level methods and heartbeats.
//! Channels 1..=channel_max are opened by the client for application work.

/// Connection-level traffic (start/tune/open/close, heartbeats).
pub const CONNECTION: u16 = 0;

/// First channel id handed out to applications.
pub const FIRST_CHANNEL: u16 = 1;

/// Channel limit used when the server does not negotiate a lower one.
pub const DEFAULT_CHANNEL_MAX: u16 = 2047;

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u16) -> &'static str {
    match id {
        CONNECTION => "CONNECTION",
        _ => "CHANNEL",
    }
}

/// Returns true if the channel ID carries connection-level traffic.
pub fn is_connection(id: u16) -> bool {
    id == CONNECTION
}
