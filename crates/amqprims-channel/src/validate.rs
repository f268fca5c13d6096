//! Local checks on exchange and queue names, applied before any frame is
//! sent.

use crate::error::{ChannelError, Result};

const MAX_NAME_LEN: usize = 255;
const RESERVED_PREFIX: &str = "amq.";

pub(crate) fn validate_exchange_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("exchange", name, "name must not be empty"));
    }
    validate_name("exchange", name)
}

/// Queue names may be empty; the server then picks one.
pub(crate) fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Ok(());
    }
    validate_name("queue", name)
}

fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(kind, name, "name is longer than 255 bytes"));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(invalid(kind, name, "the amq. prefix is reserved"));
    }
    if !name.chars().all(is_name_char) {
        return Err(invalid(
            kind,
            name,
            "only letters, digits, '-', '_', '.' and ':' are allowed",
        ));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn invalid(kind: &'static str, name: &str, reason: &'static str) -> ChannelError {
    ChannelError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    }
}
