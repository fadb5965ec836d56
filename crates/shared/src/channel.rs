//! Channel naming.
//!
//! A session's channel name is derived from its public join code alone.
//! There is no secret in it, so channel membership is advisory.

use tavern_domain::{DomainError, JoinCode};

pub const CHANNEL_PREFIX: &str = "session-";

pub fn channel_name(join_code: &JoinCode) -> String {
    format!("{CHANNEL_PREFIX}{join_code}")
}

/// Recover the join code from a channel name.
pub fn join_code_from_channel(channel: &str) -> Result<JoinCode, DomainError> {
    let code = channel
        .strip_prefix(CHANNEL_PREFIX)
        .ok_or_else(|| DomainError::parse(format!("Not a session channel: {channel}")))?;
    JoinCode::new(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_uses_session_prefix() {
        let code = JoinCode::new("ABCD").unwrap();
        assert_eq!(channel_name(&code), "session-ABCD");
    }

    #[test]
    fn join_code_is_recovered_from_channel() {
        let code = join_code_from_channel("session-ABCD").unwrap();
        assert_eq!(code.as_str(), "ABCD");
    }

    #[test]
    fn foreign_channel_names_are_rejected() {
        assert!(join_code_from_channel("lobby").is_err());
        assert!(join_code_from_channel("session-").is_err());
    }
}
