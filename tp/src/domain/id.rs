//! Session ID generation
//!
//! Generated IDs use the format: `{6-char-hex}-session-{uuid-tail}`
//! Example: `019430-session-7c1e9a2b`

/// Generate a fresh session id
pub fn generate_session_id() -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &uuid[..6];
    let tail = &uuid[uuid.len() - 8..];
    format!("{}-session-{}", hex_prefix, tail)
}
