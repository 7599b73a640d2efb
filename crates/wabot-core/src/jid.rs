//! Helpers for chat and user identifiers.
//!
//! Identifiers are plain strings of the form `user[:device]@server`. The core
//! only needs a handful of facts about them, so they are not wrapped in a
//! newtype.

/// The reserved chat identifier for ambient status updates.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Server suffix for group chats.
pub const GROUP_SERVER: &str = "g.us";

/// Server suffix for individual users.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Returns `true` if the identifier is the broadcast/status channel.
pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST
}

/// Returns `true` if the identifier denotes a group chat.
pub fn is_group(jid: &str) -> bool {
    jid.ends_with(&format!("@{GROUP_SERVER}"))
}

/// Returns the user part of an identifier, without device or server.
///
/// `"94770000000:12@s.whatsapp.net"` becomes `"94770000000"`.
pub fn user_part(jid: &str) -> &str {
    let user = jid.split('@').next().unwrap_or(jid);
    user.split(':').next().unwrap_or(user)
}

/// Strips the device suffix from a user identifier.
///
/// `"94770000000:12@s.whatsapp.net"` becomes `"94770000000@s.whatsapp.net"`.
/// Identifiers without a device suffix are returned unchanged.
pub fn normalize_user(jid: &str) -> String {
    match jid.split_once('@') {
        Some((user, server)) => {
            let user = user.split(':').next().unwrap_or(user);
            format!("{user}@{server}")
        }
        None => jid.to_string(),
    }
}

/// Builds a user identifier from a bare phone number.
pub fn user_jid(number: &str) -> String {
    if number.contains('@') {
        normalize_user(number)
    } else {
        format!("{number}@{USER_SERVER}")
    }
}
