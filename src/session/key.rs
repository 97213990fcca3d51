use serenity::model::id::{GuildId, MessageId, UserId};
use std::fmt;

/// Correlation key for one user's session on one rendered response.
///
/// Built from three Discord snowflakes joined by `-`. Snowflakes are decimal,
/// so the delimiter can never appear inside a component and the encoding is
/// unambiguous. Equality is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn derive(guild_id: GuildId, user_id: UserId, message_id: MessageId) -> Self {
        Self(format!("{}-{}-{}", guild_id, user_id, message_id))
    }

    /// Wraps a key recovered from a component custom id.
    pub(crate) fn from_raw(raw: &str) -> Self {
        Self(raw.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
