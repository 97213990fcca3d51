//! Component custom ids: `<prefix><session key>`.
//!
//! These strings are the only state Discord carries between round trips, so
//! [`ComponentAction::custom_id`] and [`ComponentAction::parse`] must stay exact
//! inverses of each other.

use super::SessionKey;

pub const SELECT_PREFIX: &str = "play_select:";
pub const ADD5_PREFIX: &str = "play_add5:";
pub const ADD10_PREFIX: &str = "play_add10:";
pub const SHUFFLE_PREFIX: &str = "play_shuffle:";
pub const CANCEL_PREFIX: &str = "play_cancel:";

/// What a session component does when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    Select,
    AddRelated5,
    AddRelated10,
    Shuffle,
    Cancel,
}

impl ComponentAction {
    pub const ALL: [ComponentAction; 5] = [
        ComponentAction::Select,
        ComponentAction::AddRelated5,
        ComponentAction::AddRelated10,
        ComponentAction::Shuffle,
        ComponentAction::Cancel,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            ComponentAction::Select => SELECT_PREFIX,
            ComponentAction::AddRelated5 => ADD5_PREFIX,
            ComponentAction::AddRelated10 => ADD10_PREFIX,
            ComponentAction::Shuffle => SHUFFLE_PREFIX,
            ComponentAction::Cancel => CANCEL_PREFIX,
        }
    }

    pub fn custom_id(self, key: &SessionKey) -> String {
        format!("{}{}", self.prefix(), key)
    }

    /// Splits a custom id into its action and embedded key.
    ///
    /// Returns `None` for foreign ids or an empty key.
    pub fn parse(custom_id: &str) -> Option<(Self, SessionKey)> {
        Self::ALL.into_iter().find_map(|action| {
            custom_id
                .strip_prefix(action.prefix())
                .filter(|key| !key.is_empty())
                .map(|key| (action, SessionKey::from_raw(key)))
        })
    }

    /// Number of related tracks the button asks for, if it is an "add related" button.
    pub fn related_amount(self) -> Option<usize> {
        match self {
            ComponentAction::AddRelated5 => Some(5),
            ComponentAction::AddRelated10 => Some(10),
            _ => None,
        }
    }

    pub fn is_button(self) -> bool {
        self != ComponentAction::Select
    }
}
