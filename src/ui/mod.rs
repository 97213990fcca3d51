//! # UI Module
//!
//! Discord message builders for the `/play` flow: result and "queued" embeds,
//! the selection menu and the session action row. Builders are pure so they
//! can be checked by serializing them in tests.

pub mod components;
pub mod embeds;
