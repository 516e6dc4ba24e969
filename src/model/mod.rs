//! Client, Team, and Room in-memory state.
//!
//! Client ↔ Room ↔ Team form reference cycles on paper (client holds its
//! room, room holds its clients and teams, team holds its room). We avoid
//! the cycle by making the room an arena: it exclusively owns its
//! `ClientRecord`/`Team` values. Everything outside a room — the online
//! index, a session task — holds only an id and looks the record up through
//! [`crate::relay::Relay`]'s indexes rather than holding a strong reference
//! into the arena.

pub mod client;
pub mod room;
pub mod team;

pub use client::{ClientId, ClientRecord};
pub use room::Room;
pub use team::Team;
