//! Protocol module containing the JSON messages of both client channels.

pub mod messages;

pub use messages::*;
