//! Wire protocol for Huddle rooms.
//!
//! Every frame on the signaling socket is one JSON object of the form
//! `{"event": "<name>", "data": <payload>}`. Inbound frames decode into the
//! closed [`ClientEvent`] set and outbound frames encode from [`ServerEvent`];
//! anything that does not fit those schemas is rejected at the codec.
//!
//! # Modules
//!
//! - [`events`] - Client and server event unions
//! - [`chat`] - Chat log entries (text and file)
//! - [`participant`] - Presence snapshot and mutable attributes
//! - [`signal`] - Session descriptions and ICE candidates carried by the relay
//! - [`codec`] - JSON encode/decode with typed errors

#![warn(clippy::pedantic)]

pub mod chat;
pub mod codec;
pub mod events;
pub mod participant;
pub mod signal;

pub use chat::{AckStatus, ChatEntry, FileShareAck};
pub use codec::ProtocolError;
pub use events::{ClientEvent, Password, ServerEvent};
pub use participant::{Attribute, ParticipantSnapshot};
pub use signal::{IceCandidateInit, SdpType, SessionDescription};
