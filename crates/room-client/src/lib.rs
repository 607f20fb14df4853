//! Room Client Library
//!
//! Client-side core for Huddle rooms. It keeps a local view of the room in
//! step with the server and negotiates direct media links with the other
//! participants: audio with everyone for voice, video from the presenter
//! for the shared screen.
//!
//! The media engine itself is abstracted behind [`peer::PeerConnection`],
//! [`peer::PeerConnectionFactory`] and [`peer::MediaSource`].
//!
//! # Modules
//!
//! - [`client`] - Event routing between signaling, view and sessions
//! - [`config`] - Client configuration from environment
//! - [`errors`] - Client and negotiation errors
//! - [`file_share`] - File encoding and acknowledgement tracking
//! - [`negotiation`] - Per-peer offer/answer/ICE state machine
//! - [`peer`] - Media engine traits
//! - [`room_view`] - Local projection of room state
//! - [`session`] - Voice and screen-share sessions
//! - [`signaling`] - WebSocket connection to the room service
//! - [`typing`] - Typing indicator debouncer

#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod errors;
pub mod file_share;
pub mod negotiation;
pub mod peer;
pub mod room_view;
pub mod session;
pub mod signaling;
pub mod typing;

pub use client::RoomClient;
pub use config::ClientConfig;
pub use errors::{ClientError, NegotiationError};
pub use negotiation::{LinkState, PeerLink, PeerLinks};
pub use peer::{MediaSource, MediaTrack, PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventKind, PeerEventSender};
pub use room_view::RoomView;
pub use session::{ScreenSession, VoiceSession};
pub use signaling::{SignalingConnection, SignalingHandle};
pub use typing::TypingHandle;
