//! Actor model implementation for the room service.
//!
//! ```text
//! RoomControllerActor (singleton)
//! ├── owns the connection -> room registry
//! └── supervises N RoomActors
//!     └── RoomActor (one per live room)
//!         ├── owns members, presenter slot, chat log
//!         └── fans out to ConnectionActors
//!             └── ConnectionActor (one per socket, sole writer)
//! ```
//!
//! # Key Design Decisions
//!
//! - **One room per connection**: joining another room leaves the current one
//! - **CancellationToken propagation**: rooms get child tokens of the controller
//! - **Mailbox monitoring**: depth thresholds with metrics (Room: 100/500, Connection: 50/200)
//! - **Non-blocking fan-out**: rooms `try_send` to connections and count drops
//!
//! # Modules
//!
//! - [`controller`] - `RoomControllerActor` singleton that supervises rooms
//! - [`room`] - `RoomActor` per live room
//! - [`connection`] - `ConnectionActor` per signaling socket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod connection;
pub mod controller;
pub mod messages;
pub mod metrics;
pub mod room;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use controller::{RoomControllerActor, RoomControllerHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle};
