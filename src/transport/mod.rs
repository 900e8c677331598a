//! Transport Layer
//!
//! The dispatcher consumes and publishes through the [`MessageBus`] seam;
//! broker connection management stays outside the core. This module provides:
//!
//! - `traits`: the bus abstraction (queues, competing consumers, deliveries)
//! - `in_process`: a channel-backed bus for embedded use and tests
//! - `frame`: length-prefixed, CRC32-checked JSON frames
//! - `unix_socket`: a framed Unix-socket bridge exposing the bus to other
//!   local processes
//!
//! # Security
//!
//! - The socket bridge validates peer UID via `SO_PEERCRED`
//! - A maximum frame size is enforced before any buffer allocation

pub mod frame;
pub mod in_process;
pub mod traits;
#[cfg(unix)]
pub mod unix_socket;

pub use frame::{FrameDecoder, MAX_FRAME_SIZE};
pub use in_process::InProcessBus;
pub use traits::{BusConsumer, BusError, ConnectionId, Delivery, MessageBus, TransportError};
#[cfg(unix)]
pub use unix_socket::{BridgeServer, WireFrame};
