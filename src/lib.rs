//! # libmqtt - Blocking MQTT 3.1.1 client engine
//!
//! A single-connection, single-threaded MQTT 3.1.1 client designed for
//! embedded systems and `no_std` environments. The engine owns fixed-size
//! send/receive buffers, drives every protocol exchange to completion
//! under a countdown timer, and dispatches incoming messages to
//! topic-filter-indexed handlers.
//!
//! ## Design
//!
//! The client is generic over two capabilities supplied by the platform:
//!
//! - a byte [`Transport`](network::Transport) with timed, blocking reads
//!   and writes (TCP, TLS, an in-memory pipe, a mock - the engine does
//!   not care),
//! - a [`Countdown`](time::Countdown) timer used for command timeouts and
//!   keep-alive bookkeeping.
//!
//! All operations block until they complete or their timer expires. There
//! are no background threads and no async suspension; at most one MQTT
//! request is in process at any one time.
//!
//! ## Features
//!
//! - MQTT 3.1.1 protocol compliance
//! - Quality of Service (QoS) levels 0, 1, and 2
//! - Clean session and persistent session support, with in-flight
//!   message replay across an in-process reconnect
//! - Configurable keep-alive with automatic PINGREQ/PINGRESP handling
//! - Topic filter matching with `+` and `#` wildcards
//! - Fixed-size buffers for predictable memory usage
//!
//! ## Usage
//!
//! ```rust,no_run
//! use libmqtt::mqtt::{Client, ConnectOptions, Message, QoS};
//! # use libmqtt::network::{Read, Write, Transport};
//! # use libmqtt::time::Countdown;
//! # struct TcpTransport;
//! # impl Read for TcpTransport {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for TcpTransport {
//! #     type Error = ();
//! #     fn write(&mut self, _buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Transport for TcpTransport {}
//! # #[derive(Debug, Default)]
//! # struct Timer;
//! # impl Countdown for Timer {
//! #     fn countdown_ms(&mut self, _ms: u32) {}
//! #     fn left_ms(&mut self) -> u32 { 0 }
//! #     fn expired(&mut self) -> bool { true }
//! # }
//!
//! fn on_message(msg: &Message<'_>) {
//!     // handle msg.topic / msg.payload
//! }
//!
//! let transport = TcpTransport; // must already be connected
//! let mut client: Client<_, Timer> = Client::new(transport, 30_000);
//!
//! let options = ConnectOptions {
//!     client_id: "sensor_device_01",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//!     ..ConnectOptions::default()
//! };
//!
//! // client.connect(&options)?;
//! // client.subscribe("sensors/+/temperature", QoS::AtLeastOnce, on_message)?;
//! // client.publish("status", b"online", QoS::AtMostOnce, false)?;
//! // client.poll(1000)?; // receive messages, maintain keep-alive
//! ```
//!
//! ## Platform support
//!
//! The crate only needs Rust's `core` library. The optional `std` feature
//! adds an `Instant`-backed countdown timer for hosted targets; the
//! optional `defmt` feature adds `defmt::Format` implementations for
//! embedded logging.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Common error type for client operations.
pub mod error;

/// Byte transport abstraction consumed by the client.
///
/// Defines the [`Read`](network::Read) and [`Write`](network::Write)
/// capability traits with timed operations, and the combined
/// [`Transport`](network::Transport) bound.
pub mod network;

/// Countdown timer abstraction consumed by the client.
pub mod time;

/// The MQTT 3.1.1 client engine and its protocol types.
pub mod mqtt;

pub use error::Error;
