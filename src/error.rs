//! Common error types for client operations
//!
//! This module defines the error type used throughout the client to
//! provide consistent error handling across the wire codec, the transport
//! layer and the protocol engine.

/// A common error type for MQTT client operations.
///
/// This enum defines the set of errors that can occur while driving the
/// protocol. It is designed to be simple and portable for `no_std`
/// environments while providing enough detail for proper error handling.
///
/// # Examples
///
/// ```rust
/// use libmqtt::error::Error;
///
/// fn handle_error(error: Error) {
///     match error {
///         Error::ConnectionRefused(code) => {
///             // broker rejected the CONNECT; `code` is the CONNACK
///             // return code (1-5) as sent by the broker
///         }
///         Error::Timeout => {
///             // the command timer expired before the operation completed
///         }
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted while the client is not connected.
    ///
    /// Every operation except `connect` requires a successful CONNACK
    /// first; any mid-command failure also drops the client back into
    /// this state.
    NotConnected,

    /// `connect` was called on a client that is already connected.
    AlreadyConnected,

    /// The transport returned an error from a read or write.
    ///
    /// The socket framing may be desynchronized afterwards; the client
    /// marks itself disconnected and the caller must reconnect.
    Transport,

    /// The operation timer expired before the operation completed.
    Timeout,

    /// An inbound packet's remaining length exceeds the receive buffer,
    /// or an outbound packet does not fit the send buffer.
    BufferOverflow,

    /// A malformed packet was received, or a remaining-length field
    /// required more than four bytes.
    ProtocolError,

    /// The broker accepted a subscription but no local handler slot was
    /// free. The client stays connected; the caller may unsubscribe or
    /// retry after freeing a slot.
    HandlerTableFull,

    /// The broker refused the connection. Carries the CONNACK return
    /// code (1-5) verbatim.
    ConnectionRefused(u8),

    /// The broker rejected a subscription (SUBACK return code 0x80).
    SubscribeRejected,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::AlreadyConnected => defmt::write!(f, "AlreadyConnected"),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
            Error::HandlerTableFull => defmt::write!(f, "HandlerTableFull"),
            Error::ConnectionRefused(code) => defmt::write!(f, "ConnectionRefused({})", code),
            Error::SubscribeRejected => defmt::write!(f, "SubscribeRejected"),
        }
    }
}
