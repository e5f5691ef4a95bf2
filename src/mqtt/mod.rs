//! MQTT 3.1.1 protocol engine for embedded systems.
//!
//! This module contains the blocking client ([`Client`]) together with
//! the protocol-level types it exchanges with the caller: connect
//! options, QoS levels, incoming messages and message handlers.
//!
//! # Protocol Overview
//!
//! MQTT uses a publish-subscribe pattern where:
//! - **Publishers** send messages to topics
//! - **Subscribers** receive messages from topics they're interested in
//! - **Brokers** route messages between publishers and subscribers
//!
//! The main entry point is [`Client`], which provides methods for
//! connecting, publishing, subscribing, and receiving messages. See the
//! crate-level documentation for a usage example.

/// MQTT client implementation and supporting types.
pub mod client;

/// Topic filter matching with `+` and `#` wildcards.
pub mod topic;

pub(crate) mod packet;

pub use client::Client;

/// Maximum length of a topic filter stored in the handler table.
///
/// Filters longer than this are rejected by `subscribe` before anything
/// is sent to the broker.
pub const MAX_TOPIC_FILTER_LEN: usize = 64;

/// Maximum number of inbound QoS 2 messages tracked between PUBLISH and
/// PUBREL.
///
/// When the table is full, further QoS 2 publishes are acknowledged but
/// not delivered; the broker will resend them.
pub const MAX_INFLIGHT_QOS2: usize = 10;

/// Quality of Service levels for MQTT messages.
///
/// QoS defines the guarantee of delivery for a specific message. Higher
/// QoS levels provide stronger delivery guarantees but require more
/// network overhead and client state management.
///
/// # Examples
///
/// ```rust
/// use libmqtt::mqtt::QoS;
///
/// let qos0 = QoS::AtMostOnce;   // Fire and forget
/// let qos1 = QoS::AtLeastOnce;  // Acknowledged delivery
/// let qos2 = QoS::ExactlyOnce;  // Assured delivery
///
/// assert_eq!(qos0 as u8, 0);
/// assert_eq!(qos1 as u8, 1);
/// assert_eq!(qos2 as u8, 2);
/// ```
#[derive(Debug, PartialEq, Eq, PartialOrd, Clone, Copy)]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    ///
    /// Messages are delivered according to the best effort of the
    /// underlying network. Message loss can occur.
    AtMostOnce = 0,

    /// **QoS 1**: At least once delivery.
    ///
    /// Messages are assured to arrive but duplicates can occur.
    AtLeastOnce = 1,

    /// **QoS 2**: Exactly once delivery.
    ///
    /// Messages are assured to arrive exactly once. This is the safest
    /// but slowest level.
    ExactlyOnce = 2,
}

impl QoS {
    pub(crate) fn from_bits(bits: u8) -> Option<QoS> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        match self {
            QoS::AtMostOnce => defmt::write!(f, "QoS0"),
            QoS::AtLeastOnce => defmt::write!(f, "QoS1"),
            QoS::ExactlyOnce => defmt::write!(f, "QoS2"),
        }
    }
}

/// MQTT control packet types (high nibble of the fixed header byte).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketType {
    /// Client request to connect to the broker.
    Connect = 1,
    /// Connect acknowledgment.
    ConnAck = 2,
    /// Publish message (either direction).
    Publish = 3,
    /// Publish acknowledgment (QoS 1).
    PubAck = 4,
    /// Publish received (QoS 2, part 1).
    PubRec = 5,
    /// Publish release (QoS 2, part 2).
    PubRel = 6,
    /// Publish complete (QoS 2, part 3).
    PubComp = 7,
    /// Client subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    SubAck = 9,
    /// Client unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    UnsubAck = 11,
    /// PING request.
    PingReq = 12,
    /// PING response.
    PingResp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Fixed header flags for all packet types except PUBLISH, whose
    /// flags carry DUP/QoS/RETAIN.
    pub(crate) const fn fixed_flags(self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0b0000,
        }
    }

    /// Builds the first fixed-header byte for non-PUBLISH packets.
    pub(crate) const fn header_byte(self) -> u8 {
        ((self as u8) << 4) | self.fixed_flags()
    }

    pub(crate) fn from_header(byte: u8) -> Option<PacketType> {
        match byte >> 4 {
            1 => Some(PacketType::Connect),
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::PubAck),
            5 => Some(PacketType::PubRec),
            6 => Some(PacketType::PubRel),
            7 => Some(PacketType::PubComp),
            8 => Some(PacketType::Subscribe),
            9 => Some(PacketType::SubAck),
            10 => Some(PacketType::Unsubscribe),
            11 => Some(PacketType::UnsubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            14 => Some(PacketType::Disconnect),
            _ => None,
        }
    }
}

/// A will message registered with the broker at connect time.
///
/// The broker publishes the will on the client's behalf if the
/// connection drops without a DISCONNECT.
#[derive(Debug, Clone, Copy)]
pub struct Will<'a> {
    /// Topic the will is published to.
    pub topic: &'a str,
    /// Will message payload.
    pub message: &'a [u8],
    /// QoS the will is published at.
    pub qos: QoS,
    /// Whether the will is retained by the broker.
    pub retained: bool,
}

/// Configuration options for the MQTT connection.
///
/// All string and byte fields are borrowed for the duration of the
/// `connect` call only.
///
/// # Examples
///
/// ```rust
/// use libmqtt::mqtt::ConnectOptions;
///
/// let options = ConnectOptions {
///     client_id: "my_iot_device",
///     keep_alive_seconds: 60,
///     clean_session: true,
///     ..ConnectOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ConnectOptions<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,

    /// The keep-alive time interval in seconds. A value of 0 disables
    /// keep-alive.
    pub keep_alive_seconds: u16,

    /// Whether to start a clean session.
    ///
    /// - `true`: the broker discards any previous session state, and the
    ///   client keeps no in-flight state for replay
    /// - `false`: the broker resumes the previous session, and the
    ///   client replays its in-flight publish on reconnect
    pub clean_session: bool,

    /// Optional user name for authentication.
    pub username: Option<&'a str>,

    /// Optional password for authentication.
    pub password: Option<&'a [u8]>,

    /// Optional will message.
    pub will: Option<Will<'a>>,

    /// MQTT protocol version: 3 (MQIsdp) or 4 (MQTT 3.1.1).
    pub mqtt_version: u8,
}

impl Default for ConnectOptions<'_> {
    fn default() -> Self {
        Self {
            client_id: "",
            keep_alive_seconds: 60,
            clean_session: true,
            username: None,
            password: None,
            will: None,
            mqtt_version: 4,
        }
    }
}

/// An incoming MQTT publish message, as delivered to message handlers.
///
/// The topic and payload borrow the client's receive buffer and are only
/// valid for the duration of the handler call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Message<'a> {
    /// The topic on which the message was published.
    pub topic: &'a str,
    /// The message payload data.
    pub payload: &'a [u8],
    /// The QoS the message was delivered at.
    pub qos: QoS,
    /// Whether this is a retransmission.
    pub dup: bool,
    /// Whether the broker stored the message as retained.
    pub retained: bool,
    /// Packet identifier; 0 for QoS 0 messages.
    pub id: u16,
}

/// A message handler callback, invoked from within [`Client::poll`] and
/// the ack-wait loops of other operations.
///
/// Handlers execute on the engine's own call stack and must not block
/// indefinitely. The borrowed [`Message`] prevents re-entering the
/// client from inside a handler.
pub type MessageHandler = fn(&Message<'_>);
