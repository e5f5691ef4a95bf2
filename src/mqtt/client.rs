//! MQTT 3.1.1 client implementation.
//!
//! The client is a blocking protocol engine: every operation serializes
//! one packet into the send buffer, writes it through the transport, and
//! pumps the protocol loop until the expected acknowledgment arrives or
//! the command timer expires. Incoming PUBLISH packets
//! encountered along the way are dispatched to the registered handlers,
//! so messages keep flowing even while a command is waiting for its ack.
//!
//! QoS 1 and QoS 2 delivery state is kept in a single in-flight slot:
//! when the session is not clean, the serialized bytes of the last
//! unacknowledged PUBLISH (or, once a PUBREC has been seen, the matching
//! PUBREL) are retained and replayed after a reconnect.

use crate::error::Error;
use crate::mqtt::{
    packet, topic, ConnectOptions, Message, MessageHandler, PacketType, QoS, MAX_INFLIGHT_QOS2,
    MAX_TOPIC_FILTER_LEN,
};
use crate::network::Transport;
use crate::time::Countdown;
use heapless::String;

/// Monotonic 16-bit packet identifier allocator.
///
/// Identifiers run 1..=65535 and wrap back to 1; 0 is never allocated
/// because the wire format reserves it.
struct PacketId {
    next: u16,
}

impl PacketId {
    const fn new() -> Self {
        Self { next: 1 }
    }

    fn next(&mut self) -> u16 {
        let id = self.next;
        self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };
        id
    }
}

/// A subscription slot: the owned topic filter and its callback.
struct HandlerSlot {
    filter: String<MAX_TOPIC_FILTER_LEN>,
    handler: MessageHandler,
}

/// Packet ids of inbound QoS 2 publishes that were delivered but are
/// still awaiting the broker's PUBREL. 0 marks an empty slot.
struct InboundQos2 {
    ids: [u16; MAX_INFLIGHT_QOS2],
}

impl InboundQos2 {
    const fn new() -> Self {
        Self {
            ids: [0; MAX_INFLIGHT_QOS2],
        }
    }

    fn contains(&self, id: u16) -> bool {
        self.ids.contains(&id)
    }

    /// Returns false when the table is full.
    fn insert(&mut self, id: u16) -> bool {
        for slot in self.ids.iter_mut() {
            if *slot == 0 {
                *slot = id;
                return true;
            }
        }
        false
    }

    fn remove(&mut self, id: u16) {
        for slot in self.ids.iter_mut() {
            if *slot == id {
                *slot = 0;
                return;
            }
        }
    }

    fn clear(&mut self) {
        self.ids = [0; MAX_INFLIGHT_QOS2];
    }
}

/// The serialized bytes of the one outbound QoS 1/2 publish awaiting its
/// terminal ack. After a PUBREC has been answered, `pubrel` is set and
/// the stored bytes are the PUBREL to replay instead.
struct Inflight<const MAX_PACKET_SIZE: usize> {
    buf: [u8; MAX_PACKET_SIZE],
    len: usize,
    id: u16,
    qos: QoS,
    pubrel: bool,
}

/// An MQTT 3.1.1 client for publish-subscribe messaging.
///
/// The client drives a single connection over any [`Transport`] and
/// provides blocking methods for connecting, publishing, subscribing,
/// and receiving messages. Timing is supplied by a [`Countdown`]
/// implementation; a fresh timer is created per operation via
/// [`Default`].
///
/// # Type Parameters
///
/// * `T` - The byte transport
/// * `K` - The countdown timer
/// * `MAX_PACKET_SIZE` - Size of the send and receive buffers; packets
///   that do not fit are rejected with [`Error::BufferOverflow`]
/// * `MAX_HANDLERS` - Capacity of the subscription handler table
///
/// # Examples
///
/// ```rust,no_run
/// use libmqtt::mqtt::{Client, ConnectOptions, QoS};
/// # use libmqtt::network::{Read, Write, Transport};
/// # use libmqtt::time::Countdown;
/// # struct TcpTransport;
/// # impl Read for TcpTransport {
/// #     type Error = ();
/// #     fn read(&mut self, _buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
/// # }
/// # impl Write for TcpTransport {
/// #     type Error = ();
/// #     fn write(&mut self, _buf: &[u8], _timeout_ms: u32) -> Result<usize, Self::Error> { Ok(0) }
/// # }
/// # impl Transport for TcpTransport {}
/// # #[derive(Debug, Default)]
/// # struct Timer;
/// # impl Countdown for Timer {
/// #     fn countdown_ms(&mut self, _ms: u32) {}
/// #     fn left_ms(&mut self) -> u32 { 0 }
/// #     fn expired(&mut self) -> bool { true }
/// # }
///
/// let transport = TcpTransport; // already connected to the broker
/// let mut client: Client<_, Timer> = Client::new(transport, 30_000);
///
/// // client.connect(&ConnectOptions { client_id: "node1", ..Default::default() })?;
/// // client.publish("status", b"online", QoS::AtLeastOnce, false)?;
/// ```
pub struct Client<T, K, const MAX_PACKET_SIZE: usize = 100, const MAX_HANDLERS: usize = 5>
where
    T: Transport,
    K: Countdown + Default,
{
    transport: T,
    command_timeout_ms: u32,
    sendbuf: [u8; MAX_PACKET_SIZE],
    readbuf: [u8; MAX_PACKET_SIZE],
    last_sent: K,
    last_received: K,
    keep_alive_seconds: u16,
    ping_outstanding: bool,
    clean_session: bool,
    connected: bool,
    packet_id: PacketId,
    handlers: [Option<HandlerSlot>; MAX_HANDLERS],
    default_handler: Option<MessageHandler>,
    inflight: Option<Inflight<MAX_PACKET_SIZE>>,
    inbound_qos2: InboundQos2,
}

impl<T, K, const MAX_PACKET_SIZE: usize, const MAX_HANDLERS: usize>
    Client<T, K, MAX_PACKET_SIZE, MAX_HANDLERS>
where
    T: Transport,
    K: Countdown + Default,
{
    /// Create a client over a transport that is already connected to its
    /// endpoint.
    ///
    /// `command_timeout_ms` bounds every subsequent operation: each call
    /// to [`connect`](Self::connect), [`publish`](Self::publish) and the
    /// other commands runs under a fresh countdown of this duration.
    pub fn new(transport: T, command_timeout_ms: u32) -> Self {
        Self {
            transport,
            command_timeout_ms,
            sendbuf: [0; MAX_PACKET_SIZE],
            readbuf: [0; MAX_PACKET_SIZE],
            last_sent: K::default(),
            last_received: K::default(),
            keep_alive_seconds: 0,
            ping_outstanding: false,
            clean_session: true,
            connected: false,
            packet_id: PacketId::new(),
            handlers: core::array::from_fn(|_| None),
            default_handler: None,
            inflight: None,
            inbound_qos2: InboundQos2::new(),
        }
    }

    /// Is the client connected?
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Set the handler invoked for messages that match no subscription.
    pub fn set_default_handler(&mut self, handler: MessageHandler) {
        self.default_handler = Some(handler);
    }

    /// Send a CONNECT packet and wait for the CONNACK.
    ///
    /// The transport must already be connected to the broker. On a
    /// CONNACK with a non-zero return code the broker's code is
    /// surfaced verbatim as [`Error::ConnectionRefused`] and the client
    /// stays disconnected.
    ///
    /// When reconnecting a non-clean session with an unacknowledged
    /// QoS 1/2 publish, the stored packet is replayed: the PUBLISH with
    /// the DUP flag set, or the PUBREL if the exchange had already
    /// reached the PUBREC stage. The replay's ack is awaited under the
    /// same command timer.
    pub fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), Error> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }
        let mut timer = self.command_timer();

        self.keep_alive_seconds = options.keep_alive_seconds;
        self.clean_session = options.clean_session;
        self.ping_outstanding = false;
        if self.clean_session {
            self.inflight = None;
            self.inbound_qos2.clear();
        }

        let len = packet::connect(&mut self.sendbuf, options)?;
        self.send_packet(len, &mut timer)?;
        if self.keep_alive_seconds > 0 {
            self.last_received.countdown(self.keep_alive_seconds as u32);
        }

        self.waitfor(PacketType::ConnAck, &mut timer)?;
        let (_session_present, code) = packet::connack(&self.readbuf)?;
        if code != 0 {
            return Err(Error::ConnectionRefused(code));
        }
        self.connected = true;

        // Resend the in-flight publish interrupted by the disconnect.
        if !self.clean_session {
            if let Some(inflight) = &self.inflight {
                let len = inflight.len;
                let qos = inflight.qos;
                let pubrel = inflight.pubrel;
                self.sendbuf[..len].copy_from_slice(&inflight.buf[..len]);
                if !pubrel {
                    self.sendbuf[0] |= 0x08; // DUP
                }
                self.send_and_wait_ack(len, &mut timer, qos)?;
            }
        }
        Ok(())
    }

    /// Publish a message to a topic and wait for the acks its QoS
    /// requires.
    ///
    /// - QoS 0 returns as soon as the packet is written.
    /// - QoS 1 waits for the matching PUBACK.
    /// - QoS 2 waits for the full PUBREC/PUBREL/PUBCOMP exchange.
    ///
    /// In a non-clean session the serialized packet is retained until
    /// its terminal ack so it can be replayed by
    /// [`connect`](Self::connect) after a reconnect. Any failure while
    /// waiting marks the client disconnected.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<(), Error> {
        self.publish_with_id(topic, payload, qos, retained).map(|_| ())
    }

    /// Like [`publish`](Self::publish), but returns the allocated packet
    /// identifier (0 for QoS 0).
    pub fn publish_with_id(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retained: bool,
    ) -> Result<u16, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut timer = self.command_timer();

        let id = match qos {
            QoS::AtMostOnce => 0,
            _ => self.packet_id.next(),
        };
        let len = packet::publish(&mut self.sendbuf, false, qos, retained, id, topic, payload)?;

        if !self.clean_session && qos != QoS::AtMostOnce {
            let mut inflight = Inflight {
                buf: [0; MAX_PACKET_SIZE],
                len,
                id,
                qos,
                pubrel: false,
            };
            inflight.buf[..len].copy_from_slice(&self.sendbuf[..len]);
            self.inflight = Some(inflight);
        }

        self.send_and_wait_ack(len, &mut timer, qos)?;
        Ok(id)
    }

    /// Subscribe to a topic filter and register a handler for it.
    ///
    /// Returns the QoS granted by the broker. A broker rejection
    /// (SUBACK return code 0x80) is surfaced as
    /// [`Error::SubscribeRejected`] without installing a handler and
    /// without disconnecting. If the broker grants the subscription but
    /// every local handler slot is taken, [`Error::HandlerTableFull`] is
    /// returned; the client stays connected.
    pub fn subscribe(
        &mut self,
        filter: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<QoS, Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if filter.len() > MAX_TOPIC_FILTER_LEN {
            return Err(Error::BufferOverflow);
        }
        let mut timer = self.command_timer();

        let id = self.packet_id.next();
        let len = packet::subscribe(&mut self.sendbuf, id, filter, qos)?;
        self.send_packet(len, &mut timer).map_err(|e| self.fail(e))?;

        self.waitfor(PacketType::SubAck, &mut timer)
            .map_err(|e| self.fail(e))?;
        let (_id, granted) = packet::suback(&self.readbuf).map_err(|e| self.fail(e))?;
        if granted == 0x80 {
            return Err(Error::SubscribeRejected);
        }
        let granted = QoS::from_bits(granted)
            .ok_or(Error::ProtocolError)
            .map_err(|e| self.fail(e))?;

        let slot = self
            .handlers
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(Error::HandlerTableFull)?;
        *slot = Some(HandlerSlot {
            filter: String::try_from(filter).map_err(|_| Error::BufferOverflow)?,
            handler,
        });
        Ok(granted)
    }

    /// Unsubscribe from a topic filter and remove its handler.
    pub fn unsubscribe(&mut self, filter: &str) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let mut timer = self.command_timer();

        let id = self.packet_id.next();
        let len = packet::unsubscribe(&mut self.sendbuf, id, filter)?;
        self.send_packet(len, &mut timer).map_err(|e| self.fail(e))?;

        self.waitfor(PacketType::UnsubAck, &mut timer)
            .map_err(|e| self.fail(e))?;
        packet::unsuback(&self.readbuf).map_err(|e| self.fail(e))?;

        for slot in self.handlers.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.filter.as_str() == filter) {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Send a DISCONNECT packet and drop the session state.
    ///
    /// The client is marked disconnected whether or not the send
    /// succeeds; the send result is returned for callers that care.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let mut timer = self.command_timer();
        let result = packet::zero(&mut self.sendbuf, PacketType::Disconnect)
            .and_then(|len| self.send_packet(len, &mut timer));
        self.connected = false;
        for slot in self.handlers.iter_mut() {
            *slot = None;
        }
        result
    }

    /// Receive messages and maintain the keep-alive exchange for
    /// `timeout_ms` milliseconds.
    ///
    /// A call to this method (or any other operation) must be made
    /// within the keep-alive interval to keep the connection alive.
    /// Returns early with an error on any transport or protocol
    /// failure, marking the client disconnected.
    pub fn poll(&mut self, timeout_ms: u32) -> Result<(), Error> {
        let mut timer = K::default();
        timer.countdown_ms(timeout_ms);
        while !timer.expired() {
            if let Err(e) = self.cycle(&mut timer) {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    fn command_timer(&self) -> K {
        let mut timer = K::default();
        timer.countdown_ms(self.command_timeout_ms);
        timer
    }

    fn fail(&mut self, err: Error) -> Error {
        self.connected = false;
        err
    }

    /// Write `len` bytes of `sendbuf`, retrying short writes until done
    /// or the timer expires.
    fn send_packet(&mut self, len: usize, timer: &mut K) -> Result<(), Error> {
        let mut sent = 0;
        while sent < len && !timer.expired() {
            let written = self
                .transport
                .write(&self.sendbuf[sent..len], timer.left_ms())
                .map_err(|_| Error::Transport)?;
            sent += written;
        }
        if sent < len {
            return Err(Error::Timeout);
        }
        if self.keep_alive_seconds > 0 {
            self.last_sent.countdown(self.keep_alive_seconds as u32);
        }
        Ok(())
    }

    /// Read exactly one framed packet into `readbuf`.
    ///
    /// Returns `None` when the timer ran out before the first byte
    /// arrived. After a successful read, `readbuf` holds the packet
    /// exactly as it appeared on the wire, starting with the fixed
    /// header.
    fn read_packet(&mut self, timer: &mut K) -> Result<Option<PacketType>, Error> {
        let n = self
            .transport
            .read(&mut self.readbuf[..1], timer.left_ms())
            .map_err(|_| Error::Transport)?;
        if n == 0 {
            return Ok(None);
        }

        // The remaining length is variable in itself: one byte at a
        // time, at most four.
        let mut remaining = 0usize;
        let mut multiplier = 1usize;
        let mut len_bytes = 0usize;
        loop {
            if len_bytes >= 4 {
                return Err(Error::ProtocolError);
            }
            let mut byte = [0u8; 1];
            let n = self
                .transport
                .read(&mut byte, timer.left_ms())
                .map_err(|_| Error::Transport)?;
            if n == 0 {
                return Err(Error::Timeout);
            }
            len_bytes += 1;
            remaining += (byte[0] as usize & 0x7F) * multiplier;
            multiplier *= 128;
            if byte[0] & 0x80 == 0 {
                break;
            }
        }

        // Put the remaining length back into the buffer so deserializers
        // see the original framing.
        let header_len = 1 + packet::encode_remaining_length(&mut self.readbuf[1..], remaining)?;
        if header_len + remaining > MAX_PACKET_SIZE {
            return Err(Error::BufferOverflow);
        }

        let mut got = 0;
        while got < remaining && !timer.expired() {
            let n = self
                .transport
                .read(
                    &mut self.readbuf[header_len + got..header_len + remaining],
                    timer.left_ms(),
                )
                .map_err(|_| Error::Transport)?;
            got += n;
        }
        if got < remaining {
            return Err(Error::Timeout);
        }

        if self.keep_alive_seconds > 0 {
            self.last_received.countdown(self.keep_alive_seconds as u32);
        }
        match PacketType::from_header(self.readbuf[0]) {
            Some(packet_type) => Ok(Some(packet_type)),
            None => Err(Error::ProtocolError),
        }
    }

    /// One pass through the protocol pump: read one packet, handle the
    /// QoS bookkeeping it implies, run the keep-alive check, and return
    /// the packet type for the caller to interpret.
    fn cycle(&mut self, timer: &mut K) -> Result<Option<PacketType>, Error> {
        let packet_type = match self.read_packet(timer)? {
            Some(packet_type) => packet_type,
            None => {
                self.keepalive();
                return Ok(None);
            }
        };

        match packet_type {
            PacketType::Publish => self.handle_publish(timer)?,
            PacketType::PubRec => {
                let (_, id) = packet::ack_id(&self.readbuf)?;
                let len = packet::ack(&mut self.sendbuf, PacketType::PubRel, id)?;
                self.send_packet(len, timer)?;
                if let Some(inflight) = self.inflight.as_mut() {
                    if inflight.id == id {
                        // From here on, a reconnect must replay the
                        // PUBREL, not the PUBLISH.
                        inflight.buf[..len].copy_from_slice(&self.sendbuf[..len]);
                        inflight.len = len;
                        inflight.pubrel = true;
                    }
                }
            }
            PacketType::PubRel => {
                let (_, id) = packet::ack_id(&self.readbuf)?;
                let len = packet::ack(&mut self.sendbuf, PacketType::PubComp, id)?;
                self.send_packet(len, timer)?;
                self.inbound_qos2.remove(id);
            }
            PacketType::PingResp => self.ping_outstanding = false,
            // CONNACK and the remaining acks are interpreted by the
            // waiting operation from the receive buffer.
            _ => {}
        }

        self.keepalive();
        Ok(Some(packet_type))
    }

    fn handle_publish(&mut self, timer: &mut K) -> Result<(), Error> {
        let msg = packet::publish_message(&self.readbuf)?;
        let (qos, id) = (msg.qos, msg.id);

        let deliver = match qos {
            QoS::ExactlyOnce => {
                if self.inbound_qos2.contains(id) {
                    // Duplicate delivery from the broker: acknowledge
                    // again, do not redeliver.
                    false
                } else if self.inbound_qos2.insert(id) {
                    true
                } else {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("inbound QoS2 id table full, dropping delivery of {}", id);
                    false
                }
            }
            _ => true,
        };
        if deliver {
            self.deliver(&msg);
        }

        match qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                let len = packet::ack(&mut self.sendbuf, PacketType::PubAck, id)?;
                self.send_packet(len, timer)?;
            }
            QoS::ExactlyOnce => {
                let len = packet::ack(&mut self.sendbuf, PacketType::PubRec, id)?;
                self.send_packet(len, timer)?;
            }
        }
        Ok(())
    }

    /// Find the message handlers matching the topic, by exact equality
    /// or wildcard match, and invoke each. Falls back to the default
    /// handler when no subscription matched.
    fn deliver(&self, msg: &Message<'_>) -> bool {
        let mut handled = false;
        for slot in self.handlers.iter().flatten() {
            if slot.filter.as_str() == msg.topic || topic::matches(slot.filter.as_str(), msg.topic)
            {
                (slot.handler)(msg);
                handled = true;
            }
        }
        if !handled {
            if let Some(handler) = self.default_handler {
                handler(msg);
                handled = true;
            }
        }
        handled
    }

    /// Send a PINGREQ when either direction of the connection has been
    /// quiet for a full keep-alive interval.
    ///
    /// A send failure here is swallowed; the broken connection surfaces
    /// on the next read or write.
    fn keepalive(&mut self) {
        if self.keep_alive_seconds == 0 {
            return;
        }
        if (self.last_sent.expired() || self.last_received.expired()) && !self.ping_outstanding {
            let mut timer = K::default();
            timer.countdown_ms(1000);
            let result = packet::zero(&mut self.sendbuf, PacketType::PingReq)
                .and_then(|len| self.send_packet(len, &mut timer));
            match result {
                Ok(()) => self.ping_outstanding = true,
                Err(_err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("keepalive ping failed: {}", _err);
                }
            }
        }
    }

    /// Pump `cycle` until the expected packet type is returned or the
    /// timer expires. Only used in single-threaded mode where one
    /// command at a time is in process.
    fn waitfor(&mut self, expected: PacketType, timer: &mut K) -> Result<(), Error> {
        loop {
            if timer.expired() {
                return Err(Error::Timeout);
            }
            if self.cycle(timer)? == Some(expected) {
                return Ok(());
            }
        }
    }

    /// Send the packet in `sendbuf` and wait for the terminal ack its
    /// QoS requires, clearing the in-flight slot on a matching id.
    fn send_and_wait_ack(&mut self, len: usize, timer: &mut K, qos: QoS) -> Result<(), Error> {
        self.send_packet(len, timer).map_err(|e| self.fail(e))?;

        let expected = match qos {
            QoS::AtMostOnce => return Ok(()),
            QoS::AtLeastOnce => PacketType::PubAck,
            QoS::ExactlyOnce => PacketType::PubComp,
        };
        self.waitfor(expected, timer).map_err(|e| self.fail(e))?;
        let (_, id) = packet::ack_id(&self.readbuf).map_err(|e| self.fail(e))?;
        if self.inflight.as_ref().is_some_and(|inflight| inflight.id == id) {
            self.inflight = None;
        }
        Ok(())
    }
}

impl<T, K, const MAX_PACKET_SIZE: usize, const MAX_HANDLERS: usize> core::fmt::Debug
    for Client<T, K, MAX_PACKET_SIZE, MAX_HANDLERS>
where
    T: Transport,
    K: Countdown + Default,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("connected", &self.connected)
            .field("keep_alive_seconds", &self.keep_alive_seconds)
            .field("clean_session", &self.clean_session)
            .field("ping_outstanding", &self.ping_outstanding)
            .finish_non_exhaustive()
    }
}
