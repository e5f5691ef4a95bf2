//! MQTT 3.1.1 wire codec.
//!
//! Serializers write a complete control packet (fixed header, variable
//! header, payload) into the caller's buffer and return the number of
//! bytes written; a packet that does not fit is `Error::BufferOverflow`.
//! Deserializers parse a buffer that starts with the fixed header and
//! never read past the remaining length it declares; malformed input is
//! `Error::ProtocolError`.

use crate::error::Error;
use crate::mqtt::{ConnectOptions, Message, PacketType, QoS};

/// Largest value representable by the remaining-length encoding.
pub(crate) const MAX_REMAINING_LENGTH: usize = 268_435_455;

const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
const CONNECT_FLAG_WILL: u8 = 0x04;
const CONNECT_FLAG_WILL_RETAIN: u8 = 0x20;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_USERNAME: u8 = 0x80;

/// Encode `value` in the 7-bits-per-byte continuation scheme at the
/// start of `buf`. Returns the number of bytes written (1-4).
pub(crate) fn encode_remaining_length(buf: &mut [u8], mut value: usize) -> Result<usize, Error> {
    if value > MAX_REMAINING_LENGTH {
        return Err(Error::ProtocolError);
    }
    let mut written = 0;
    loop {
        if written >= buf.len() {
            return Err(Error::BufferOverflow);
        }
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf[written] = byte;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Decode a remaining-length field at the start of `buf`. Returns the
/// value and the number of bytes it occupied. Fails if a fifth byte
/// would be required or the buffer ends mid-field.
pub(crate) fn decode_remaining_length(buf: &[u8]) -> Result<(usize, usize), Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 4 {
            return Err(Error::ProtocolError);
        }
        value += (byte as usize & 0x7F) * multiplier;
        multiplier *= 128;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::ProtocolError)
}

/// Number of bytes the remaining-length encoding of `value` occupies.
const fn remaining_length_size(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

fn write_u16(buf: &mut [u8], offset: &mut usize, value: u16) {
    buf[*offset..*offset + 2].copy_from_slice(&value.to_be_bytes());
    *offset += 2;
}

fn write_binary(buf: &mut [u8], offset: &mut usize, data: &[u8]) {
    write_u16(buf, offset, data.len() as u16);
    buf[*offset..*offset + data.len()].copy_from_slice(data);
    *offset += data.len();
}

fn write_string(buf: &mut [u8], offset: &mut usize, s: &str) {
    write_binary(buf, offset, s.as_bytes());
}

fn read_u16(buf: &[u8], offset: &mut usize) -> Result<u16, Error> {
    if *offset + 2 > buf.len() {
        return Err(Error::ProtocolError);
    }
    let value = u16::from_be_bytes([buf[*offset], buf[*offset + 1]]);
    *offset += 2;
    Ok(value)
}

fn read_binary<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a [u8], Error> {
    let len = read_u16(buf, offset)? as usize;
    if *offset + len > buf.len() {
        return Err(Error::ProtocolError);
    }
    let data = &buf[*offset..*offset + len];
    *offset += len;
    Ok(data)
}

fn read_string<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a str, Error> {
    core::str::from_utf8(read_binary(buf, offset)?).map_err(|_| Error::ProtocolError)
}

/// Write the fixed header and check that the whole packet fits.
/// Returns the offset just past the remaining-length field.
fn start_packet(buf: &mut [u8], header: u8, remaining: usize) -> Result<usize, Error> {
    let total = 1 + remaining_length_size(remaining) + remaining;
    if total > buf.len() {
        return Err(Error::BufferOverflow);
    }
    buf[0] = header;
    let len_bytes = encode_remaining_length(&mut buf[1..], remaining)?;
    Ok(1 + len_bytes)
}

/// Serialize a CONNECT packet.
pub(crate) fn connect(buf: &mut [u8], options: &ConnectOptions<'_>) -> Result<usize, Error> {
    let (protocol_name, protocol_level): (&str, u8) = match options.mqtt_version {
        3 => ("MQIsdp", 3),
        4 => ("MQTT", 4),
        _ => return Err(Error::ProtocolError),
    };

    let mut flags = 0u8;
    if options.clean_session {
        flags |= CONNECT_FLAG_CLEAN_SESSION;
    }
    if let Some(will) = &options.will {
        flags |= CONNECT_FLAG_WILL | ((will.qos as u8) << 3);
        if will.retained {
            flags |= CONNECT_FLAG_WILL_RETAIN;
        }
    }
    if options.username.is_some() {
        flags |= CONNECT_FLAG_USERNAME;
    }
    if options.password.is_some() {
        flags |= CONNECT_FLAG_PASSWORD;
    }

    let mut remaining = 2 + protocol_name.len() + 1 + 1 + 2;
    remaining += 2 + options.client_id.len();
    if let Some(will) = &options.will {
        remaining += 2 + will.topic.len();
        remaining += 2 + will.message.len();
    }
    if let Some(username) = options.username {
        remaining += 2 + username.len();
    }
    if let Some(password) = options.password {
        remaining += 2 + password.len();
    }

    let mut offset = start_packet(buf, PacketType::Connect.header_byte(), remaining)?;
    write_string(buf, &mut offset, protocol_name);
    buf[offset] = protocol_level;
    offset += 1;
    buf[offset] = flags;
    offset += 1;
    write_u16(buf, &mut offset, options.keep_alive_seconds);
    write_string(buf, &mut offset, options.client_id);
    if let Some(will) = &options.will {
        write_string(buf, &mut offset, will.topic);
        write_binary(buf, &mut offset, will.message);
    }
    if let Some(username) = options.username {
        write_string(buf, &mut offset, username);
    }
    if let Some(password) = options.password {
        write_binary(buf, &mut offset, password);
    }
    Ok(offset)
}

/// Deserialize a CONNACK packet into (session_present, return_code).
pub(crate) fn connack(buf: &[u8]) -> Result<(bool, u8), Error> {
    let body = body_of(buf, PacketType::ConnAck)?;
    if body.len() != 2 {
        return Err(Error::ProtocolError);
    }
    Ok((body[0] & 0x01 != 0, body[1]))
}

/// Serialize a PUBLISH packet.
pub(crate) fn publish(
    buf: &mut [u8],
    dup: bool,
    qos: QoS,
    retained: bool,
    id: u16,
    topic: &str,
    payload: &[u8],
) -> Result<usize, Error> {
    let mut header = (PacketType::Publish as u8) << 4 | ((qos as u8) << 1);
    if dup {
        header |= 0x08;
    }
    if retained {
        header |= 0x01;
    }

    let mut remaining = 2 + topic.len() + payload.len();
    if qos != QoS::AtMostOnce {
        remaining += 2;
    }

    let mut offset = start_packet(buf, header, remaining)?;
    write_string(buf, &mut offset, topic);
    if qos != QoS::AtMostOnce {
        write_u16(buf, &mut offset, id);
    }
    buf[offset..offset + payload.len()].copy_from_slice(payload);
    Ok(offset + payload.len())
}

/// Deserialize a PUBLISH packet into a borrowed [`Message`].
pub(crate) fn publish_message(buf: &[u8]) -> Result<Message<'_>, Error> {
    if buf.is_empty() || PacketType::from_header(buf[0]) != Some(PacketType::Publish) {
        return Err(Error::ProtocolError);
    }
    let flags = buf[0] & 0x0F;
    let qos = QoS::from_bits((flags >> 1) & 0b11).ok_or(Error::ProtocolError)?;
    let body = body_of(buf, PacketType::Publish)?;

    let mut offset = 0;
    let topic = read_string(body, &mut offset)?;
    let id = if qos != QoS::AtMostOnce {
        read_u16(body, &mut offset)?
    } else {
        0
    };
    Ok(Message {
        topic,
        payload: &body[offset..],
        qos,
        dup: flags & 0x08 != 0,
        retained: flags & 0x01 != 0,
        id,
    })
}

/// Serialize one of the two-byte-body acks: PUBACK, PUBREC, PUBREL or
/// PUBCOMP.
pub(crate) fn ack(buf: &mut [u8], packet_type: PacketType, id: u16) -> Result<usize, Error> {
    let mut offset = start_packet(buf, packet_type.header_byte(), 2)?;
    write_u16(buf, &mut offset, id);
    Ok(offset)
}

/// Deserialize an ack packet into (packet_type, packet_id).
pub(crate) fn ack_id(buf: &[u8]) -> Result<(PacketType, u16), Error> {
    let packet_type = PacketType::from_header(*buf.first().ok_or(Error::ProtocolError)?)
        .ok_or(Error::ProtocolError)?;
    let body = body_of(buf, packet_type)?;
    if body.len() < 2 {
        return Err(Error::ProtocolError);
    }
    Ok((packet_type, u16::from_be_bytes([body[0], body[1]])))
}

/// Serialize a SUBSCRIBE packet with a single topic filter.
pub(crate) fn subscribe(buf: &mut [u8], id: u16, filter: &str, qos: QoS) -> Result<usize, Error> {
    let remaining = 2 + 2 + filter.len() + 1;
    let mut offset = start_packet(buf, PacketType::Subscribe.header_byte(), remaining)?;
    write_u16(buf, &mut offset, id);
    write_string(buf, &mut offset, filter);
    buf[offset] = qos as u8;
    Ok(offset + 1)
}

/// Deserialize a SUBACK packet into (packet_id, granted_qos_or_0x80).
pub(crate) fn suback(buf: &[u8]) -> Result<(u16, u8), Error> {
    let body = body_of(buf, PacketType::SubAck)?;
    if body.len() < 3 {
        return Err(Error::ProtocolError);
    }
    Ok((u16::from_be_bytes([body[0], body[1]]), body[2]))
}

/// Serialize an UNSUBSCRIBE packet with a single topic filter.
pub(crate) fn unsubscribe(buf: &mut [u8], id: u16, filter: &str) -> Result<usize, Error> {
    let remaining = 2 + 2 + filter.len();
    let mut offset = start_packet(buf, PacketType::Unsubscribe.header_byte(), remaining)?;
    write_u16(buf, &mut offset, id);
    write_string(buf, &mut offset, filter);
    Ok(offset)
}

/// Deserialize an UNSUBACK packet into its packet id.
pub(crate) fn unsuback(buf: &[u8]) -> Result<u16, Error> {
    let body = body_of(buf, PacketType::UnsubAck)?;
    if body.len() != 2 {
        return Err(Error::ProtocolError);
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

/// Serialize a bodyless packet: PINGREQ, PINGRESP or DISCONNECT.
pub(crate) fn zero(buf: &mut [u8], packet_type: PacketType) -> Result<usize, Error> {
    start_packet(buf, packet_type.header_byte(), 0)
}

/// Bound `buf` to the body declared by its remaining-length field,
/// checking the packet type on the way.
fn body_of(buf: &[u8], expected: PacketType) -> Result<&[u8], Error> {
    if buf.is_empty() || PacketType::from_header(buf[0]) != Some(expected) {
        return Err(Error::ProtocolError);
    }
    let (remaining, len_bytes) = decode_remaining_length(&buf[1..])?;
    let start = 1 + len_bytes;
    if start + remaining > buf.len() {
        return Err(Error::ProtocolError);
    }
    Ok(&buf[start..start + remaining])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::Will;

    #[test]
    fn test_remaining_length_single_byte() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_remaining_length(&mut buf, 0), Ok(1));
        assert_eq!(buf[0], 0x00);
        assert_eq!(encode_remaining_length(&mut buf, 127), Ok(1));
        assert_eq!(buf[0], 0x7F);
    }

    #[test]
    fn test_remaining_length_multi_byte() {
        let mut buf = [0u8; 4];
        assert_eq!(encode_remaining_length(&mut buf, 128), Ok(2));
        assert_eq!(&buf[..2], &[0x80, 0x01]);
        assert_eq!(encode_remaining_length(&mut buf, 16_383), Ok(2));
        assert_eq!(&buf[..2], &[0xFF, 0x7F]);
        assert_eq!(encode_remaining_length(&mut buf, 2_097_152), Ok(4));
        assert_eq!(&buf[..4], &[0x80, 0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_remaining_length_roundtrip() {
        let mut buf = [0u8; 4];
        for value in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, MAX_REMAINING_LENGTH] {
            let written = encode_remaining_length(&mut buf, value).unwrap();
            assert_eq!(decode_remaining_length(&buf[..written]), Ok((value, written)));
        }
    }

    #[test]
    fn test_remaining_length_too_large() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_remaining_length(&mut buf, MAX_REMAINING_LENGTH + 1),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_remaining_length_fifth_byte_rejected() {
        assert_eq!(
            decode_remaining_length(&[0x80, 0x80, 0x80, 0x80, 0x01]),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_remaining_length_truncated() {
        assert_eq!(decode_remaining_length(&[0x80]), Err(Error::ProtocolError));
        assert_eq!(decode_remaining_length(&[]), Err(Error::ProtocolError));
    }

    #[test]
    fn test_connect_minimal() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "abc",
            keep_alive_seconds: 60,
            clean_session: true,
            ..ConnectOptions::default()
        };
        let len = connect(&mut buf, &options).unwrap();
        let expected: [u8; 17] = [
            0x10, 0x0F, // Fixed header (remaining length = 15)
            0x00, 0x04, // Protocol Name Length
            0x4D, 0x51, 0x54, 0x54, // Protocol Name "MQTT"
            0x04, // Protocol Level
            0b0000_0010, // Connect Flags (Clean Session)
            0x00, 0x3C, // Keep Alive (60 seconds)
            0x00, 0x03, // Client ID Length
            0x61, 0x62, 0x63, // Client ID "abc"
        ];
        assert_eq!(&buf[..len], &expected);
    }

    #[test]
    fn test_connect_with_credentials() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "abc",
            username: Some("user1"),
            password: Some(b"pass1"),
            ..ConnectOptions::default()
        };
        let len = connect(&mut buf, &options).unwrap();
        // Flags: username + password + clean session
        assert_eq!(buf[9], 0b1100_0010);
        assert_eq!(&buf[len - 14..len - 12], &[0x00, 0x05]);
        assert_eq!(&buf[len - 12..len - 7], b"user1");
        assert_eq!(&buf[len - 5..len], b"pass1");
    }

    #[test]
    fn test_connect_with_will() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "abc",
            will: Some(Will {
                topic: "willtp",
                message: b"willmsg",
                qos: QoS::AtLeastOnce,
                retained: true,
            }),
            ..ConnectOptions::default()
        };
        let len = connect(&mut buf, &options).unwrap();
        // Flags: will retain + will QoS 1 + will + clean session
        assert_eq!(buf[9], 0b0010_1110);
        assert_eq!(&buf[17..25], b"\x00\x06willtp");
        assert_eq!(&buf[25..25 + 9], b"\x00\x07willmsg");
        assert_eq!(len, 34);
    }

    #[test]
    fn test_connect_version_3() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "abc",
            mqtt_version: 3,
            ..ConnectOptions::default()
        };
        let len = connect(&mut buf, &options).unwrap();
        assert_eq!(&buf[2..10], b"\x00\x06MQIsdp");
        assert_eq!(buf[10], 3);
        assert_eq!(len, 19);
    }

    #[test]
    fn test_connect_overflow() {
        let mut buf = [0u8; 16];
        let options = ConnectOptions {
            client_id: "a-rather-long-client-identifier",
            ..ConnectOptions::default()
        };
        assert_eq!(connect(&mut buf, &options), Err(Error::BufferOverflow));
    }

    #[test]
    fn test_connack_decode() {
        assert_eq!(connack(&[0x20, 0x02, 0x00, 0x00]), Ok((false, 0)));
        assert_eq!(connack(&[0x20, 0x02, 0x01, 0x05]), Ok((true, 5)));
        assert_eq!(connack(&[0x20, 0x01, 0x00]), Err(Error::ProtocolError));
        assert_eq!(connack(&[0x30, 0x02, 0x00, 0x00]), Err(Error::ProtocolError));
    }

    #[test]
    fn test_publish_qos0_roundtrip() {
        let mut buf = [0u8; 64];
        let len = publish(&mut buf, false, QoS::AtMostOnce, false, 0, "a/b", b"hi").unwrap();
        assert_eq!(&buf[..len], &[0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i']);

        let msg = publish_message(&buf[..len]).unwrap();
        assert_eq!(msg.topic, "a/b");
        assert_eq!(msg.payload, b"hi");
        assert_eq!(msg.qos, QoS::AtMostOnce);
        assert_eq!(msg.id, 0);
        assert!(!msg.dup);
        assert!(!msg.retained);
    }

    #[test]
    fn test_publish_qos2_flags_and_id() {
        let mut buf = [0u8; 64];
        let len = publish(&mut buf, true, QoS::ExactlyOnce, true, 42, "x", b"v1").unwrap();
        // DUP + QoS 2 + RETAIN
        assert_eq!(buf[0], 0x3D);

        let msg = publish_message(&buf[..len]).unwrap();
        assert_eq!(msg.id, 42);
        assert_eq!(msg.qos, QoS::ExactlyOnce);
        assert!(msg.dup);
        assert!(msg.retained);
        assert_eq!(msg.payload, b"v1");
    }

    #[test]
    fn test_publish_decode_rejects_qos3() {
        // QoS bits set to 3
        assert_eq!(
            publish_message(&[0x36, 0x05, 0x00, 0x01, b'a', 0x00, 0x01]),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_publish_decode_truncated_topic() {
        assert_eq!(
            publish_message(&[0x30, 0x04, 0x00, 0x09, b'a', b'b']),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_publish_overflow() {
        let mut buf = [0u8; 10];
        assert_eq!(
            publish(&mut buf, false, QoS::AtMostOnce, false, 0, "topic", b"0123456789"),
            Err(Error::BufferOverflow)
        );
    }

    #[test]
    fn test_ack_roundtrip() {
        let mut buf = [0u8; 8];
        let len = ack(&mut buf, PacketType::PubAck, 7).unwrap();
        assert_eq!(&buf[..len], &[0x40, 0x02, 0x00, 0x07]);
        assert_eq!(ack_id(&buf[..len]), Ok((PacketType::PubAck, 7)));
    }

    #[test]
    fn test_pubrel_fixed_flags() {
        let mut buf = [0u8; 8];
        let len = ack(&mut buf, PacketType::PubRel, 300).unwrap();
        assert_eq!(&buf[..len], &[0x62, 0x02, 0x01, 0x2C]);
        assert_eq!(ack_id(&buf[..len]), Ok((PacketType::PubRel, 300)));
    }

    #[test]
    fn test_subscribe_wire_layout() {
        let mut buf = [0u8; 32];
        let len = subscribe(&mut buf, 2, "a/+", QoS::AtLeastOnce).unwrap();
        assert_eq!(
            &buf[..len],
            &[0x82, 0x08, 0x00, 0x02, 0x00, 0x03, b'a', b'/', b'+', 0x01]
        );
    }

    #[test]
    fn test_suback_decode() {
        assert_eq!(suback(&[0x90, 0x03, 0x00, 0x02, 0x01]), Ok((2, 1)));
        assert_eq!(suback(&[0x90, 0x03, 0x00, 0x02, 0x80]), Ok((2, 0x80)));
        assert_eq!(suback(&[0x90, 0x02, 0x00, 0x02]), Err(Error::ProtocolError));
    }

    #[test]
    fn test_unsubscribe_roundtrip() {
        let mut buf = [0u8; 32];
        let len = unsubscribe(&mut buf, 9, "a/b").unwrap();
        assert_eq!(&buf[..len], &[0xA2, 0x07, 0x00, 0x09, 0x00, 0x03, b'a', b'/', b'b']);
        assert_eq!(unsuback(&[0xB0, 0x02, 0x00, 0x09]), Ok(9));
    }

    #[test]
    fn test_zero_packets() {
        let mut buf = [0u8; 4];
        assert_eq!(zero(&mut buf, PacketType::PingReq), Ok(2));
        assert_eq!(&buf[..2], &[0xC0, 0x00]);
        assert_eq!(zero(&mut buf, PacketType::Disconnect), Ok(2));
        assert_eq!(&buf[..2], &[0xE0, 0x00]);
    }
}
