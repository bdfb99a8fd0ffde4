//! Fixed-layout binary framing for the tick synchronization protocol
//!
//! Every packet is a fixed-size header followed by an optional fixed-size
//! payload whose presence and size are determined by the header's type tag.
//! Since every packet type has a statically known size, no length prefix is
//! needed and several packets can be concatenated in one receive buffer.
//!
//! Layout is bincode's fixed-width little-endian encoding without padding:
//!
//! | Structure            | Fields                                   | Bytes |
//! |----------------------|------------------------------------------|-------|
//! | `ServerHeader`       | type u8, tick u64, adjustment i8, iter u8 | 11    |
//! | `ClientHeader`       | type u8, tick u64, iter u8               | 10    |
//! | `HelloPayload`       | tick u64, x f32, y f32                   | 16    |
//! | `AuthPayload`        | x f32, y f32                             | 8     |
//! | `InputUpdatePayload` | one bool byte per input kind             | 5     |

use crate::input::{InputActivationSet, INPUT_KIND_COUNT};
use crate::kinematics::EntityState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SERVER_HEADER_SIZE: usize = 11;
pub const CLIENT_HEADER_SIZE: usize = 10;
pub const HELLO_PAYLOAD_SIZE: usize = 16;
pub const AUTH_PAYLOAD_SIZE: usize = 8;
pub const INPUT_UPDATE_PAYLOAD_SIZE: usize = INPUT_KIND_COUNT;

/// Largest single packet in either direction
pub const MAX_PACKET_SIZE: usize = max(
    SERVER_HEADER_SIZE + HELLO_PAYLOAD_SIZE,
    CLIENT_HEADER_SIZE + INPUT_UPDATE_PAYLOAD_SIZE,
);

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown server packet type {0}")]
    UnknownServerType(u8),

    #[error("Unknown client packet type {0}")]
    UnknownClientType(u8),

    #[error("Receive buffer ends in the middle of a packet")]
    Truncated,

    #[error("Encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Type tags for server-originated packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerPacketType {
    Null = 0,
    Hello = 1,
    Auth = 2,
}

impl TryFrom<u8> for ServerPacketType {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ServerPacketType::Null),
            1 => Ok(ServerPacketType::Hello),
            2 => Ok(ServerPacketType::Auth),
            other => Err(CodecError::UnknownServerType(other)),
        }
    }
}

/// Type tags for client-originated packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientPacketType {
    Null = 0,
    InputUpdate = 1,
}

impl TryFrom<u8> for ClientPacketType {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ClientPacketType::Null),
            1 => Ok(ClientPacketType::InputUpdate),
            other => Err(CodecError::UnknownClientType(other)),
        }
    }
}

/// Header prefixed to every server packet, exactly as laid out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHeader {
    pub kind: u8,
    pub tick: u64,
    pub adjustment: i8,
    pub adjustment_iteration: u8,
}

/// Header prefixed to every client packet, exactly as laid out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHeader {
    pub kind: u8,
    pub tick: u64,
    pub adjustment_iteration: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub tick: u64,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub x: f32,
    pub y: f32,
}

impl AuthPayload {
    pub fn position(&self) -> EntityState {
        EntityState::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUpdatePayload {
    pub activation_set: InputActivationSet,
}

/// Body of a server packet, selected by the header's type tag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerBody {
    Null,
    Hello(HelloPayload),
    Auth(AuthPayload),
}

/// A decoded server packet: header metadata plus its typed body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerPacket {
    pub tick: u64,
    pub adjustment: i8,
    pub adjustment_iteration: u8,
    pub body: ServerBody,
}

impl ServerPacket {
    /// Handshake sent once per new connection
    pub fn hello(tick: u64, position: EntityState) -> Self {
        Self {
            tick,
            adjustment: 0,
            adjustment_iteration: 0,
            body: ServerBody::Hello(HelloPayload {
                tick,
                x: position.x,
                y: position.y,
            }),
        }
    }

    pub fn kind(&self) -> ServerPacketType {
        match self.body {
            ServerBody::Null => ServerPacketType::Null,
            ServerBody::Hello(_) => ServerPacketType::Hello,
            ServerBody::Auth(_) => ServerPacketType::Auth,
        }
    }

    pub fn header(&self) -> ServerHeader {
        ServerHeader {
            kind: self.kind() as u8,
            tick: self.tick,
            adjustment: self.adjustment,
            adjustment_iteration: self.adjustment_iteration,
        }
    }
}

/// Body of a client packet, selected by the header's type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientBody {
    Null,
    InputUpdate(InputUpdatePayload),
}

/// A decoded client packet: header metadata plus its typed body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPacket {
    pub tick: u64,
    pub adjustment_iteration: u8,
    pub body: ClientBody,
}

impl ClientPacket {
    pub fn input_update(tick: u64, adjustment_iteration: u8, activation_set: InputActivationSet) -> Self {
        Self {
            tick,
            adjustment_iteration,
            body: ClientBody::InputUpdate(InputUpdatePayload { activation_set }),
        }
    }

    pub fn kind(&self) -> ClientPacketType {
        match self.body {
            ClientBody::Null => ClientPacketType::Null,
            ClientBody::InputUpdate(_) => ClientPacketType::InputUpdate,
        }
    }

    pub fn header(&self) -> ClientHeader {
        ClientHeader {
            kind: self.kind() as u8,
            tick: self.tick,
            adjustment_iteration: self.adjustment_iteration,
        }
    }
}

/// Bump-allocated output buffer with a hard capacity
///
/// Appending past capacity panics: buffers are sized to the largest packet
/// the protocol can produce, so overflowing one is a programming error.
#[derive(Debug)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl ByteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffer large enough for any single protocol packet
    pub fn for_packets() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }

    /// Appends the fixed-size encoding of `value`
    pub fn append<T: Serialize>(&mut self, value: &T) -> Result<(), CodecError> {
        let size = bincode::serialized_size(value)? as usize;
        assert!(
            self.bytes.len() + size <= self.capacity,
            "byte buffer overflow: {} + {} bytes exceeds capacity {}",
            self.bytes.len(),
            size,
            self.capacity
        );
        bincode::serialize_into(&mut self.bytes, value)?;
        Ok(())
    }

    /// Resets the top of the buffer without releasing memory
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Appends a server packet (header then optional payload) to `buffer`
pub fn encode_server(buffer: &mut ByteBuffer, packet: &ServerPacket) -> Result<(), CodecError> {
    buffer.append(&packet.header())?;
    match &packet.body {
        ServerBody::Null => {}
        ServerBody::Hello(payload) => buffer.append(payload)?,
        ServerBody::Auth(payload) => buffer.append(payload)?,
    }
    Ok(())
}

/// Appends a client packet (header then optional payload) to `buffer`
pub fn encode_client(buffer: &mut ByteBuffer, packet: &ClientPacket) -> Result<(), CodecError> {
    buffer.append(&packet.header())?;
    match &packet.body {
        ClientBody::Null => {}
        ClientBody::InputUpdate(payload) => buffer.append(payload)?,
    }
    Ok(())
}

/// Decodes every server packet in a contiguous receive buffer, in arrival order
pub fn decode_server_stream(bytes: &[u8]) -> Result<Vec<ServerPacket>, CodecError> {
    let mut cursor = bytes;
    let mut packets = Vec::new();

    while !cursor.is_empty() {
        let header: ServerHeader = read(&mut cursor)?;
        let body = match ServerPacketType::try_from(header.kind)? {
            ServerPacketType::Null => ServerBody::Null,
            ServerPacketType::Hello => ServerBody::Hello(read(&mut cursor)?),
            ServerPacketType::Auth => ServerBody::Auth(read(&mut cursor)?),
        };

        packets.push(ServerPacket {
            tick: header.tick,
            adjustment: header.adjustment,
            adjustment_iteration: header.adjustment_iteration,
            body,
        });
    }

    Ok(packets)
}

/// Decodes every client packet in a contiguous receive buffer, in arrival order
pub fn decode_client_stream(bytes: &[u8]) -> Result<Vec<ClientPacket>, CodecError> {
    let mut cursor = bytes;
    let mut packets = Vec::new();

    while !cursor.is_empty() {
        let header: ClientHeader = read(&mut cursor)?;
        let body = match ClientPacketType::try_from(header.kind)? {
            ClientPacketType::Null => ClientBody::Null,
            ClientPacketType::InputUpdate => ClientBody::InputUpdate(read(&mut cursor)?),
        };

        packets.push(ClientPacket {
            tick: header.tick,
            adjustment_iteration: header.adjustment_iteration,
            body,
        });
    }

    Ok(packets)
}

/// Reads one fixed-size structure and advances the cursor past it
fn read<T: DeserializeOwned>(cursor: &mut &[u8]) -> Result<T, CodecError> {
    bincode::deserialize_from(cursor).map_err(|e| {
        if let bincode::ErrorKind::Io(io) = e.as_ref() {
            if io.kind() == std::io::ErrorKind::UnexpectedEof {
                return CodecError::Truncated;
            }
        }
        CodecError::Bincode(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputKind;

    fn encoded_server(packets: &[ServerPacket]) -> Vec<u8> {
        let mut out = Vec::new();
        for packet in packets {
            let mut buffer = ByteBuffer::for_packets();
            encode_server(&mut buffer, packet).unwrap();
            out.extend_from_slice(buffer.as_slice());
        }
        out
    }

    #[test]
    fn test_structure_sizes_match_layout() {
        let server_header = ServerHeader {
            kind: 0,
            tick: 0,
            adjustment: 0,
            adjustment_iteration: 0,
        };
        let client_header = ClientHeader {
            kind: 0,
            tick: 0,
            adjustment_iteration: 0,
        };
        let hello = HelloPayload { tick: 0, x: 0.0, y: 0.0 };
        let auth = AuthPayload { x: 0.0, y: 0.0 };
        let input = InputUpdatePayload {
            activation_set: InputActivationSet::new(),
        };

        assert_eq!(bincode::serialized_size(&server_header).unwrap() as usize, SERVER_HEADER_SIZE);
        assert_eq!(bincode::serialized_size(&client_header).unwrap() as usize, CLIENT_HEADER_SIZE);
        assert_eq!(bincode::serialized_size(&hello).unwrap() as usize, HELLO_PAYLOAD_SIZE);
        assert_eq!(bincode::serialized_size(&auth).unwrap() as usize, AUTH_PAYLOAD_SIZE);
        assert_eq!(bincode::serialized_size(&input).unwrap() as usize, INPUT_UPDATE_PAYLOAD_SIZE);
        assert_eq!(MAX_PACKET_SIZE, 27);
    }

    #[test]
    fn test_header_is_little_endian() {
        let packet = ServerPacket {
            tick: 0x0102,
            adjustment: -1,
            adjustment_iteration: 7,
            body: ServerBody::Null,
        };
        let bytes = encoded_server(&[packet]);
        assert_eq!(bytes, vec![0, 0x02, 0x01, 0, 0, 0, 0, 0, 0, 0xFF, 7]);
    }

    #[test]
    fn test_null_packet_has_no_payload() {
        let packet = ServerPacket {
            tick: 5,
            adjustment: 3,
            adjustment_iteration: 1,
            body: ServerBody::Null,
        };
        let bytes = encoded_server(&[packet]);
        assert_eq!(bytes.len(), SERVER_HEADER_SIZE);
    }

    #[test]
    fn test_decode_concatenated_server_stream() {
        let packets = [
            ServerPacket::hello(42, EntityState::new(400.0, 300.0)),
            ServerPacket {
                tick: 43,
                adjustment: 0,
                adjustment_iteration: 0,
                body: ServerBody::Auth(AuthPayload { x: 410.0, y: 300.0 }),
            },
            ServerPacket {
                tick: 44,
                adjustment: -2,
                adjustment_iteration: 0,
                body: ServerBody::Null,
            },
        ];
        let bytes = encoded_server(&packets);
        assert_eq!(
            bytes.len(),
            3 * SERVER_HEADER_SIZE + HELLO_PAYLOAD_SIZE + AUTH_PAYLOAD_SIZE
        );

        let decoded = decode_server_stream(&bytes).unwrap();
        assert_eq!(decoded, packets.to_vec());
    }

    #[test]
    fn test_decode_client_stream() {
        let first = ClientPacket::input_update(
            10,
            0,
            InputActivationSet::with(&[InputKind::MoveLeft]),
        );
        let second = ClientPacket::input_update(
            11,
            1,
            InputActivationSet::with(&[InputKind::MoveDown, InputKind::MoveRight]),
        );

        let mut buffer = ByteBuffer::new(2 * MAX_PACKET_SIZE);
        encode_client(&mut buffer, &first).unwrap();
        encode_client(&mut buffer, &second).unwrap();
        assert_eq!(
            buffer.len(),
            2 * (CLIENT_HEADER_SIZE + INPUT_UPDATE_PAYLOAD_SIZE)
        );

        let decoded = decode_client_stream(buffer.as_slice()).unwrap();
        assert_eq!(decoded, vec![first, second]);
    }

    #[test]
    fn test_decoded_input_never_carries_none_sentinel() {
        let packet = ClientPacket::input_update(
            5,
            0,
            InputActivationSet::with(&[InputKind::MoveUp]),
        );
        let mut buffer = ByteBuffer::for_packets();
        encode_client(&mut buffer, &packet).unwrap();
        let mut bytes = buffer.as_slice().to_vec();
        bytes[CLIENT_HEADER_SIZE + InputKind::None.index()] = 1;

        let decoded = decode_client_stream(&bytes).unwrap();
        assert_eq!(decoded, vec![packet]);
    }

    #[test]
    fn test_empty_stream_decodes_to_nothing() {
        assert!(decode_server_stream(&[]).unwrap().is_empty());
        assert!(decode_client_stream(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_stream_is_rejected() {
        let bytes = encoded_server(&[ServerPacket::hello(1, EntityState::new(1.0, 2.0))]);
        let result = decode_server_stream(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CodecError::Truncated)));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut bytes = encoded_server(&[ServerPacket::hello(1, EntityState::new(1.0, 2.0))]);
        bytes[0] = 9;
        assert!(matches!(
            decode_server_stream(&bytes),
            Err(CodecError::UnknownServerType(9))
        ));

        let mut buffer = ByteBuffer::for_packets();
        encode_client(&mut buffer, &ClientPacket::input_update(1, 0, InputActivationSet::new())).unwrap();
        let mut bytes = buffer.as_slice().to_vec();
        bytes[0] = 4;
        assert!(matches!(
            decode_client_stream(&bytes),
            Err(CodecError::UnknownClientType(4))
        ));
    }

    #[test]
    fn test_buffer_clear_resets_top() {
        let mut buffer = ByteBuffer::for_packets();
        encode_server(&mut buffer, &ServerPacket::hello(1, EntityState::default())).unwrap();
        assert_eq!(buffer.len(), MAX_PACKET_SIZE);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), MAX_PACKET_SIZE);
    }

    #[test]
    #[should_panic(expected = "byte buffer overflow")]
    fn test_buffer_overflow_panics() {
        let mut buffer = ByteBuffer::new(SERVER_HEADER_SIZE);
        encode_server(&mut buffer, &ServerPacket::hello(1, EntityState::default())).unwrap();
    }
}
