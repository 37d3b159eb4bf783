// Wire protocol: one JSON object per message, terminated by an 8-byte
// sentinel rather than a length prefix.
//
// `Packet` carries both requests and responses — the shape is symmetric,
// so `Packet{ option: ADD_BLOCK, data }` goes out and `Packet{ option: 0,
// data: "ok" }` comes back over the same framing. The sentinel-scanning
// accumulate loop below keeps the same shape a length-prefixed framer
// would use (grow a buffer, check for completeness, trim and return) but
// the completeness check is "does the sentinel appear" rather than "have
// we read `len` bytes".

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{BUFFSIZE, DMAXSIZE, ENDBYTES};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Opcode {
    AddBlock = 1,
    AddTrnsx = 2,
    GetBlock = 3,
    GetLHash = 4,
    GetBlnce = 5,
    Wakeup = 6,
}

impl Opcode {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(Opcode::AddBlock),
            2 => Some(Opcode::AddTrnsx),
            3 => Some(Opcode::GetBlock),
            4 => Some(Opcode::GetLHash),
            5 => Some(Opcode::GetBlnce),
            6 => Some(Opcode::Wakeup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Packet {
    #[serde(rename = "Option")]
    pub option: i32,
    #[serde(rename = "Data")]
    pub data: String,
}

impl Packet {
    pub fn new(option: Opcode, data: impl Into<String>) -> Self {
        Packet { option: option as i32, data: data.into() }
    }

    pub fn reply(data: impl Into<String>) -> Self {
        Packet { option: 0, data: data.into() }
    }

    fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.extend_from_slice(&ENDBYTES);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Writes `pkt` followed by the sentinel. The transport is stateless: one
/// packet per connection.
pub async fn write_packet(stream: &mut TcpStream, pkt: &Packet) -> Result<(), TransportError> {
    let bytes = pkt.encode()?;
    stream.write_all(&bytes).await?;
    Ok(())
}

/// Accumulates bytes until the sentinel is found or `DMAXSIZE` is
/// exceeded, strips the sentinel, and parses the remaining JSON.
pub async fn read_packet(stream: &mut TcpStream) -> Result<Packet, TransportError> {
    let mut buf: Vec<u8> = Vec::new();
    let mut scratch = [0u8; BUFFSIZE];

    loop {
        if let Some(pos) = find_sentinel(&buf) {
            return Packet::decode(&buf[..pos]);
        }
        if buf.len() > DMAXSIZE {
            return Err(TransportError::OversizedMessage);
        }

        let n = stream.read(&mut scratch).await?;
        if n == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before sentinel was seen",
            )));
        }
        buf.extend_from_slice(&scratch[..n]);
    }
}

fn find_sentinel(buf: &[u8]) -> Option<usize> {
    if buf.len() < ENDBYTES.len() {
        return None;
    }
    buf.windows(ENDBYTES.len()).position(|w| w == ENDBYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_field_names_match_wire_contract() {
        let pkt = Packet::new(Opcode::GetLHash, "");
        let json = serde_json::to_string(&pkt).unwrap();
        assert!(json.contains("\"Option\""));
        assert!(json.contains("\"Data\""));
    }

    #[test]
    fn test_encode_appends_sentinel() {
        let pkt = Packet::reply("ok");
        let bytes = pkt.encode().unwrap();
        assert!(bytes.ends_with(&ENDBYTES));
    }

    #[test]
    fn test_decode_roundtrip() {
        let pkt = Packet::new(Opcode::AddTrnsx, "payload");
        let encoded = pkt.encode().unwrap();
        let body = &encoded[..encoded.len() - ENDBYTES.len()];
        let decoded = Packet::decode(body).unwrap();
        assert_eq!(decoded.option, Opcode::AddTrnsx as i32);
        assert_eq!(decoded.data, "payload");
    }

    #[test]
    fn test_find_sentinel_requires_full_match() {
        let mut buf = b"not quite".to_vec();
        assert_eq!(find_sentinel(&buf), None);
        buf.extend_from_slice(&ENDBYTES);
        assert_eq!(find_sentinel(&buf), Some(9));
    }

    #[test]
    fn test_opcode_roundtrip() {
        for op in [
            Opcode::AddBlock,
            Opcode::AddTrnsx,
            Opcode::GetBlock,
            Opcode::GetLHash,
            Opcode::GetBlnce,
            Opcode::Wakeup,
        ] {
            assert_eq!(Opcode::from_i32(op as i32), Some(op));
        }
        assert_eq!(Opcode::from_i32(99), None);
    }
}
