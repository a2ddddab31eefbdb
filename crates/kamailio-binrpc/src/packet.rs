//! Packet framing.
//!
//! ```text
//!  byte 0          byte 1                     variable
//! | 0xA | ver 1 | flags | LL | CL | payload len (LL+1) | cookie (CL+1) | records... |
//! ```
//!
//! The payload length and cookie are big-endian, each 1 to 4 bytes wide.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{BinRpcError, BinRpcResult};
use crate::record::{Record, be_uint, decode_records, encode_records, min_width};

pub const MAGIC: u8 = 0xA;
pub const VERSION: u8 = 0x1;

/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Values carried by a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u8,
    pub payload_len: usize,
    pub cookie: u32,
}

impl Header {
    /// Append the header bytes to `buf`. The cookie is always 4 bytes wide.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let len_width = min_width(self.payload_len as u64).max(1);
        buf.push(MAGIC << 4 | VERSION);
        buf.push((self.flags & 0x0f) << 4 | ((len_width - 1) as u8) << 2 | 0x3);
        buf.extend_from_slice(&(self.payload_len as u64).to_be_bytes()[8 - len_width..]);
        buf.extend_from_slice(&self.cookie.to_be_bytes());
    }
}

/// Build a complete packet around `records`.
pub fn encode_packet(cookie: u32, records: &[Record]) -> Vec<u8> {
    let payload = encode_records(records);
    let header = Header {
        flags: 0,
        payload_len: payload.len(),
        cookie,
    };
    let mut buf = Vec::with_capacity(payload.len() + 10);
    header.encode(&mut buf);
    buf.extend_from_slice(&payload);
    buf
}

/// Build a request packet: the method name followed by its parameters.
pub fn encode_request(cookie: u32, method: &str, params: &[Record]) -> Vec<u8> {
    let mut records = Vec::with_capacity(params.len() + 1);
    records.push(Record::str(method));
    records.extend_from_slice(params);
    encode_packet(cookie, &records)
}

/// Read one packet and decode its records.
pub async fn read_packet<R>(reader: &mut R) -> BinRpcResult<(Header, Vec<Record>)>
where
    R: AsyncRead + Unpin,
{
    let mut fixed = [0u8; 2];
    reader.read_exact(&mut fixed).await?;
    if fixed[0] != MAGIC << 4 | VERSION {
        return Err(BinRpcError::BadMagic(fixed[0]));
    }

    let flags = fixed[1] >> 4;
    let len_width = ((fixed[1] >> 2) & 0x3) as usize + 1;
    let cookie_width = (fixed[1] & 0x3) as usize + 1;

    let mut variable = [0u8; 8];
    let variable = &mut variable[..len_width + cookie_width];
    reader.read_exact(variable).await?;

    let payload_len = be_uint(&variable[..len_width])? as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(BinRpcError::PayloadTooLarge(payload_len));
    }
    let cookie = be_uint(&variable[len_width..])? as u32;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    let header = Header {
        flags,
        payload_len,
        cookie,
    };
    Ok((header, decode_records(&payload)?))
}

/// Write a packet carrying `records` and flush it.
pub async fn write_packet<W>(writer: &mut W, cookie: u32, records: &[Record]) -> BinRpcResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_packet(cookie, records)).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let mut buf = Vec::new();
        Header {
            flags: 0,
            payload_len: 12,
            cookie: 0xdeadbeef,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0xa1, 0x03, 12, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn header_widens_length_field() {
        let mut buf = Vec::new();
        Header {
            flags: 0,
            payload_len: 0x1234,
            cookie: 1,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..4], &[0xa1, 0x07, 0x12, 0x34]);
    }

    #[test]
    fn request_starts_with_method_name() {
        let packet = encode_request(7, "tm.stats", &[]);
        // header: magic, widths, 1-byte length, 4-byte cookie
        assert_eq!(packet[0], 0xa1);
        assert_eq!(packet[2] as usize, packet.len() - 7);
        assert_eq!(&packet[3..7], &7u32.to_be_bytes());
        assert_eq!(
            decode_records(&packet[7..]).unwrap(),
            vec![Record::str("tm.stats")]
        );
    }

    #[tokio::test]
    async fn read_back_written_packet() {
        let records = vec![Record::from_items([("uptime", Record::Int(12345))])];
        let mut wire = Vec::new();
        write_packet(&mut wire, 42, &records).await.unwrap();

        let (header, decoded) = read_packet(&mut wire.as_slice()).await.unwrap();
        assert_eq!(header.cookie, 42);
        assert_eq!(header.payload_len, wire.len() - 7);
        assert_eq!(decoded, records);
    }

    #[tokio::test]
    async fn short_cookie_width_is_accepted() {
        // 1-byte length, 1-byte cookie, payload: int 5
        let wire = vec![0xa1, 0x00, 2, 0x9c, 0x10, 5];
        let (header, records) = read_packet(&mut wire.as_slice()).await.unwrap();
        assert_eq!(header.cookie, 0x9c);
        assert_eq!(records, vec![Record::Int(5)]);
    }

    #[tokio::test]
    async fn bad_magic_is_rejected() {
        let wire = vec![0xb1, 0x03, 0, 0, 0, 0, 0];
        let err = read_packet(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, BinRpcError::BadMagic(0xb1)));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        // 4-byte length of 0x7fffffff
        let wire = vec![0xa1, 0x0f, 0x7f, 0xff, 0xff, 0xff, 0, 0, 0, 1];
        let err = read_packet(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, BinRpcError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn eof_mid_payload_is_io_error() {
        let wire = vec![0xa1, 0x03, 10, 0, 0, 0, 1, 0x10];
        let err = read_packet(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, BinRpcError::Io(_)));
    }
}
