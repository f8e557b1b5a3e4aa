//! The length-prefixed request/reply wire protocol between client and
//! server (§4.8, §6).
//!
//! Every connection opens with a 4-byte magic `0x504F524D` ("PORM") and a
//! version byte. Every request and response after that is one frame: a
//! 4-byte big-endian length, then exactly that many payload bytes.

use crate::error::OramError;
use crate::path_oram::LeafLabel;
use crate::ShardIndex;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

const MAGIC: u32 = 0x504F_524D;
const VERSION: u8 = 0x01;

/// The two operations a request can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Fetch every bucket on `P(leaf)`.
    ReadPath = 0x01,
    /// Replace every bucket on `P(leaf)`.
    WritePath = 0x02,
}

impl Op {
    fn from_byte(byte: u8) -> Result<Self, OramError> {
        match byte {
            0x01 => Ok(Op::ReadPath),
            0x02 => Ok(Op::WritePath),
            other => Err(OramError::Protocol(format!("unrecognized opcode {other:#x}"))),
        }
    }
}

/// A decoded request, as described by the request payload layout of §4.8.
#[derive(Clone, Debug)]
pub struct Request {
    /// The requested operation.
    pub op: Op,
    /// The target sub-ORAM.
    pub shard: ShardIndex,
    /// The path's leaf label.
    pub leaf: LeafLabel,
    /// Present only for `write_path`: the `L+1` new bucket ciphertexts, root
    /// first.
    pub buckets: Vec<Vec<u8>>,
}

impl Request {
    /// Builds a `read_path` request.
    pub fn read_path(shard: ShardIndex, leaf: LeafLabel) -> Self {
        Self {
            op: Op::ReadPath,
            shard,
            leaf,
            buckets: Vec::new(),
        }
    }

    /// Builds a `write_path` request.
    pub fn write_path(shard: ShardIndex, leaf: LeafLabel, buckets: Vec<Vec<u8>>) -> Self {
        Self {
            op: Op::WritePath,
            shard,
            leaf,
            buckets,
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.op as u8);
        out.extend_from_slice(&self.shard.to_be_bytes());
        out.extend_from_slice(&(self.leaf as u32).to_be_bytes());
        out.extend_from_slice(&(self.buckets.len() as u16).to_be_bytes());
        for bucket in &self.buckets {
            out.extend_from_slice(&(bucket.len() as u32).to_be_bytes());
            out.extend_from_slice(bucket);
        }
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, OramError> {
        if bytes.len() < 9 {
            return Err(OramError::Protocol("request shorter than header".into()));
        }
        let op = Op::from_byte(bytes[0])?;
        let shard = ShardIndex::from_be_bytes(bytes[1..3].try_into().unwrap());
        let leaf = u32::from_be_bytes(bytes[3..7].try_into().unwrap()) as LeafLabel;
        let bucket_count = u16::from_be_bytes(bytes[7..9].try_into().unwrap()) as usize;
        let mut cursor = 9usize;
        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            if bytes.len() < cursor + 4 {
                return Err(OramError::Protocol("truncated bucket length".into()));
            }
            let len = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
            cursor += 4;
            if bytes.len() < cursor + len {
                return Err(OramError::Protocol("truncated bucket payload".into()));
            }
            buckets.push(bytes[cursor..cursor + len].to_vec());
            cursor += len;
        }
        Ok(Self {
            op,
            shard,
            leaf,
            buckets,
        })
    }
}

/// A decoded response: the path's bucket ciphertexts (read), or a plain
/// acknowledgement (write).
#[derive(Clone, Debug)]
pub enum Response {
    /// The `L+1` bucket ciphertexts on the requested path, root first.
    Path(Vec<Vec<u8>>),
    /// A `write_path` acknowledgement.
    Ack,
}

impl Response {
    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            Response::Ack => vec![0x00],
            Response::Path(buckets) => {
                let mut out = vec![0x01];
                out.extend_from_slice(&(buckets.len() as u16).to_be_bytes());
                for bucket in buckets {
                    out.extend_from_slice(&(bucket.len() as u32).to_be_bytes());
                    out.extend_from_slice(bucket);
                }
                out
            }
        }
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, OramError> {
        match bytes.first() {
            Some(0x00) => Ok(Response::Ack),
            Some(0x01) => {
                if bytes.len() < 3 {
                    return Err(OramError::Protocol("truncated path response header".into()));
                }
                let bucket_count = u16::from_be_bytes(bytes[1..3].try_into().unwrap()) as usize;
                let mut cursor = 3usize;
                let mut buckets = Vec::with_capacity(bucket_count);
                for _ in 0..bucket_count {
                    if bytes.len() < cursor + 4 {
                        return Err(OramError::Protocol("truncated bucket length".into()));
                    }
                    let len = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
                    cursor += 4;
                    if bytes.len() < cursor + len {
                        return Err(OramError::Protocol("truncated bucket payload".into()));
                    }
                    buckets.push(bytes[cursor..cursor + len].to_vec());
                    cursor += len;
                }
                Ok(Response::Path(buckets))
            }
            Some(other) => Err(OramError::Protocol(format!("unrecognized response tag {other:#x}"))),
            None => Err(OramError::Protocol("empty response".into())),
        }
    }
}

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), OramError> {
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, OramError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Writes the connection preamble: magic number followed by the version
/// byte.
pub fn write_preamble<W: Write>(writer: &mut W) -> Result<(), OramError> {
    writer.write_all(&MAGIC.to_be_bytes())?;
    writer.write_all(&[VERSION])?;
    Ok(())
}

/// Reads and validates the connection preamble.
pub fn read_preamble<R: Read>(reader: &mut R) -> Result<(), OramError> {
    let mut magic_bytes = [0u8; 4];
    reader.read_exact(&mut magic_bytes)?;
    if u32::from_be_bytes(magic_bytes) != MAGIC {
        return Err(OramError::Protocol("bad magic number".into()));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != VERSION {
        return Err(OramError::Protocol(format!("unsupported version {:#x}", version[0])));
    }
    Ok(())
}

/// What a `PathOram` needs from the network: fetch and replace one root-
/// to-leaf path of one shard.
pub trait PathTransport {
    /// Fetches the `height + 1` bucket ciphertexts on `P(leaf)`, root first.
    fn read_path(&mut self, shard: ShardIndex, leaf: LeafLabel) -> Result<Vec<Vec<u8>>, OramError>;

    /// Replaces every bucket on `P(leaf)` with `buckets` (root first).
    fn write_path(
        &mut self,
        shard: ShardIndex,
        leaf: LeafLabel,
        buckets: Vec<Vec<u8>>,
    ) -> Result<(), OramError>;
}

/// A [`PathTransport`] backed by a TCP connection to a remote
/// [`crate::server::Server`].
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connects to `addr` and exchanges the connection preamble.
    pub fn connect(addr: &str) -> Result<Self, OramError> {
        let mut stream = TcpStream::connect(addr)?;
        write_preamble(&mut stream)?;
        Ok(Self { stream })
    }

    fn roundtrip(&mut self, request: Request) -> Result<Response, OramError> {
        write_frame(&mut self.stream, &request.encode())?;
        let payload = read_frame(&mut self.stream)?;
        Response::decode(&payload)
    }
}

impl PathTransport for TcpTransport {
    fn read_path(&mut self, shard: ShardIndex, leaf: LeafLabel) -> Result<Vec<Vec<u8>>, OramError> {
        match self.roundtrip(Request::read_path(shard, leaf))? {
            Response::Path(buckets) => Ok(buckets),
            Response::Ack => Err(OramError::Protocol("server acked a read_path request".into())),
        }
    }

    fn write_path(
        &mut self,
        shard: ShardIndex,
        leaf: LeafLabel,
        buckets: Vec<Vec<u8>>,
    ) -> Result<(), OramError> {
        match self.roundtrip(Request::write_path(shard, leaf, buckets))? {
            Response::Ack => Ok(()),
            Response::Path(_) => Err(OramError::Protocol("server returned a path for a write_path request".into())),
        }
    }
}

/// A [`PathTransport`] that calls an in-process [`crate::server::Server`]
/// directly, skipping the wire encoding entirely. Used by same-process
/// deployments and by tests.
pub struct LocalTransport {
    server: Arc<crate::server::Server>,
}

impl LocalTransport {
    /// Wraps a shared, in-process server.
    pub fn new(server: Arc<crate::server::Server>) -> Self {
        Self { server }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn request_round_trips_read_path() {
        let request = Request::read_path(3, 9);
        let bytes = request.encode();
        let back = Request::decode(&bytes).unwrap();
        assert_eq!(back.op, Op::ReadPath);
        assert_eq!(back.shard, 3);
        assert_eq!(back.leaf, 9);
        assert!(back.buckets.is_empty());
    }

    #[test]
    fn request_round_trips_write_path() {
        let request = Request::write_path(1, 12, vec![vec![1, 2, 3], vec![4, 5]]);
        let bytes = request.encode();
        let back = Request::decode(&bytes).unwrap();
        assert_eq!(back.op, Op::WritePath);
        assert_eq!(back.buckets, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[test]
    fn response_round_trips_path_and_ack() {
        let response = Response::Path(vec![vec![9, 9], vec![]]);
        let bytes = response.encode();
        match Response::decode(&bytes).unwrap() {
            Response::Path(buckets) => assert_eq!(buckets, vec![vec![9, 9], vec![]]),
            Response::Ack => panic!("expected Path"),
        }
        let ack_bytes = Response::Ack.encode();
        assert!(matches!(Response::decode(&ack_bytes).unwrap(), Response::Ack));
    }

    #[test]
    fn frame_round_trips_through_a_cursor() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn preamble_round_trips_and_rejects_bad_magic() {
        let mut buf = Vec::new();
        write_preamble(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(read_preamble(&mut cursor).is_ok());

        let mut bad = Cursor::new(vec![0u8; 5]);
        assert!(read_preamble(&mut bad).is_err());
    }
}

impl PathTransport for LocalTransport {
    fn read_path(&mut self, shard: ShardIndex, leaf: LeafLabel) -> Result<Vec<Vec<u8>>, OramError> {
        self.server.read_path(shard, leaf)
    }

    fn write_path(
        &mut self,
        shard: ShardIndex,
        leaf: LeafLabel,
        buckets: Vec<Vec<u8>>,
    ) -> Result<(), OramError> {
        self.server.write_path(shard, leaf, buckets)
    }
}
