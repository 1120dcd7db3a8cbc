//! The wire codec: little-endian length-prefixed framing for requests and responses.
//!
//! Every message on the wire is `<u32 length><length bytes of payload>`. A
//! request payload is `<u32 nstr><arg>...` where each arg is
//! `<u32 arglen><arglen bytes>`. A response payload is `<u32 status><value>`.

use byteorder::{ByteOrder, LittleEndian};
use kvcore::error::ErrorKind;
use kvcore::NetError;

/// Upper bound on any single frame's payload, in bytes (32 MiB).
pub const MAX_FRAME: u32 = 32 << 20;

/// Upper bound on the number of argument strings in a request.
pub const MAX_ARGS: u32 = 200_000;

const LEN_PREFIX_SIZE: usize = 4;

/// Response status discriminator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    Err = 1,
    No = 2,
}

impl Status {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A fully-parsed request: the ordered argument strings, first of which is the verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub args: Vec<Vec<u8>>,
}

impl Request {
    #[inline]
    pub fn verb(&self) -> &[u8] {
        // A successfully parsed request always has at least a verb check performed
        // by the caller before dispatch; an empty arg list is handled there, not here.
        self.args.first().map(Vec::as_slice).unwrap_or(b"")
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Peeks at the 4-byte length prefix at the head of `buf`.
///
/// Returns `Ok(None)` if fewer than 4 bytes are buffered yet (caller should wait
/// for more data), `Ok(Some(len))` with the payload length otherwise, or an
/// error if the declared length exceeds `MAX_FRAME`.
pub fn peek_frame_len(buf: &[u8]) -> Result<Option<u32>, NetError> {
    if buf.len() < LEN_PREFIX_SIZE {
        return Ok(None);
    }
    let len = LittleEndian::read_u32(&buf[..LEN_PREFIX_SIZE]);
    if len > MAX_FRAME {
        return Err(NetError::Fatal(ErrorKind::FrameTooLarge));
    }
    Ok(Some(len))
}

/// Parses a request out of a complete frame payload (the bytes after the
/// length prefix, not including it).
///
/// Requires that every declared argument fits within `payload` and that no
/// bytes remain after the last argument.
pub fn parse_request(payload: &[u8]) -> Result<Request, NetError> {
    if payload.len() < LEN_PREFIX_SIZE {
        return Err(NetError::Fatal(ErrorKind::MalformedRequest));
    }
    let nstr = LittleEndian::read_u32(&payload[..LEN_PREFIX_SIZE]);
    if nstr > MAX_ARGS {
        return Err(NetError::Fatal(ErrorKind::MalformedRequest));
    }

    let mut pos = LEN_PREFIX_SIZE;
    let mut args = Vec::with_capacity(nstr as usize);
    for _ in 0..nstr {
        if payload.len() < pos + LEN_PREFIX_SIZE {
            return Err(NetError::Fatal(ErrorKind::MalformedRequest));
        }
        let arglen = LittleEndian::read_u32(&payload[pos..pos + LEN_PREFIX_SIZE]) as usize;
        pos += LEN_PREFIX_SIZE;

        if payload.len() < pos + arglen {
            return Err(NetError::Fatal(ErrorKind::MalformedRequest));
        }
        args.push(payload[pos..pos + arglen].to_vec());
        pos += arglen;
    }

    if pos != payload.len() {
        return Err(NetError::Fatal(ErrorKind::TrailingBytes));
    }

    Ok(Request { args })
}

/// Appends a fully framed response (outer length prefix, status, payload) to `out`.
pub fn encode_response(out: &mut Vec<u8>, status: Status, payload: &[u8]) {
    let body_len = LEN_PREFIX_SIZE + payload.len();
    let mut header = [0u8; LEN_PREFIX_SIZE];
    LittleEndian::write_u32(&mut header, body_len as u32);
    out.extend_from_slice(&header);

    let mut status_bytes = [0u8; LEN_PREFIX_SIZE];
    LittleEndian::write_u32(&mut status_bytes, status.as_u32());
    out.extend_from_slice(&status_bytes);

    out.extend_from_slice(payload);
}

/// Encodes a request the same way a client would; used by tests and by
/// anything driving the server as a protocol peer.
pub fn encode_request(out: &mut Vec<u8>, args: &[&[u8]]) {
    let mut payload = Vec::new();
    let mut nstr_bytes = [0u8; LEN_PREFIX_SIZE];
    LittleEndian::write_u32(&mut nstr_bytes, args.len() as u32);
    payload.extend_from_slice(&nstr_bytes);

    for arg in args {
        let mut len_bytes = [0u8; LEN_PREFIX_SIZE];
        LittleEndian::write_u32(&mut len_bytes, arg.len() as u32);
        payload.extend_from_slice(&len_bytes);
        payload.extend_from_slice(arg);
    }

    let mut header = [0u8; LEN_PREFIX_SIZE];
    LittleEndian::write_u32(&mut header, payload.len() as u32);
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_request() {
        let mut bytes = Vec::new();
        encode_request(&mut bytes, &[b"set", b"k", b"v"]);

        let len = peek_frame_len(&bytes).unwrap().unwrap() as usize;
        let payload = &bytes[LEN_PREFIX_SIZE..LEN_PREFIX_SIZE + len];
        let req = parse_request(payload).unwrap();

        assert_eq!(req.args, vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()]);
    }

    #[test]
    fn rejects_oversize_frame() {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, MAX_FRAME + 1);
        assert_eq!(
            peek_frame_len(&bytes),
            Err(NetError::Fatal(ErrorKind::FrameTooLarge))
        );
    }

    #[test]
    fn incomplete_prefix_waits_for_more() {
        assert_eq!(peek_frame_len(&[1, 2]), Ok(None));
    }

    #[test]
    fn rejects_too_many_args() {
        let mut payload = Vec::new();
        let mut nstr_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut nstr_bytes, MAX_ARGS + 1);
        payload.extend_from_slice(&nstr_bytes);
        assert_eq!(
            parse_request(&payload),
            Err(NetError::Fatal(ErrorKind::MalformedRequest))
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = Vec::new();
        encode_request(&mut bytes, &[b"ping"]);
        let mut payload = bytes[LEN_PREFIX_SIZE..].to_vec();
        payload.push(0xff);
        assert_eq!(
            parse_request(&payload),
            Err(NetError::Fatal(ErrorKind::TrailingBytes))
        );
    }

    #[test]
    fn rejects_argument_overrunning_frame() {
        let mut payload = Vec::new();
        let mut nstr_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut nstr_bytes, 1);
        payload.extend_from_slice(&nstr_bytes);
        let mut arglen_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut arglen_bytes, 10);
        payload.extend_from_slice(&arglen_bytes);
        payload.extend_from_slice(b"ab"); // only 2 bytes, claimed 10

        assert_eq!(
            parse_request(&payload),
            Err(NetError::Fatal(ErrorKind::MalformedRequest))
        );
    }

    #[test]
    fn encodes_response_frame_exactly() {
        let mut out = Vec::new();
        encode_response(&mut out, Status::Ok, b"v");
        // length(5) + status(0) + "v"
        assert_eq!(
            out,
            vec![5, 0, 0, 0, 0, 0, 0, 0, b'v']
        );
    }

    #[test]
    fn empty_get_response_matches_spec_example() {
        let mut out = Vec::new();
        encode_response(&mut out, Status::No, b"");
        assert_eq!(out, vec![4, 0, 0, 0, 2, 0, 0, 0]);
    }
}
