//! Byte cursors over length-framed protocol packets.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    error::{protocol, ProtocolError},
    ext::{BufMutExt, FmtExt},
    oid::Oid,
};

/// Read cursor over a received message body.
///
/// All integer reads are network byte order.
pub(crate) struct ReadBuf {
    bytes: Bytes,
}

impl ReadBuf {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    fn check(&self, n: usize) -> Result<(), ProtocolError> {
        if self.bytes.remaining() < n {
            return Err(protocol!("unexpected end of message, want {n} more bytes"));
        }
        Ok(())
    }

    pub fn byte(&mut self) -> Result<u8, ProtocolError> {
        self.check(1)?;
        Ok(self.bytes.get_u8())
    }

    pub fn int16(&mut self) -> Result<i16, ProtocolError> {
        self.check(2)?;
        Ok(self.bytes.get_i16())
    }

    pub fn int32(&mut self) -> Result<i32, ProtocolError> {
        self.check(4)?;
        Ok(self.bytes.get_i32())
    }

    pub fn oid(&mut self) -> Result<Oid, ProtocolError> {
        self.check(4)?;
        Ok(self.bytes.get_u32())
    }

    /// Read a nul terminated UTF-8 string.
    pub fn string(&mut self) -> Result<String, ProtocolError> {
        let Some(end) = self.bytes.iter().position(|e| matches!(e, b'\0')) else {
            return Err(protocol!("no nul termination in message"));
        };
        let string = self.bytes.split_to(end);
        self.bytes.advance(1);
        String::from_utf8(string.into())
            .map_err(|err| protocol!("non UTF-8 string in message: {err}"))
    }

    /// Read the next `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.check(n)?;
        Ok(self.bytes.split_to(n))
    }

    pub fn remaining(&self) -> usize {
        self.bytes.remaining()
    }
}

impl std::fmt::Debug for ReadBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.bytes.lossy().fmt(f)
    }
}

/// Write buffer for one outgoing message.
///
/// The frame starts with the type byte and a placeholder for the length;
/// [`finish`][WriteBuf::finish] patches the length in, which excludes the
/// type byte but includes the length field itself. A zero type byte marks a
/// startup or SSL-request packet, which goes on the wire without a tag.
pub(crate) struct WriteBuf {
    buf: BytesMut,
}

impl WriteBuf {
    pub fn new(tag: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(tag);
        buf.put_u32(0);
        Self { buf }
    }

    /// An untagged startup/SSL-request packet.
    pub fn startup() -> Self {
        Self::new(0)
    }

    pub fn byte(&mut self, b: u8) {
        self.buf.put_u8(b);
    }

    pub fn int16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn int32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn string(&mut self, s: &str) {
        self.buf.put_nul_string(s);
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.put_slice(b);
    }

    /// Patch the length field and return the wire frame.
    pub fn finish(mut self) -> Bytes {
        let len = (self.buf.len() - 1) as u32;
        self.buf[1..5].copy_from_slice(&len.to_be_bytes());

        let frame = self.buf.freeze();
        match frame[0] {
            0 => frame.slice(1..),
            _ => frame,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_frame() {
        let mut w = WriteBuf::new(b'Q');
        w.string("SELECT 1");
        let frame = w.finish();
        assert_eq!(&frame[..], b"Q\x00\x00\x00\x0dSELECT 1\x00");
    }

    #[test]
    fn startup_frame_elides_tag() {
        let mut w = WriteBuf::startup();
        w.int32(80877103);
        let frame = w.finish();
        assert_eq!(&frame[..], b"\x00\x00\x00\x08\x04\xd2\x16\x2f");
    }

    #[test]
    fn read_primitives() {
        let mut r = ReadBuf::new(Bytes::from_static(b"\x00\x03\x00\x00\x00\x19abc\x00xy"));
        assert_eq!(r.int16().unwrap(), 3);
        assert_eq!(r.int32().unwrap(), 25);
        assert_eq!(r.string().unwrap(), "abc");
        assert_eq!(&r.take(2).unwrap()[..], b"xy");
        assert_eq!(r.remaining(), 0);
        assert!(r.byte().is_err());
    }

    #[test]
    fn missing_nul() {
        let mut r = ReadBuf::new(Bytes::from_static(b"abc"));
        assert!(r.string().is_err());
    }
}
