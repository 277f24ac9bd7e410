//! A non-owning scan over a TLS 1.3 ClientHello handshake body, recording
//! the byte range of each top-level field and extension rather than
//! copying them out — the builder, encryptor, and decryptor all need to
//! slice the *original* bytes (for AAD construction and extension
//! splicing), so re-serializing from a fully-parsed struct would risk
//! producing bytes that no longer match what was actually received.
//!
//! Input here is the handshake body only: `msg_type(1) ‖ length(3)` is
//! already stripped by the caller (the record layer, out of scope).

use byteorder::{BigEndian, ReadBytesExt};
use std::convert::TryFrom;
use std::io::{self, Cursor, Seek, SeekFrom};

/// One extension's location within a ClientHello buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionSpan {
    /// The extension's type.
    pub ext_type: u16,
    /// Offset of this extension's `type(2) ‖ length(2)` header.
    pub entry_start: usize,
    /// Length of the whole entry, header included.
    pub entry_len: usize,
    /// Offset of the extension's opaque body (`entry_start + 4`).
    pub body_start: usize,
    /// Length of the opaque body.
    pub body_len: usize,
}

/// A parsed-in-place view over one ClientHello handshake body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloView {
    /// `legacy_version`, always `0x0303` for a TLS 1.3 ClientHello.
    pub legacy_version: u16,
    /// Offset of the 32-byte `random` field.
    pub random_start: usize,
    /// Offset of the 1-byte session-id length prefix.
    pub session_id_len_start: usize,
    /// Offset of the session-id bytes themselves.
    pub session_id_start: usize,
    /// Length of the session id.
    pub session_id_len: usize,
    /// Offset of the 2-byte extensions-list length prefix.
    pub extensions_len_start: usize,
    /// Offset of the first extension entry.
    pub extensions_start: usize,
    /// Total length of the extensions list body.
    pub extensions_len: usize,
    /// Every extension found, in wire order.
    pub extensions: Vec<ExtensionSpan>,
}

impl ClientHelloView {
    /// Scans `bytes` (a full ClientHello handshake body) without copying.
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let legacy_version = cursor.read_u16::<BigEndian>()?;

        let random_start = pos(&cursor)?;
        cursor.seek(SeekFrom::Current(32))?;

        let session_id_len_start = pos(&cursor)?;
        let session_id_len = usize::from(cursor.read_u8()?);
        let session_id_start = pos(&cursor)?;
        cursor.seek(SeekFrom::Current(i64::try_from(session_id_len).map_err(invalid)?))?;

        let cipher_suites_len = usize::from(cursor.read_u16::<BigEndian>()?);
        cursor.seek(SeekFrom::Current(i64::try_from(cipher_suites_len).map_err(invalid)?))?;

        let compression_len = usize::from(cursor.read_u8()?);
        cursor.seek(SeekFrom::Current(i64::try_from(compression_len).map_err(invalid)?))?;

        let extensions_len_start = pos(&cursor)?;
        let extensions_len = usize::from(cursor.read_u16::<BigEndian>()?);
        let extensions_start = pos(&cursor)?;

        let mut extensions = Vec::new();
        let end = extensions_start + extensions_len;
        if end > bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "extensions length prefix overruns the ClientHello buffer",
            ));
        }
        while pos(&cursor)? < end {
            let entry_start = pos(&cursor)?;
            let ext_type = cursor.read_u16::<BigEndian>()?;
            let body_len = usize::from(cursor.read_u16::<BigEndian>()?);
            let body_start = pos(&cursor)?;
            cursor.seek(SeekFrom::Current(i64::try_from(body_len).map_err(invalid)?))?;
            extensions.push(ExtensionSpan {
                ext_type,
                entry_start,
                entry_len: 4 + body_len,
                body_start,
                body_len,
            });
        }

        Ok(Self {
            legacy_version,
            random_start,
            session_id_len_start,
            session_id_start,
            session_id_len,
            extensions_len_start,
            extensions_start,
            extensions_len,
            extensions,
        })
    }

    /// Finds the first extension of the given type, if present.
    pub fn find(&self, ext_type: u16) -> Option<&ExtensionSpan> {
        self.extensions.iter().find(|e| e.ext_type == ext_type)
    }
}

fn pos(cursor: &Cursor<&[u8]>) -> io::Result<usize> {
    usize::try_from(cursor.position()).map_err(invalid)
}

fn invalid<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Reads the 32-byte random field out of a ClientHello buffer, given its
/// view.
pub fn random<'a>(bytes: &'a [u8], view: &ClientHelloView) -> &'a [u8] {
    &bytes[view.random_start..view.random_start + 32]
}

/// Builds a full ClientHello handshake body from its pieces: everything up
/// through `compression_methods` verbatim, then a freshly length-prefixed
/// extensions list built from `extension_bytes` (each already-encoded
/// `type ‖ length ‖ value`, concatenated).
pub fn rebuild(prefix_through_compressions: &[u8], extension_bytes: &[u8]) -> io::Result<Vec<u8>> {
    use byteorder::WriteBytesExt;
    let mut out = Vec::with_capacity(prefix_through_compressions.len() + 2 + extension_bytes.len());
    out.extend_from_slice(prefix_through_compressions);
    out.write_u16::<BigEndian>(u16::try_from(extension_bytes.len()).map_err(invalid)?)?;
    out.extend_from_slice(extension_bytes);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use byteorder::WriteBytesExt;

    fn sample_client_hello() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(0x0303).unwrap(); // legacy_version
        buf.extend_from_slice(&[0x11; 32]); // random
        buf.push(0); // session_id len = 0
        buf.write_u16::<BigEndian>(2).unwrap(); // cipher suites len
        buf.extend_from_slice(&[0x13, 0x01]);
        buf.push(1); // compression methods len
        buf.push(0);

        let mut extensions = Vec::new();
        // server_name extension, type 0, empty body
        extensions.write_u16::<BigEndian>(0).unwrap();
        extensions.write_u16::<BigEndian>(0).unwrap();
        // ech extension, type 0xfe0d, 3-byte body
        extensions.write_u16::<BigEndian>(0xfe0d).unwrap();
        extensions.write_u16::<BigEndian>(3).unwrap();
        extensions.extend_from_slice(&[0xaa, 0xbb, 0xcc]);

        buf.write_u16::<BigEndian>(u16::try_from(extensions.len()).unwrap()).unwrap();
        buf.extend_from_slice(&extensions);
        buf
    }

    #[test]
    fn parses_extensions() {
        let buf = sample_client_hello();
        let view = ClientHelloView::parse(&buf).unwrap();
        assert_eq!(view.legacy_version, 0x0303);
        assert_eq!(view.session_id_len, 0);
        assert_eq!(view.extensions.len(), 2);

        let ech = view.find(0xfe0d).unwrap();
        assert_eq!(&buf[ech.body_start..ech.body_start + ech.body_len], &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn rejects_truncated_extension() {
        let mut buf = sample_client_hello();
        let new_len = buf.len() - 10;
        buf.truncate(new_len);
        assert!(ClientHelloView::parse(&buf).is_err());
    }
}
