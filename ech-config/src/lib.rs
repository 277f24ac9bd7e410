//! Parsing, serializing, and carrying `ECHConfig`/`ECHConfigs` wire
//! structures — the server-published parameters that a client needs in
//! order to build and encrypt an inner ClientHello.
//!
//! This mirrors the shape of a DNS record-parsing crate (read a
//! length-prefixed sequence of typed records off a [`Cursor`], recording
//! the exact byte range each one came from) because `ECHConfigs` are
//! carried as DNS SvcParam values and parsed the same way: version tag,
//! stated length, `with_truncated` bounds the inner reader, unknown
//! versions are skipped rather than aborting the whole list.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::fmt;
use std::io::{self, Cursor, Read};

#[macro_use]
mod macros;
mod cursor_ext;
pub mod encoding;
pub mod svcb;

use cursor_ext::{CursorExt, Opaque, ReadFromCursor};

/// draft-ietf-tls-esni-09's field ordering.
pub const VERSION_DRAFT09: u16 = 0x0009;

/// draft-ietf-tls-esni-10's field ordering (the one seen in the wild, e.g.
/// from `crypto.cloudflare.com`).
pub const VERSION_DRAFT10: u16 = 0x000A;

/// An HPKE KEM/KDF/AEAD cipher suite offered by one `ECHConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    /// The HPKE KDF identifier (RFC 9180 §7.2).
    pub kdf_id: u16,
    /// The HPKE AEAD identifier (RFC 9180 §7.3).
    pub aead_id: u16,
}

impl ReadFromCursor for CipherSuite {
    fn read_from(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Self {
            kdf_id: cursor.read_u16::<BigEndian>()?,
            aead_id: cursor.read_u16::<BigEndian>()?,
        })
    }
}

impl CipherSuite {
    fn write_to(self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u16::<BigEndian>(self.kdf_id)?;
        out.write_u16::<BigEndian>(self.aead_id)?;
        Ok(())
    }
}

/// The public name a front-end admits under — the default outer SNI.
///
/// Per the data model, its *decoded string* length must be strictly
/// greater than 1 and at most 255 (`1 < len <= 255`).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicName(pub Vec<u8>);

impl fmt::Debug for PublicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.0).fmt(f)
    }
}

impl fmt::Display for PublicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.0).fmt(f)
    }
}

impl std::str::FromStr for PublicName {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if (2..=255).contains(&s.len()) {
            Ok(Self(s.as_bytes().to_vec()))
        } else {
            Err("public name length must be in 1 < len <= 255")
        }
    }
}

impl ReadFromCursor for PublicName {
    fn read_from(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let len = cursor.read_u16::<BigEndian>()?;
        if !(2..=255).contains(&len) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("public_name length {} not in 1 < len <= 255", len),
            ));
        }
        let mut vec = vec![0u8; usize::from(len)];
        cursor.read_exact(&mut vec)?;
        Ok(Self(vec))
    }
}

impl PublicName {
    fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u16::<BigEndian>(u16::try_from(self.0.len()).map_err(invalid)?)?;
        out.extend_from_slice(&self.0);
        Ok(())
    }
}

/// An unrecognised extension found inside an `ECHConfig`'s extensions list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigExtension {
    /// The extension's type number.
    pub ext_type: u16,
    /// The extension's opaque value.
    pub value: Vec<u8>,
}

impl ConfigExtension {
    /// Whether a client that doesn't recognise this extension type must
    /// reject the whole config (the high bit of the type marks it
    /// mandatory-to-implement, mirroring TLS 1.3 extension conventions).
    pub fn is_mandatory(&self) -> bool {
        self.ext_type & 0x8000 != 0
    }

    fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u16::<BigEndian>(self.ext_type)?;
        out.write_u16::<BigEndian>(u16::try_from(self.value.len()).map_err(invalid)?)?;
        out.extend_from_slice(&self.value);
        Ok(())
    }
}

impl ReadFromCursor for ConfigExtension {
    fn read_from(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let ext_type = cursor.read_u16::<BigEndian>()?;
        let len = cursor.read_u16::<BigEndian>()?;
        if len >= 1500 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "ECHConfig extension longer than 1500 bytes",
            ));
        }
        let mut value = vec![0u8; usize::from(len)];
        cursor.read_exact(&mut value)?;
        Ok(Self { ext_type, value })
    }
}

/// The fields common to both accepted `ECHConfig` versions, once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ECHConfigContents {
    /// The server-chosen short identifier used to pick this key on receipt.
    pub config_id: u8,
    /// The HPKE KEM identifier (RFC 9180 §7.1).
    pub kem_id: u16,
    /// The HPKE receiver public key.
    pub public_key: Vec<u8>,
    /// The `(kdf_id, aead_id)` suites this config supports.
    pub cipher_suites: Vec<CipherSuite>,
    /// A hint for how much the client should pad the inner SNI to.
    pub maximum_name_length: u16,
    /// The front-end's public DNS name.
    pub public_name: PublicName,
    /// Any extensions the parser didn't recognise, preserved verbatim.
    pub extensions: Vec<ConfigExtension>,
}

/// The decoded contents of one `ECHConfig`, keyed by whether its version
/// was one of the two this crate understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ECHConfigBody {
    /// `version` was [`VERSION_DRAFT09`] or [`VERSION_DRAFT10`].
    Known(ECHConfigContents),
    /// An unrecognised version; its body is carried opaquely so the
    /// surrounding list can still be parsed.
    Unknown(Vec<u8>),
}

/// One offered ECH configuration, plus the exact byte range it was parsed
/// from within its containing `ECHConfigs` buffer (`encoding_start` /
/// `encoding_length`) — HPKE's `info` parameter requires these bytes
/// verbatim, so we never re-derive them from the typed fields once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ECHConfig {
    /// The raw version tag.
    pub version: u16,
    /// The decoded body.
    pub contents: ECHConfigBody,
    /// Byte offset of this config (including its `version`/`length`
    /// header) within the `ECHConfigs` buffer it was parsed from.
    pub encoding_start: usize,
    /// Length in bytes of this config's exact encoding, header included.
    pub encoding_length: usize,
}

impl ECHConfig {
    /// Whether this config has an unrecognised extension whose high bit
    /// marks it mandatory-to-implement — such a config must be ignored by
    /// a client per the data model.
    pub fn has_unsupported_mandatory_extension(&self) -> bool {
        match &self.contents {
            ECHConfigBody::Known(c) => c.extensions.iter().any(ConfigExtension::is_mandatory),
            ECHConfigBody::Unknown(_) => false,
        }
    }

    fn read_from(cursor: &mut Cursor<&[u8]>, base_offset: usize) -> io::Result<Self> {
        let start = base_offset + usize::try_from(cursor.position()).map_err(invalid)?;
        let version = cursor.read_u16::<BigEndian>()?;
        let length = cursor.read_u16::<BigEndian>()?;

        let contents = cursor.with_truncated(u64::from(length), |cursor, _len_hint| {
            match version {
                VERSION_DRAFT10 => read_draft10(cursor).map(ECHConfigBody::Known),
                VERSION_DRAFT09 => read_draft09(cursor).map(ECHConfigBody::Known),
                _ => {
                    let mut buf = vec![0u8; usize::from(length)];
                    cursor.read_exact(&mut buf)?;
                    Ok(ECHConfigBody::Unknown(buf))
                }
            }
        })?;

        let end = base_offset + usize::try_from(cursor.position()).map_err(invalid)?;
        Ok(Self {
            version,
            contents,
            encoding_start: start,
            encoding_length: end - start,
        })
    }

    /// Serializes this config's typed fields back into its wire encoding.
    /// For a config that was parsed off the wire, prefer slicing the
    /// original buffer with [`Self::encoding_start`]/[`Self::encoding_length`]
    /// — HPKE's `info` input must be the bytes exactly as received, and
    /// re-serialization is only guaranteed byte-identical for the known
    /// versions.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        match &self.contents {
            ECHConfigBody::Known(c) if self.version == VERSION_DRAFT10 => write_draft10(c, &mut body)?,
            ECHConfigBody::Known(c) if self.version == VERSION_DRAFT09 => write_draft09(c, &mut body)?,
            ECHConfigBody::Known(_) => {
                return Err(io::Error::new(io::ErrorKind::Other, "unreachable version/body mismatch"))
            }
            ECHConfigBody::Unknown(buf) => body.extend_from_slice(buf),
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        out.write_u16::<BigEndian>(self.version)?;
        out.write_u16::<BigEndian>(u16::try_from(body.len()).map_err(invalid)?)?;
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn read_draft10(cursor: &mut Cursor<&[u8]>) -> io::Result<ECHConfigContents> {
    let config_id = cursor.read_u8()?;
    let kem_id = cursor.read_u16::<BigEndian>()?;
    let public_key = Opaque::<0, { u16::MAX }>::read_from(cursor)?.0;
    let cipher_suites = read_cipher_suites(cursor)?;
    let maximum_name_length = cursor.read_u16::<BigEndian>()?;
    let public_name = PublicName::read_from(cursor)?;
    let extensions = read_extensions(cursor)?;
    Ok(ECHConfigContents {
        config_id,
        kem_id,
        public_key,
        cipher_suites,
        maximum_name_length,
        public_name,
        extensions,
    })
}

fn write_draft10(c: &ECHConfigContents, out: &mut Vec<u8>) -> io::Result<()> {
    out.write_u8(c.config_id)?;
    out.write_u16::<BigEndian>(c.kem_id)?;
    write_opaque16(out, &c.public_key)?;
    write_cipher_suites(&c.cipher_suites, out)?;
    out.write_u16::<BigEndian>(c.maximum_name_length)?;
    c.public_name.write_to(out)?;
    write_extensions(&c.extensions, out)?;
    Ok(())
}

fn read_draft09(cursor: &mut Cursor<&[u8]>) -> io::Result<ECHConfigContents> {
    let public_name = PublicName::read_from(cursor)?;
    let public_key = Opaque::<0, { u16::MAX }>::read_from(cursor)?.0;
    let kem_id = cursor.read_u16::<BigEndian>()?;
    let cipher_suites = read_cipher_suites(cursor)?;
    let maximum_name_length = cursor.read_u16::<BigEndian>()?;
    let extensions = read_extensions(cursor)?;
    // draft-09 has no top-level config_id field of its own in this data
    // model; callers that need key selection use draft-10 configs, so we
    // default it to zero here rather than invent wire bytes that aren't
    // actually present.
    Ok(ECHConfigContents {
        config_id: 0,
        kem_id,
        public_key,
        cipher_suites,
        maximum_name_length,
        public_name,
        extensions,
    })
}

fn write_draft09(c: &ECHConfigContents, out: &mut Vec<u8>) -> io::Result<()> {
    c.public_name.write_to(out)?;
    write_opaque16(out, &c.public_key)?;
    out.write_u16::<BigEndian>(c.kem_id)?;
    write_cipher_suites(&c.cipher_suites, out)?;
    out.write_u16::<BigEndian>(c.maximum_name_length)?;
    write_extensions(&c.extensions, out)?;
    Ok(())
}

fn read_cipher_suites(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<CipherSuite>> {
    let suite_octets = cursor.read_u16::<BigEndian>()?;
    // The source this is distilled from checks `suiteoctets % 1`, which is
    // always zero and therefore checks nothing; the actual invariant is
    // that each suite is 4 bytes.
    if suite_octets % 4 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "cipher suite octet count is not a multiple of 4",
        ));
    }
    let n = usize::from(suite_octets) / 4;
    let mut suites = Vec::with_capacity(n);
    for _ in 0..n {
        suites.push(CipherSuite::read_from(cursor)?);
    }
    Ok(suites)
}

fn write_cipher_suites(suites: &[CipherSuite], out: &mut Vec<u8>) -> io::Result<()> {
    let len = u16::try_from(suites.len() * 4).map_err(invalid)?;
    out.write_u16::<BigEndian>(len)?;
    for suite in suites {
        suite.write_to(out)?;
    }
    Ok(())
}

fn read_extensions(cursor: &mut Cursor<&[u8]>) -> io::Result<Vec<ConfigExtension>> {
    let len = cursor.read_u16::<BigEndian>()?;
    cursor.with_truncated(u64::from(len), |cursor, _| {
        let mut extensions = Vec::new();
        while !cursor.std_remaining_slice().is_empty() {
            extensions.push(ConfigExtension::read_from(cursor)?);
        }
        Ok(extensions)
    })
}

fn write_extensions(extensions: &[ConfigExtension], out: &mut Vec<u8>) -> io::Result<()> {
    let mut body = Vec::new();
    for ext in extensions {
        ext.write_to(&mut body)?;
    }
    out.write_u16::<BigEndian>(u16::try_from(body.len()).map_err(invalid)?)?;
    out.extend_from_slice(&body);
    Ok(())
}

fn write_opaque16(out: &mut Vec<u8>, value: &[u8]) -> io::Result<()> {
    out.write_u16::<BigEndian>(u16::try_from(value.len()).map_err(invalid)?)?;
    out.extend_from_slice(value);
    Ok(())
}

fn invalid<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// An ordered list of `ECHConfig`s, plus the buffer they were parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ECHConfigList {
    configs: Vec<ECHConfig>,
    buffer: Vec<u8>,
}

impl ECHConfigList {
    /// The decoded configs, in wire order.
    pub fn configs(&self) -> &[ECHConfig] {
        &self.configs
    }

    /// The exact bytes this config was parsed from — the slice that must
    /// be fed to HPKE as the `info` context prefix.
    pub fn exact_encoding(&self, config: &ECHConfig) -> &[u8] {
        &self.buffer[config.encoding_start..config.encoding_start + config.encoding_length]
    }

    /// Parses a catenation of `ECHConfigs` blobs (as may result from
    /// joining several DNS RR values with `;`) into a single combined list,
    /// and the count of unconsumed trailing bytes (`leftover`).
    pub fn parse(buffer: &[u8]) -> io::Result<(Self, usize)> {
        let mut cursor = Cursor::new(buffer);
        let configs_length = cursor.read_u16::<BigEndian>()?;

        let configs = cursor.with_truncated(u64::from(configs_length), |cursor, _| {
            let mut configs = Vec::new();
            while !cursor.std_remaining_slice().is_empty() {
                configs.push(ECHConfig::read_from(cursor, 2)?);
            }
            io::Result::Ok(configs)
        })?;

        let consumed = 2 + usize::from(configs_length);
        let leftover = buffer.len().saturating_sub(consumed);

        Ok((
            Self {
                configs,
                buffer: buffer[..consumed].to_vec(),
            },
            leftover,
        ))
    }

    /// Parses a base64-encoded `ECHConfigs` blob, erroring if there are any
    /// leftover bytes once decoded (unlike [`Self::parse`], which reports
    /// leftovers to the caller instead).
    pub fn from_base64(base: &str) -> io::Result<Self> {
        let buffer = base64::decode_config(base, base64::STANDARD).map_err(invalid)?;
        let (list, leftover) = Self::parse(&buffer)?;
        if leftover == 0 {
            Ok(list)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("base64 string had {} leftover bytes", leftover),
            ))
        }
    }

    /// Re-serializes every (known or unknown) config in this list back to
    /// its own `ECHConfigs` wire buffer.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        for config in &self.configs {
            body.extend(config.to_bytes()?);
        }
        let mut out = Vec::with_capacity(body.len() + 2);
        out.write_u16::<BigEndian>(u16::try_from(body.len()).map_err(invalid)?)?;
        out.extend_from_slice(&body);
        Ok(out)
    }
}

impl From<Vec<ECHConfig>> for ECHConfigList {
    fn from(configs: Vec<ECHConfig>) -> Self {
        // Constructed programmatically rather than parsed: `encoding_start`/
        // `encoding_length` must always index into *some* concrete buffer,
        // so we build one eagerly here from each config's serialization.
        let mut buffer = vec![0u8, 0u8];
        let mut configs_with_offsets = Vec::with_capacity(configs.len());
        for mut config in configs {
            let bytes = config.to_bytes().unwrap_or_default();
            config.encoding_start = buffer.len();
            config.encoding_length = bytes.len();
            buffer.extend(bytes);
            configs_with_offsets.push(config);
        }
        let body_len = u16::try_from(buffer.len() - 2).unwrap_or(u16::MAX);
        buffer[0..2].copy_from_slice(&body_len.to_be_bytes());
        Self { configs: configs_with_offsets, buffer }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn init_logs() {
        use std::sync::Once;
        static LOG_INIT: Once = Once::new();
        LOG_INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    #[test]
    fn cloudflare() {
        init_logs();
        // from crypto.cloudflare.com
        let public_key: Vec<u8> = vec![
            40, 38, 25, 12, 212, 168, 183, 42, 218, 32, 41, 154, 44, 61, 152, 136, 131, 114, 86,
            111, 194, 66, 154, 114, 231, 170, 205, 83, 72, 105, 105, 119,
        ];
        let buf = &[
            0, 72, // ECHConfigs: len = 72
            0, 10, // config version: 0x000a
            0, 68, // config len
            63, // config id
            0, 32, 0, 32, // kem_id, pub key len
            40, 38, 25, 12, 212, 168, 183, 42, 218, 32, 41, 154, 44, 61, 152, 136, 131, 114, 86,
            111, 194, 66, 154, 114, 231, 170, 205, 83, 72, 105, 105, 119, // public key
            0, 4, // cipher suites len
            0, 1, 0, 1, // cipher suites
            0, 0, // max name length
            0, 19, // public name len
            99, 108, 111, 117, 100, 102, 108, 97, 114, 101, 45, 101, 115, 110, 105, 46, 99, 111,
            109, // cloudflare-esni.com
            0, 0, // extensions len
        ];

        let (list, leftover) = ECHConfigList::parse(buf).unwrap();
        assert_eq!(leftover, 0);
        assert_eq!(list.configs().len(), 1);

        let config = &list.configs()[0];
        assert_eq!(config.version, VERSION_DRAFT10);
        match &config.contents {
            ECHConfigBody::Known(c) => {
                assert_eq!(c.config_id, 63);
                assert_eq!(c.kem_id, 0x0020);
                assert_eq!(c.public_key, public_key);
                assert_eq!(c.cipher_suites, vec![CipherSuite { kdf_id: 1, aead_id: 1 }]);
                assert_eq!(c.public_name.to_string(), "cloudflare-esni.com");
            }
            ECHConfigBody::Unknown(_) => panic!("expected a known config"),
        }

        assert_eq!(list.exact_encoding(config), &buf[..]);
    }

    #[test]
    fn unknown_version_is_skipped() {
        let mut buf = vec![0u8, 0u8]; // placeholder length
        buf.extend_from_slice(&0xFFFFu16.to_be_bytes()); // unknown version
        buf.extend_from_slice(&3u16.to_be_bytes()); // content length
        buf.extend_from_slice(&[1, 2, 3]); // opaque content

        let mut known = Vec::new();
        known.write_u16::<BigEndian>(VERSION_DRAFT10).unwrap();
        let mut contents = Vec::new();
        write_draft10(
            &ECHConfigContents {
                config_id: 1,
                kem_id: 0x20,
                public_key: vec![0; 32],
                cipher_suites: vec![CipherSuite { kdf_id: 1, aead_id: 1 }],
                maximum_name_length: 0,
                public_name: "example.com".parse().unwrap(),
                extensions: vec![],
            },
            &mut contents,
        )
        .unwrap();
        known.write_u16::<BigEndian>(u16::try_from(contents.len()).unwrap()).unwrap();
        known.extend(contents);

        buf.extend(known);
        let total_len = u16::try_from(buf.len() - 2).unwrap();
        buf[0..2].copy_from_slice(&total_len.to_be_bytes());

        let (list, leftover) = ECHConfigList::parse(&buf).unwrap();
        assert_eq!(leftover, 0);
        assert_eq!(list.configs().len(), 2);
        assert!(matches!(list.configs()[0].contents, ECHConfigBody::Unknown(_)));
        assert!(matches!(list.configs()[1].contents, ECHConfigBody::Known(_)));
    }

    #[test]
    fn round_trip_draft10() {
        let contents = ECHConfigContents {
            config_id: 0x42,
            kem_id: 0x20,
            public_key: vec![7; 32],
            cipher_suites: vec![CipherSuite { kdf_id: 1, aead_id: 1 }],
            maximum_name_length: 32,
            public_name: "example.com".parse().unwrap(),
            extensions: vec![ConfigExtension { ext_type: 0x10, value: vec![9, 9] }],
        };
        let config = ECHConfig {
            version: VERSION_DRAFT10,
            contents: ECHConfigBody::Known(contents),
            encoding_start: 0,
            encoding_length: 0,
        };
        let list: ECHConfigList = vec![config].into();
        let bytes = list.to_bytes().unwrap();
        let (reparsed, leftover) = ECHConfigList::parse(&bytes).unwrap();
        assert_eq!(leftover, 0);
        assert_eq!(reparsed.configs()[0].contents, list.configs()[0].contents);
    }

    #[test]
    fn rejects_cipher_suite_octets_not_multiple_of_four() {
        let mut buf = vec![0u8, 0u8];
        let mut content = vec![0x42u8, 0, 0x20, 0, 32];
        content.extend(vec![0u8; 32]); // public key
        content.extend(&6u16.to_be_bytes()); // suite octets = 6, not a multiple of 4
        content.extend(vec![0u8; 6]);
        content.extend(&0u16.to_be_bytes()); // max name length
        content.extend(&11u16.to_be_bytes());
        content.extend(b"example.com");
        content.extend(&0u16.to_be_bytes()); // extensions

        buf.extend(&VERSION_DRAFT10.to_be_bytes());
        buf.extend(&u16::try_from(content.len()).unwrap().to_be_bytes());
        buf.extend(content);
        let total = u16::try_from(buf.len() - 2).unwrap();
        buf[0..2].copy_from_slice(&total.to_be_bytes());

        assert!(ECHConfigList::parse(&buf).is_err());
    }
}
