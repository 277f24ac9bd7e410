//! Inner/Outer ClientHello Builder (§4.D).
//!
//! Works on an extension-type-keyed list rather than a raw ClientHello
//! buffer: the caller (the encryptor, for the real handshake path, or a
//! test, for the property checks) is responsible for slicing the
//! first-pass inner CH's extensions out of its wire bytes and for
//! re-assembling the final buffers with [`crate::client_hello::rebuild`].

use crate::extensions::{self, OuterPolicy};
use crate::EchError;
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeSet;

/// One extension as `(type, opaque body)`, in wire order.
pub type ExtensionList = Vec<(u16, Vec<u8>)>;

/// The prefix of a ClientHello shared identically between inner and
/// outer, up through (but not including) the extensions list:
/// `legacy_version(2) ‖ random(32) ‖ session_id<0..32> ‖
/// cipher_suites<2..2^16-2> ‖ compression_methods<1..2^8-1>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChPrefix {
    /// `legacy_version`, `0x0303` for TLS 1.3.
    pub legacy_version: u16,
    /// The 32-byte `random`.
    pub random: [u8; 32],
    /// The legacy session id (≤ 32 bytes).
    pub session_id: Vec<u8>,
    /// The raw, already-encoded `cipher_suites` list body.
    pub cipher_suites: Vec<u8>,
    /// The raw, already-encoded `compression_methods` list body.
    pub compression_methods: Vec<u8>,
}

impl ChPrefix {
    /// Encodes this prefix, overriding the session id with `session_id`
    /// (building `EncodedClientHelloInner` forces it empty; rebuilding
    /// the outer or a decompressed inner uses the real one).
    pub(crate) fn encode(&self, session_id: &[u8]) -> Result<Vec<u8>, EchError> {
        let mut out = Vec::new();
        out.write_u16::<BigEndian>(self.legacy_version).map_err(EchError::from)?;
        out.extend_from_slice(&self.random);
        out.push(u8::try_from(session_id.len()).map_err(|_| EchError::InternalInvariant("session_id too long"))?);
        out.extend_from_slice(session_id);
        out.write_u16::<BigEndian>(
            u16::try_from(self.cipher_suites.len()).map_err(|_| EchError::InternalInvariant("cipher_suites too long"))?,
        )
        .map_err(EchError::from)?;
        out.extend_from_slice(&self.cipher_suites);
        out.push(u8::try_from(self.compression_methods.len()).map_err(|_| {
            EchError::InternalInvariant("compression_methods too long")
        })?);
        out.extend_from_slice(&self.compression_methods);
        Ok(out)
    }
}

fn encode_extension_entry(ext_type: u16, body: &[u8]) -> Result<Vec<u8>, EchError> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.write_u16::<BigEndian>(ext_type).map_err(EchError::from)?;
    out.write_u16::<BigEndian>(u16::try_from(body.len()).map_err(|_| EchError::InternalInvariant("extension body too long"))?)
        .map_err(EchError::from)?;
    out.extend_from_slice(body);
    Ok(out)
}

fn encode_extension_list(extensions: &ExtensionList) -> Result<Vec<u8>, EchError> {
    let mut out = Vec::new();
    for (ext_type, body) in extensions {
        out.extend(encode_extension_entry(*ext_type, body)?);
    }
    Ok(out)
}

/// Builds the `outer_extensions(0xFD00)` marker body: a 1-octet list
/// length followed by the 2-octet types of the omitted extensions, in the
/// order they first appeared.
fn outer_extensions_marker(types: &[u16]) -> Result<Vec<u8>, EchError> {
    let mut body = Vec::with_capacity(1 + types.len() * 2);
    body.push(u8::try_from(types.len()).map_err(|_| EchError::InternalInvariant("too many compressed extensions"))?);
    for t in types {
        body.write_u16::<BigEndian>(*t).map_err(EchError::from)?;
    }
    Ok(body)
}

/// Emits `EncodedClientHelloInner`: identical to the first-pass inner CH
/// through `compression_methods` except `session_id` is forced empty, and
/// with every extension type in `compress` (intersected with what's
/// actually eligible, per [`extensions::is_compressible`]) removed from
/// the extensions list and replaced, at its first occurrence, by a single
/// `outer_extensions` marker.
pub fn encode_client_hello_inner(
    prefix: &ChPrefix,
    inner_extensions: &ExtensionList,
    compress: &BTreeSet<u16>,
) -> Result<Vec<u8>, EchError> {
    let mut compressed_types = Vec::new();
    let mut rewritten: ExtensionList = Vec::new();
    let mut marker_inserted = false;

    for (ext_type, body) in inner_extensions {
        if compress.contains(ext_type) && extensions::is_compressible(*ext_type) {
            compressed_types.push(*ext_type);
            if !marker_inserted {
                rewritten.push((extensions::OUTER_EXTENSIONS, Vec::new()));
                marker_inserted = true;
            }
        } else {
            rewritten.push((*ext_type, body.clone()));
        }
    }

    if let Some(entry) = rewritten.iter_mut().find(|(t, _)| *t == extensions::OUTER_EXTENSIONS) {
        entry.1 = outer_extensions_marker(&compressed_types)?;
    }

    let head = prefix.encode(&[])?;
    let ext_bytes = encode_extension_list(&rewritten)?;
    crate::client_hello::rebuild(&head, &ext_bytes).map_err(EchError::from)
}

/// Builds the outer CH's extensions list from the first-pass inner's
/// extensions, per [`extensions::outer_policy`]: `Independent` types take
/// their value from `independent_values`, `CopyFromInner` types are
/// re-emitted verbatim, `OmitOnOuter` types are dropped.
pub fn build_outer_extensions(
    inner_extensions: &ExtensionList,
    independent_values: &[(u16, Vec<u8>)],
) -> ExtensionList {
    let mut out = Vec::new();
    for (ext_type, body) in inner_extensions {
        match extensions::outer_policy(*ext_type) {
            OuterPolicy::CopyFromInner => out.push((*ext_type, body.clone())),
            OuterPolicy::Independent | OuterPolicy::OmitOnOuter => {}
        }
    }
    for (ext_type, value) in independent_values {
        if !out.iter().any(|(t, _)| t == ext_type) {
            out.push((*ext_type, value.clone()));
        }
    }
    out
}

/// Reverses [`encode_client_hello_inner`]: given the bytes of an
/// `EncodedClientHelloInner` and a lookup from extension type to the
/// outer CH's bytes for that type, reconstructs the full inner CH,
/// restoring the outer's `session_id` (the inner's own was discarded when
/// building the encoded form).
pub fn decode_client_hello_inner(
    encoded_inner: &[u8],
    outer_session_id: &[u8],
    outer_lookup: impl Fn(u16) -> Option<Vec<u8>>,
) -> Result<Vec<u8>, EchError> {
    use crate::client_hello::ClientHelloView;

    let view = ClientHelloView::parse(encoded_inner)?;
    let mut rewritten: ExtensionList = Vec::new();

    for span in &view.extensions {
        if span.ext_type == extensions::OUTER_EXTENSIONS {
            let body = &encoded_inner[span.body_start..span.body_start + span.body_len];
            let count = usize::from(*body.first().ok_or(EchError::BadExtension("empty outer_extensions body"))?);
            if body.len() != 1 + count * 2 {
                return Err(EchError::BadExtension("outer_extensions length mismatch"));
            }
            for chunk in body[1..].chunks_exact(2) {
                let ext_type = u16::from_be_bytes([chunk[0], chunk[1]]);
                let value = outer_lookup(ext_type)
                    .ok_or(EchError::BadExtension("outer_extensions referenced a type absent from the outer CH"))?;
                rewritten.push((ext_type, value));
            }
        } else {
            let body = encoded_inner[span.body_start..span.body_start + span.body_len].to_vec();
            rewritten.push((span.ext_type, body));
        }
    }

    let (cipher_suites, compression_methods) = split_suites_and_compression(encoded_inner, &view)?;
    let prefix = ChPrefix {
        legacy_version: view.legacy_version,
        random: encoded_inner[view.random_start..view.random_start + 32]
            .try_into()
            .map_err(|_| EchError::InternalInvariant("random field short"))?,
        session_id: Vec::new(),
        cipher_suites,
        compression_methods,
    };

    let head = prefix.encode(outer_session_id)?;
    let ext_bytes = encode_extension_list(&rewritten)?;
    crate::client_hello::rebuild(&head, &ext_bytes).map_err(EchError::from)
}

fn split_suites_and_compression(
    bytes: &[u8],
    view: &crate::client_hello::ClientHelloView,
) -> Result<(Vec<u8>, Vec<u8>), EchError> {
    use byteorder::{BigEndian, ReadBytesExt};
    use std::io::{Cursor, Read};

    let mut cursor = Cursor::new(bytes);
    cursor.set_position((view.session_id_start + view.session_id_len) as u64);
    let suites_len = cursor.read_u16::<BigEndian>().map_err(EchError::from)?;
    let mut suites = vec![0u8; usize::from(suites_len)];
    cursor.read_exact(&mut suites).map_err(EchError::from)?;
    let compression_len = cursor.read_u8().map_err(EchError::from)?;
    let mut compression = vec![0u8; usize::from(compression_len)];
    cursor.read_exact(&mut compression).map_err(EchError::from)?;
    Ok((suites, compression))
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_prefix() -> ChPrefix {
        ChPrefix {
            legacy_version: 0x0303,
            random: [0x42; 32],
            session_id: vec![1, 2, 3, 4],
            cipher_suites: vec![0x13, 0x01, 0x13, 0x02],
            compression_methods: vec![0],
        }
    }

    #[test]
    fn compresses_and_decompresses_round_trip() {
        let prefix = sample_prefix();
        let inner_extensions: ExtensionList = vec![
            (extensions::SERVER_NAME, b"secret.example".to_vec()),
            (extensions::SUPPORTED_VERSIONS, vec![2, 0x03, 0x04]),
            (extensions::ALPN, b"h2".to_vec()),
        ];

        let mut compress = BTreeSet::new();
        compress.insert(extensions::SUPPORTED_VERSIONS);

        let encoded_inner = encode_client_hello_inner(&prefix, &inner_extensions, &compress).unwrap();

        let independent = vec![
            (extensions::SERVER_NAME, b"public.example".to_vec()),
            (extensions::ALPN, b"h2".to_vec()),
            (extensions::KEY_SHARE, vec![9, 9, 9]),
        ];
        let outer_extensions = build_outer_extensions(&inner_extensions, &independent);

        // supported_versions is CopyFromInner, so it should appear on the outer.
        assert!(outer_extensions.iter().any(|(t, _)| *t == extensions::SUPPORTED_VERSIONS));
        // server_name is Independent: the outer's differs from the inner's.
        let outer_sni = &outer_extensions.iter().find(|(t, _)| *t == extensions::SERVER_NAME).unwrap().1;
        assert_eq!(outer_sni, b"public.example");

        let outer_session_id = vec![9, 9, 9, 9];
        let lookup = |t: u16| outer_extensions.iter().find(|(et, _)| *et == t).map(|(_, v)| v.clone());

        let decoded = decode_client_hello_inner(&encoded_inner, &outer_session_id, lookup).unwrap();

        let original = {
            let head = prefix.encode(&prefix.session_id).unwrap();
            let mut fixed_inner = inner_extensions.clone();
            // the real inner always carries its own session_id; decompression
            // restores the *outer's* session_id instead, matching the spec
            // note that the swap always runs on an outer-derived session.
            let _ = &mut fixed_inner;
            let ext_bytes = encode_extension_list(&inner_extensions).unwrap();
            let mut expected = crate::client_hello::rebuild(&head, &ext_bytes).unwrap();
            // overwrite session id length/bytes with the outer's, matching decode's behavior
            expected = {
                let head = prefix.encode(&outer_session_id).unwrap();
                crate::client_hello::rebuild(&head, &ext_bytes).unwrap()
            };
            expected
        };

        assert_eq!(decoded, original);
    }

    #[test]
    fn never_compresses_independent_extensions() {
        let prefix = sample_prefix();
        let inner_extensions: ExtensionList = vec![(extensions::SERVER_NAME, b"secret.example".to_vec())];
        let mut compress = BTreeSet::new();
        compress.insert(extensions::SERVER_NAME);

        let encoded = encode_client_hello_inner(&prefix, &inner_extensions, &compress).unwrap();
        let view = crate::client_hello::ClientHelloView::parse(&encoded).unwrap();
        assert!(view.find(extensions::OUTER_EXTENSIONS).is_none());
        assert!(view.find(extensions::SERVER_NAME).is_some());
    }
}
