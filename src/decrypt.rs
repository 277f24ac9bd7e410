//! ECH Decryptor, server side (§4.F).
//!
//! A failed decrypt attempt is never surfaced as an `Err` — per the
//! propagation rule it folds into [`DecryptOutcome::Grease`] and the
//! handshake continues on the outer name, same as if ECH had never been
//! offered. Only malformed wire encoding (not a crypto failure) reaches
//! the caller as `Err`.

use crate::builder;
use crate::client_hello::ClientHelloView;
use crate::config_store::ServerEchKey;
use crate::extensions;
use crate::hpke_suite;
use crate::EchError;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

const MAX_ENC_LEN: usize = 1024;
const MAX_PAYLOAD_LEN: usize = 65535;

/// One received `ECH_ENCCH` extension body, decoded but not yet opened.
#[derive(Debug, Clone)]
struct EchEnccH {
    kdf_id: u16,
    aead_id: u16,
    config_id: u8,
    enc: Vec<u8>,
    payload: Vec<u8>,
}

fn parse_ench(body: &[u8]) -> Result<EchEnccH, EchError> {
    let mut cursor = Cursor::new(body);
    let kdf_id = cursor.read_u16::<BigEndian>().map_err(EchError::from)?;
    let aead_id = cursor.read_u16::<BigEndian>().map_err(EchError::from)?;
    let config_id = cursor.read_u8().map_err(EchError::from)?;
    let enc_len = usize::from(cursor.read_u16::<BigEndian>().map_err(EchError::from)?);
    if enc_len > MAX_ENC_LEN {
        return Err(EchError::BadExtension("enc exceeds 1024 bytes"));
    }
    let mut enc = vec![0u8; enc_len];
    cursor.read_exact(&mut enc).map_err(EchError::from)?;
    let payload_len = usize::from(cursor.read_u16::<BigEndian>().map_err(EchError::from)?);
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(EchError::BadExtension("payload exceeds 65535 bytes"));
    }
    let mut payload = vec![0u8; payload_len];
    cursor.read_exact(&mut payload).map_err(EchError::from)?;
    Ok(EchEnccH { kdf_id, aead_id, config_id, enc, payload })
}

/// What came of attempting to process a received ClientHello.
pub enum DecryptOutcome {
    /// No `ech` extension was present; proceed with the outer CH as-is.
    Absent,
    /// Decryption succeeded: the reconstructed full inner ClientHello.
    Accepted { inner_client_hello: Vec<u8> },
    /// An `ech` extension was present but no key opened it. The caller
    /// must continue the handshake on the outer CH/`public_name`, never
    /// surfacing the underlying crypto failure.
    Grease,
}

/// `kdf_id(2) ‖ aead_id(2) ‖ config_id(1) ‖ enc_len(2) ‖ enc ‖
/// outer_ch_body_len(3) ‖ outer_ch_body`, mirroring the encryptor's AAD
/// shape exactly (§4.E step 3 / §4.F step 5).
fn build_aad(ench: &EchEnccH, outer_ch_body_excluding_ech: &[u8]) -> Result<Vec<u8>, EchError> {
    use byteorder::WriteBytesExt;
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(ench.kdf_id).map_err(EchError::from)?;
    out.write_u16::<BigEndian>(ench.aead_id).map_err(EchError::from)?;
    out.push(ench.config_id);
    out.write_u16::<BigEndian>(u16::try_from(ench.enc.len()).map_err(|_| EchError::InternalInvariant("enc too long"))?)
        .map_err(EchError::from)?;
    out.extend_from_slice(&ench.enc);
    let len = u32::try_from(outer_ch_body_excluding_ech.len())
        .map_err(|_| EchError::InternalInvariant("outer CH too long"))?;
    out.push(((len >> 16) & 0xff) as u8);
    out.push(((len >> 8) & 0xff) as u8);
    out.push((len & 0xff) as u8);
    out.extend_from_slice(outer_ch_body_excluding_ech);
    Ok(out)
}

/// Rebuilds the outer CH's bytes with the `ech` extension entry excised —
/// the exact shape the AAD was computed over on the client.
fn excise_ech(client_hello: &[u8], view: &ClientHelloView, ech: &crate::client_hello::ExtensionSpan) -> Vec<u8> {
    let mut out = Vec::with_capacity(client_hello.len() - ech.entry_len);
    out.extend_from_slice(&client_hello[..view.extensions_len_start]);
    let new_len = u16::try_from(view.extensions_len - ech.entry_len).unwrap_or(0);
    out.extend_from_slice(&new_len.to_be_bytes());
    out.extend_from_slice(&client_hello[view.extensions_start..ech.entry_start]);
    out.extend_from_slice(&client_hello[ech.entry_start + ech.entry_len..view.extensions_start + view.extensions_len]);
    out
}

/// Looks up the outer CH's extension bytes for `ext_type`, for
/// decompression's `outer_extensions` references.
fn outer_extension_lookup<'a>(client_hello: &'a [u8], view: &'a ClientHelloView) -> impl Fn(u16) -> Option<Vec<u8>> + 'a {
    move |ext_type| {
        view.find(ext_type)
            .map(|span| client_hello[span.body_start..span.body_start + span.body_len].to_vec())
    }
}

/// Whether `TrialDecrypt` (attempting every known key when no
/// `config_id` matches) is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialDecrypt {
    Disabled,
    Enabled,
}

/// Attempts to locate, open, and decompress an `ech` extension on a
/// received ClientHello. `keys` is a read-locked snapshot of the current
/// server config store.
pub fn decrypt(client_hello: &[u8], keys: &[ServerEchKey], trial: TrialDecrypt) -> Result<DecryptOutcome, EchError> {
    let view = ClientHelloView::parse(client_hello).map_err(EchError::from)?;

    let Some(ech_span) = view.find(extensions::ECH) else {
        return Ok(DecryptOutcome::Absent);
    };

    let ench = parse_ench(&client_hello[ech_span.body_start..ech_span.body_start + ech_span.body_len])?;
    let outer_ch_excluding_ech = excise_ech(client_hello, &view, ech_span);
    let aad = build_aad(&ench, &outer_ch_excluding_ech)?;

    let candidates: Vec<&ServerEchKey> = match trial {
        TrialDecrypt::Disabled => keys.iter().filter(|k| matches_config_id(k, ench.config_id)).collect(),
        TrialDecrypt::Enabled => {
            let matching: Vec<&ServerEchKey> = keys.iter().filter(|k| matches_config_id(k, ench.config_id)).collect();
            if matching.is_empty() {
                keys.iter().collect()
            } else {
                matching
            }
        }
    };

    for key in candidates {
        let Some(kem_id) = key.kem_id() else { continue };
        let info = build_info(&key.config_encoding);
        // Crypto failures here are deliberately swallowed: a non-matching
        // key is expected and must never distinguish itself from a
        // genuinely absent ECH via timing or logged errors.
        if let Ok(plaintext) = hpke_suite::open(
            kem_id,
            ench.kdf_id,
            ench.aead_id,
            &key.private_key,
            &ench.enc,
            &info,
            &aad,
            &ench.payload,
        ) {
            let lookup = outer_extension_lookup(client_hello, &view);
            let outer_session_id = &client_hello[view.session_id_start..view.session_id_start + view.session_id_len];
            let inner_client_hello = builder::decode_client_hello_inner(&plaintext, outer_session_id, lookup)?;
            return Ok(DecryptOutcome::Accepted { inner_client_hello });
        }
    }

    Ok(DecryptOutcome::Grease)
}

fn matches_config_id(key: &ServerEchKey, config_id: u8) -> bool {
    key.config_id() == Some(config_id)
}

/// `"tls ech" ‖ 0x00 ‖ <config's exact encoded bytes>`.
fn build_info(config_bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + config_bytes.len());
    out.extend_from_slice(b"tls ech");
    out.push(0);
    out.extend_from_slice(config_bytes);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn absent_when_no_ech_extension() {
        let mut buf = Vec::new();
        use byteorder::WriteBytesExt;
        buf.write_u16::<BigEndian>(0x0303).unwrap();
        buf.extend_from_slice(&[0u8; 32]);
        buf.push(0);
        buf.write_u16::<BigEndian>(2).unwrap();
        buf.extend_from_slice(&[0x13, 0x01]);
        buf.push(1);
        buf.push(0);
        buf.write_u16::<BigEndian>(0).unwrap();

        let outcome = decrypt(&buf, &[], TrialDecrypt::Disabled).unwrap();
        assert!(matches!(outcome, DecryptOutcome::Absent));
    }
}
