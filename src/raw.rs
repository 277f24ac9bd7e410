//! Raw Decrypt Façade (§4.J): a stateless entry point for L4 front-ends
//! that only have a full TLS record and a key set, with no session state
//! of their own.

use crate::client_hello::ClientHelloView;
use crate::config_store::ServerEchKey;
use crate::decrypt::{self, DecryptOutcome, TrialDecrypt};
use crate::extensions;
use crate::EchError;

const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_HEADER_LEN: usize = 4;

/// Content type `handshake` (22) and record version `TLS 1.0` (`0x0301`)
/// — the fixed legacy values TLS 1.3 record headers always carry.
const RECORD_CONTENT_TYPE_HANDSHAKE: u8 = 22;
const RECORD_LEGACY_VERSION: [u8; 2] = [0x03, 0x01];
/// Handshake message type `client_hello` (1).
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 1;

/// The result of [`raw_decrypt`].
pub struct RawDecryptResult {
    /// Whether a real (non-GREASE) decrypt happened.
    pub decrypted_ok: bool,
    /// The reconstructed inner ClientHello record, re-synthesized with
    /// fresh record/handshake headers. `None` when `decrypted_ok` is
    /// false (absent or GREASE — the caller keeps using `outer_record`).
    pub inner_record: Option<Vec<u8>>,
    /// The inner (true) SNI, once decrypted.
    pub inner_sni: Option<String>,
    /// The outer (public) SNI, if the outer CH carried one.
    pub outer_sni: Option<String>,
}

fn extract_sni(client_hello: &[u8], view: &ClientHelloView) -> Option<String> {
    let span = view.find(extensions::SERVER_NAME)?;
    let body = &client_hello[span.body_start..span.body_start + span.body_len];
    parse_server_name_list(body)
}

/// Parses RFC 6066's `server_name` extension body: `list_len(2) ‖
/// (name_type(1) ‖ name_len(2) ‖ name)*`, taking the first `host_name`
/// (type 0) entry.
fn parse_server_name_list(body: &[u8]) -> Option<String> {
    if body.len() < 2 {
        return None;
    }
    let list_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
    let list = body.get(2..2 + list_len)?;
    let mut pos = 0;
    while pos + 3 <= list.len() {
        let name_type = list[pos];
        let name_len = usize::from(u16::from_be_bytes([list[pos + 1], list[pos + 2]]));
        let name_start = pos + 3;
        let name = list.get(name_start..name_start + name_len)?;
        if name_type == 0 {
            return String::from_utf8(name.to_vec()).ok();
        }
        pos = name_start + name_len;
    }
    None
}

/// Wraps a handshake body in a fresh record header (`content_type(1) ‖
/// legacy_version(2) ‖ length(2)`) and handshake header (`msg_type(1) ‖
/// length(3)`).
fn wrap_as_record(handshake_body: &[u8]) -> Vec<u8> {
    let handshake_len = u32::try_from(handshake_body.len()).unwrap_or(u32::MAX);
    let mut handshake = Vec::with_capacity(HANDSHAKE_HEADER_LEN + handshake_body.len());
    handshake.push(HANDSHAKE_TYPE_CLIENT_HELLO);
    handshake.extend_from_slice(&handshake_len.to_be_bytes()[1..]);
    handshake.extend_from_slice(handshake_body);

    let record_len = u16::try_from(handshake.len()).unwrap_or(u16::MAX);
    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + handshake.len());
    record.push(RECORD_CONTENT_TYPE_HANDSHAKE);
    record.extend_from_slice(&RECORD_LEGACY_VERSION);
    record.extend_from_slice(&record_len.to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// Strips a record header and a handshake header off `record`, returning
/// the handshake body (the ClientHello proper).
fn unwrap_record(record: &[u8]) -> Result<&[u8], EchError> {
    if record.len() < RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN {
        return Err(EchError::BadExtension("record shorter than its fixed headers"));
    }
    let record_len = usize::from(u16::from_be_bytes([record[3], record[4]]));
    if record.len() != RECORD_HEADER_LEN + record_len {
        return Err(EchError::BadExtension("record length prefix mismatch"));
    }
    let handshake = &record[RECORD_HEADER_LEN..];
    let handshake_len = (usize::from(handshake[1]) << 16) | (usize::from(handshake[2]) << 8) | usize::from(handshake[3]);
    if handshake.len() != HANDSHAKE_HEADER_LEN + handshake_len {
        return Err(EchError::BadExtension("handshake length prefix mismatch"));
    }
    Ok(&handshake[HANDSHAKE_HEADER_LEN..])
}

/// Decrypts a full outer ClientHello TLS record against `keys`, with no
/// session state beyond local scratch buffers. `decrypted_ok = false`
/// with `Ok(..)` covers both "absent" and "GREASE" — both are handled
/// identically by a front-end that only forwards `outer_record`.
pub fn raw_decrypt(outer_record: &[u8], keys: &[ServerEchKey], trial: TrialDecrypt) -> Result<RawDecryptResult, EchError> {
    let client_hello = unwrap_record(outer_record)?;
    let view = ClientHelloView::parse(client_hello).map_err(EchError::from)?;
    let outer_sni = extract_sni(client_hello, &view);

    match decrypt::decrypt(client_hello, keys, trial)? {
        DecryptOutcome::Absent | DecryptOutcome::Grease => {
            Ok(RawDecryptResult { decrypted_ok: false, inner_record: None, inner_sni: None, outer_sni })
        }
        DecryptOutcome::Accepted { inner_client_hello } => {
            let inner_view = ClientHelloView::parse(&inner_client_hello).map_err(EchError::from)?;
            let inner_sni = extract_sni(&inner_client_hello, &inner_view);
            let inner_record = wrap_as_record(&inner_client_hello);
            Ok(RawDecryptResult { decrypted_ok: true, inner_record: Some(inner_record), inner_sni, outer_sni })
        }
    }
}
