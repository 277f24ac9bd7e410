//! GREASE Generator (§4.H): a syntactically valid but undecryptable
//! `ech` extension, emitted when ECH is enabled but no usable config is
//! available (or the caller forces it), so passive observers can't tell
//! "no config yet" apart from "really encrypting."

use crate::extensions;
use crate::hpke_suite;
use crate::EchError;
use byteorder::{BigEndian, WriteBytesExt};
use rand::{Rng, RngCore};

/// The default pseudo-ciphertext length: `0x1D3` (467) bytes, matching a
/// typical real ECH payload so the two are indistinguishable by size.
pub const DEFAULT_PAYLOAD_LEN: usize = 0x1d3;

/// A `(kdf_id, aead_id)` pair plausible enough to pass for a real offer.
const PLAUSIBLE_SUITE: (u16, u16) = (hpke_suite::KDF_HKDF_SHA256, hpke_suite::AEAD_AES_128_GCM);

/// Builds one GREASE `ech` extension body for the given KEM, with a
/// uniformly random `config_id`/`enc`/payload. `jitter` (bytes) is added
/// to `DEFAULT_PAYLOAD_LEN`, scaled by `config_id`, so the length isn't a
/// perfectly fixed fingerprint across connections when the caller opts
/// into jitter (`jitter = 0` reproduces the fixed-length default).
pub fn generate_extension_body(kem_id: u16, jitter: usize, rng: &mut impl RngCore) -> Result<Vec<u8>, EchError> {
    let enc_len = hpke_suite::enc_len(kem_id).ok_or(EchError::NoCompatibleConfig)?;

    let config_id: u8 = rng.gen();
    let mut enc = vec![0u8; enc_len];
    rng.fill_bytes(&mut enc);

    let extra = if jitter == 0 { 0 } else { usize::from(config_id) % (jitter + 1) };
    let payload_len = DEFAULT_PAYLOAD_LEN + extra;
    let mut payload = vec![0u8; payload_len];
    rng.fill_bytes(&mut payload);

    let (kdf_id, aead_id) = PLAUSIBLE_SUITE;

    let mut out = Vec::with_capacity(5 + enc.len() + 2 + payload.len());
    out.write_u16::<BigEndian>(kdf_id).map_err(EchError::from)?;
    out.write_u16::<BigEndian>(aead_id).map_err(EchError::from)?;
    out.push(config_id);
    out.write_u16::<BigEndian>(u16::try_from(enc.len()).map_err(|_| EchError::InternalInvariant("enc too long"))?)
        .map_err(EchError::from)?;
    out.extend_from_slice(&enc);
    out.write_u16::<BigEndian>(
        u16::try_from(payload.len()).map_err(|_| EchError::InternalInvariant("payload too long"))?,
    )
    .map_err(EchError::from)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Appends a GREASE `ech` extension onto `extensions`, in place.
pub fn append_grease(
    extensions: &mut Vec<(u16, Vec<u8>)>,
    kem_id: u16,
    jitter: usize,
    rng: &mut impl RngCore,
) -> Result<(), EchError> {
    extensions.push((extensions::ECH, generate_extension_body(kem_id, jitter, rng)?));
    Ok(())
}
