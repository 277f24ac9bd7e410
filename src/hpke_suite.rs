//! Thin boundary around the external HPKE (KEM/KDF/AEAD) primitives.
//!
//! Per the scope rule that treats HPKE as an external collaborator, this
//! module does not implement RFC 9180 itself — it only maps the `u16`
//! suite identifiers carried on the wire onto calls into the `hpke` crate's
//! generic, compile-time-typed API. Everything above this module talks in
//! terms of `(kem_id, kdf_id, aead_id)` triples and raw byte slices.

use hpke::{Deserializable, Kem as _, OpModeR, OpModeS, Serializable};
use rand::rngs::OsRng;
use std::fmt;

/// DHKEM(P-256, HKDF-SHA256), RFC 9180 §7.1.
pub const KEM_DHKEM_P256_HKDF_SHA256: u16 = 0x0010;
/// DHKEM(X25519, HKDF-SHA256), RFC 9180 §7.1.
pub const KEM_DHKEM_X25519_HKDF_SHA256: u16 = 0x0020;

/// HKDF-SHA256, RFC 9180 §7.2.
pub const KDF_HKDF_SHA256: u16 = 0x0001;
/// HKDF-SHA384, RFC 9180 §7.2.
pub const KDF_HKDF_SHA384: u16 = 0x0002;
/// HKDF-SHA512, RFC 9180 §7.2.
pub const KDF_HKDF_SHA512: u16 = 0x0003;

/// AES-128-GCM, RFC 9180 §7.3.
pub const AEAD_AES_128_GCM: u16 = 0x0001;
/// AES-256-GCM, RFC 9180 §7.3.
pub const AEAD_AES_256_GCM: u16 = 0x0002;
/// ChaCha20Poly1305, RFC 9180 §7.3.
pub const AEAD_CHACHA20_POLY1305: u16 = 0x0003;

/// Something that went wrong inside the HPKE backend, or a suite this
/// backend doesn't carry an implementation for.
#[derive(Debug)]
pub enum HpkeError {
    /// The underlying `hpke` crate reported a failure (bad tag, encryption
    /// error, malformed key, or sequence overflow).
    Backend(hpke::HpkeError),

    /// `(kem_id, kdf_id, aead_id)` isn't one of the suites this backend
    /// was built with.
    UnsupportedSuite {
        /// The requested KEM identifier.
        kem_id: u16,
        /// The requested KDF identifier.
        kdf_id: u16,
        /// The requested AEAD identifier.
        aead_id: u16,
    },
}

impl fmt::Display for HpkeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(e) => write!(f, "HPKE backend error: {}", e),
            Self::UnsupportedSuite { kem_id, kdf_id, aead_id } => write!(
                f,
                "unsupported HPKE suite kem={:#06x} kdf={:#06x} aead={:#06x}",
                kem_id, kdf_id, aead_id
            ),
        }
    }
}

impl std::error::Error for HpkeError {}

impl From<hpke::HpkeError> for HpkeError {
    fn from(inner: hpke::HpkeError) -> Self {
        Self::Backend(inner)
    }
}

/// Expands the (kem, kdf, aead) cross product into a match arm per
/// combination, binding `Kem`/`Kdf`/`Aead` type aliases for `$body` —
/// avoids hand-writing the same 18-way dispatch in every function that
/// needs a concrete instantiation of the generic `hpke` API.
macro_rules! dispatch_suite {
    ($kem_id:expr, $kdf_id:expr, $aead_id:expr, $Kem:ident, $Kdf:ident, $Aead:ident, $body:block) => {{
        match ($kem_id, $kdf_id, $aead_id) {
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_X25519_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::X25519HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA256, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha256;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA384, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha384;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_AES_128_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::AesGcm128;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_AES_256_GCM) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::AesGcm256;
                $body
            }
            (KEM_DHKEM_P256_HKDF_SHA256, KDF_HKDF_SHA512, AEAD_CHACHA20_POLY1305) => {
                type $Kem = hpke::kem::DhP256HkdfSha256;
                type $Kdf = hpke::kdf::HkdfSha512;
                type $Aead = hpke::aead::ChaCha20Poly1305;
                $body
            }
            (kem_id, kdf_id, aead_id) => {
                Err(HpkeError::UnsupportedSuite { kem_id, kdf_id, aead_id })
            }
        }
    }};
}

/// Whether `(kem_id, kdf_id, aead_id)` is implemented by this backend.
pub fn is_supported(kem_id: u16, kdf_id: u16, aead_id: u16) -> bool {
    matches!(kem_id, KEM_DHKEM_X25519_HKDF_SHA256 | KEM_DHKEM_P256_HKDF_SHA256)
        && matches!(kdf_id, KDF_HKDF_SHA256 | KDF_HKDF_SHA384 | KDF_HKDF_SHA512)
        && matches!(aead_id, AEAD_AES_128_GCM | AEAD_AES_256_GCM | AEAD_CHACHA20_POLY1305)
}

/// Generates a fresh `(private_key, public_key)` pair for `kem_id`, both as
/// their RFC 9180 fixed-length serializations.
pub fn generate_keypair(kem_id: u16) -> Result<(Vec<u8>, Vec<u8>), HpkeError> {
    match kem_id {
        KEM_DHKEM_X25519_HKDF_SHA256 => {
            let (sk, pk) = hpke::kem::X25519HkdfSha256::gen_keypair(&mut OsRng);
            Ok((sk.to_bytes().to_vec(), pk.to_bytes().to_vec()))
        }
        KEM_DHKEM_P256_HKDF_SHA256 => {
            let (sk, pk) = hpke::kem::DhP256HkdfSha256::gen_keypair(&mut OsRng);
            Ok((sk.to_bytes().to_vec(), pk.to_bytes().to_vec()))
        }
        _ => Err(HpkeError::UnsupportedSuite { kem_id, kdf_id: 0, aead_id: 0 }),
    }
}

/// Encapsulates to `public_key` and seals `plaintext` in HPKE base mode,
/// returning `(enc, ciphertext)`. `build_aad` is handed the real `enc`
/// bytes before encryption happens, since the AAD (§4.E step 3) must
/// include them — encapsulation and the `Seal` call are kept as two
/// steps internally so `enc` is known before `build_aad` runs.
pub fn seal(
    kem_id: u16,
    kdf_id: u16,
    aead_id: u16,
    public_key: &[u8],
    info: &[u8],
    plaintext: &[u8],
    build_aad: impl FnOnce(&[u8]) -> Vec<u8>,
) -> Result<(Vec<u8>, Vec<u8>), HpkeError> {
    dispatch_suite!(kem_id, kdf_id, aead_id, Kem, Kdf, Aead, {
        let pk = <Kem as hpke::Kem>::PublicKey::from_bytes(public_key)?;
        let (encapped, mut ctx) =
            hpke::setup_sender::<Aead, Kdf, Kem, _>(&OpModeS::Base, &pk, info, &mut OsRng)?;
        let enc = encapped.to_bytes().to_vec();
        let aad = build_aad(&enc);
        let ciphertext = ctx.seal(plaintext, &aad)?;
        Ok((enc, ciphertext))
    })
}

/// Decapsulates `enc` with `private_key` and opens `ciphertext` in HPKE
/// base mode, returning the plaintext.
pub fn open(
    kem_id: u16,
    kdf_id: u16,
    aead_id: u16,
    private_key: &[u8],
    enc: &[u8],
    info: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, HpkeError> {
    dispatch_suite!(kem_id, kdf_id, aead_id, Kem, Kdf, Aead, {
        let sk = <Kem as hpke::Kem>::PrivateKey::from_bytes(private_key)?;
        let encapped = <Kem as hpke::Kem>::EncappedKey::from_bytes(enc)?;
        let plaintext =
            hpke::single_shot_open::<Aead, Kdf, Kem>(&OpModeR::Base, &sk, &encapped, info, ciphertext, aad)?;
        Ok(plaintext)
    })
}

/// The length in bytes of a KEM's `enc` value (its encapsulated key), used
/// by the GREASE generator to size a plausible-looking random value.
pub fn enc_len(kem_id: u16) -> Option<usize> {
    match kem_id {
        KEM_DHKEM_X25519_HKDF_SHA256 => Some(32),
        KEM_DHKEM_P256_HKDF_SHA256 => Some(65),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_x25519_chacha() {
        let (sk, pk) = generate_keypair(KEM_DHKEM_X25519_HKDF_SHA256).unwrap();
        let info = b"tls ech\x00config-bytes-here";
        let aad = b"outer ch aad";
        let plaintext = b"EncodedClientHelloInner bytes";

        let (enc, ciphertext) = seal(
            KEM_DHKEM_X25519_HKDF_SHA256,
            KDF_HKDF_SHA256,
            AEAD_CHACHA20_POLY1305,
            &pk,
            info,
            plaintext,
            |_enc| aad.to_vec(),
        )
        .unwrap();

        let opened = open(
            KEM_DHKEM_X25519_HKDF_SHA256,
            KDF_HKDF_SHA256,
            AEAD_CHACHA20_POLY1305,
            &sk,
            &enc,
            info,
            aad,
            &ciphertext,
        )
        .unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_aad_fails() {
        let (sk, pk) = generate_keypair(KEM_DHKEM_X25519_HKDF_SHA256).unwrap();
        let info = b"tls ech\x00config-bytes-here";
        let (enc, ciphertext) = seal(
            KEM_DHKEM_X25519_HKDF_SHA256,
            KDF_HKDF_SHA256,
            AEAD_AES_128_GCM,
            &pk,
            info,
            b"msg",
            |_enc| b"aad-a".to_vec(),
        )
        .unwrap();

        let result = open(
            KEM_DHKEM_X25519_HKDF_SHA256,
            KDF_HKDF_SHA256,
            AEAD_AES_128_GCM,
            &sk,
            &enc,
            info,
            b"aad-b",
            &ciphertext,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unsupported_suite_reported() {
        assert!(!is_supported(0x1234, KDF_HKDF_SHA256, AEAD_AES_128_GCM));
        let err = seal(0x1234, KDF_HKDF_SHA256, AEAD_AES_128_GCM, &[], b"", b"", |_enc| Vec::new()).unwrap_err();
        assert!(matches!(err, HpkeError::UnsupportedSuite { .. }));
    }
}
