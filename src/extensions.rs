//! TLS 1.3 extension-type registry entries the ECH subsystem cares about,
//! and the static policy table the inner/outer builder consults (§4.D).
//! Policy is looked up by type rather than by array ordinal, so adding an
//! extension here can't silently desynchronize it from a parallel
//! index-keyed table.

/// `server_name` (RFC 6066).
pub const SERVER_NAME: u16 = 0x0000;
/// `application_layer_protocol_negotiation` (RFC 7301).
pub const ALPN: u16 = 0x0010;
/// `padding` (RFC 7685).
pub const PADDING: u16 = 0x0015;
/// `supported_versions` (RFC 8446 §4.2.1).
pub const SUPPORTED_VERSIONS: u16 = 0x002b;
/// `pre_shared_key` (RFC 8446 §4.2.11) — must always sort last.
pub const PRE_SHARED_KEY: u16 = 0x0029;
/// `key_share` (RFC 8446 §4.2.8).
pub const KEY_SHARE: u16 = 0x0033;
/// `encrypted_client_hello`, carrying the client's `ECH_ENCCH` structure.
/// Added to the outer CH by the encryptor, never by the builder.
pub const ECH: u16 = 0xfe0d;
/// Synthetic inner-only extension listing the outer extensions a
/// compressed inner CH borrows bytes from.
pub const OUTER_EXTENSIONS: u16 = 0xfd00;
/// Zero-length marker present only on an `EncodedClientHelloInner`,
/// distinguishing it from an ordinary outer ClientHello. Vendor-assigned
/// in the source this is distilled from, not IANA-registered.
pub const ECH_IS_INNER: u16 = 0xda09;

/// How the outer CH builder treats one extension type that was present on
/// the first-pass inner ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterPolicy {
    /// The outer carries an independently generated value for this type
    /// (its own `key_share`, its own `server_name`, ...); never
    /// compressed, since the inner and outer bytes are expected to
    /// differ.
    Independent,

    /// The outer re-emits the exact bytes the inner had for this type.
    /// Eligible for compression: when compressed, the inner omits its own
    /// copy and references the outer's instead via `outer_extensions`.
    CopyFromInner,

    /// Never present on the outer CH at all (inner-only structural
    /// extensions, or ones added later by the encryptor rather than the
    /// builder).
    OmitOnOuter,
}

/// Looks up the outer-CH policy for one extension type.
pub fn outer_policy(ext_type: u16) -> OuterPolicy {
    match ext_type {
        SERVER_NAME | ALPN | KEY_SHARE => OuterPolicy::Independent,
        ECH | OUTER_EXTENSIONS | ECH_IS_INNER | PADDING | PRE_SHARED_KEY => OuterPolicy::OmitOnOuter,
        _ => OuterPolicy::CopyFromInner,
    }
}

/// Whether an extension type may be compressed out of the inner CH. Per
/// §4.D this is exactly the `CopyFromInner` set: `ech`,
/// `outer_extensions`, `ech_is_inner`, `padding`, `pre_shared_key`,
/// `server_name`, `alpn`, and `key_share` are never compressed.
pub fn is_compressible(ext_type: u16) -> bool {
    outer_policy(ext_type) == OuterPolicy::CopyFromInner
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn structural_and_independent_extensions_are_never_compressible() {
        for ext in [ECH, OUTER_EXTENSIONS, ECH_IS_INNER, PADDING, PRE_SHARED_KEY, SERVER_NAME, ALPN, KEY_SHARE]
        {
            assert!(!is_compressible(ext), "{:#06x} should not be compressible", ext);
        }
    }

    #[test]
    fn unknown_extensions_default_to_compressible() {
        assert!(is_compressible(SUPPORTED_VERSIONS));
        assert!(is_compressible(0x002c));
    }

    #[test]
    fn required_independent_extensions() {
        for ext in [SERVER_NAME, ALPN, KEY_SHARE] {
            assert_eq!(outer_policy(ext), OuterPolicy::Independent);
        }
    }
}
