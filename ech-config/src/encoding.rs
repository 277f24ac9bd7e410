//! Decoding of an `ECHConfigs` blob out of whatever transport encoding it
//! arrived in: a raw SVCB/HTTPS presentation-format RR, a semicolon-joined
//! run of base64 RR values, ASCII-hex, or already-decoded binary.
//!
//! This is the "Encoding Codec" — it has no opinion on the *contents* of
//! the decoded bytes, only on how to get from "whatever dig/a resolver
//! library handed us" to a binary buffer that [`crate::ECHConfigList`]
//! can parse.

use core::fmt;

/// The maximum size we'll accept for an encoded `ECHConfigs` input, before
/// even attempting to decode it.
const MAX_INPUT_LEN: usize = 1500;

/// One of the transport encodings an `ECHConfigs` blob may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// SVCB/HTTPS zone-file presentation format, containing an `ech=...`
    /// SvcParam whose value is base64.
    HttpsSvc,

    /// ASCII hex digits, optionally `;`-separated into multiple runs.
    AsciiHex,

    /// Standard base64 text, optionally `;`-separated into multiple runs.
    B64Txt,

    /// Already-decoded binary.
    Bin,
}

/// Something that went wrong decoding an encoded `ECHConfigs` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The input didn't match the alphabet implied by its guessed (or
    /// given) [`Format`].
    InvalidEncoding,

    /// The input was longer than [`MAX_INPUT_LEN`] bytes.
    InputTooLong,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding => f.write_str("input did not match the expected encoding"),
            Self::InputTooLong => write!(f, "input longer than {} bytes", MAX_INPUT_LEN),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Guesses the [`Format`] of an encoded `ECHConfigs` input, from most to
/// least constrained: the presence of `ech=` selects SVCB presentation
/// format; failing that, a run of hex digits (and `;`) selects ASCII hex;
/// failing that, the base64 alphabet (and `;`) selects base64 text;
/// anything else is assumed to already be binary.
pub fn guess_format(bytes: &[u8]) -> Format {
    if contains_subslice(bytes, b"ech=") {
        return Format::HttpsSvc;
    }

    if !bytes.is_empty() && bytes.iter().all(|&b| is_ascii_hex_digit(b) || b == b';') {
        return Format::AsciiHex;
    }

    if !bytes.is_empty() && bytes.iter().all(|&b| is_base64_alphabet(b) || b == b';') {
        return Format::B64Txt;
    }

    Format::Bin
}

/// Decodes `bytes` according to `format`, returning the binary
/// `ECHConfigs` buffer. Multiple `;`-separated runs (in the `AsciiHex` and
/// `B64Txt` formats) are decoded individually and concatenated, which lets
/// a caller pass in several catenated RR values as a single input.
pub fn decode(format: Format, bytes: &[u8]) -> Result<Vec<u8>, EncodingError> {
    if bytes.len() > MAX_INPUT_LEN {
        return Err(EncodingError::InputTooLong);
    }

    match format {
        Format::HttpsSvc => decode_https_svc(bytes),
        Format::AsciiHex => decode_joined(bytes, decode_hex_run),
        Format::B64Txt => decode_joined(bytes, decode_base64_run),
        Format::Bin => Ok(bytes.to_vec()),
    }
}

/// Decodes `bytes`, guessing the format first.
pub fn decode_guessing(bytes: &[u8]) -> Result<Vec<u8>, EncodingError> {
    decode(guess_format(bytes), bytes)
}

/// Re-encodes a decoded `ECHConfigs` buffer as ASCII hex, the inverse of
/// [`decode`] with [`Format::AsciiHex`].
pub fn encode_ascii_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn decode_joined(
    bytes: &[u8],
    mut decode_run: impl FnMut(&[u8]) -> Result<Vec<u8>, EncodingError>,
) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    for run in bytes.split(|&b| b == b';') {
        if run.is_empty() {
            continue;
        }
        out.extend(decode_run(run)?);
    }
    Ok(out)
}

fn decode_hex_run(run: &[u8]) -> Result<Vec<u8>, EncodingError> {
    if run.len() % 2 != 0 {
        return Err(EncodingError::InvalidEncoding);
    }
    run.chunks_exact(2)
        .map(|pair| {
            let hi = hex_val(pair[0])?;
            let lo = hex_val(pair[1])?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

fn hex_val(b: u8) -> Result<u8, EncodingError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(EncodingError::InvalidEncoding),
    }
}

fn decode_base64_run(run: &[u8]) -> Result<Vec<u8>, EncodingError> {
    base64::decode_config(run, base64::STANDARD).map_err(|_| EncodingError::InvalidEncoding)
}

/// Pulls the value of the `ech=` SvcParam out of an SVCB/HTTPS
/// presentation-format line, then base64-decodes it.
///
/// Presentation format looks like (whitespace-separated):
/// `<priority> <target> alpn=h2 ech=AEj+DQ...`
fn decode_https_svc(bytes: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let text = std::str::from_utf8(bytes).map_err(|_| EncodingError::InvalidEncoding)?;
    let value = text
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("ech="))
        .ok_or(EncodingError::InvalidEncoding)?;
    decode_joined(value.as_bytes(), decode_base64_run)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn is_ascii_hex_digit(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

fn is_base64_alphabet(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const CLOUDFLARE_B64: &str = "AEb+DQBCPwAgACAoJhkM1Ki3KtogKZosPZiIg3JWb8JCmnLnqs1TSGlpdwAEAAEAAQATY2xvdWRmbGFyZS1lc25pLmNvbQAA";

    #[test]
    fn guesses_b64txt() {
        assert_eq!(guess_format(CLOUDFLARE_B64.as_bytes()), Format::B64Txt);
    }

    #[test]
    fn guesses_https_svc() {
        let line = format!("1 . alpn=h2 ech={}", CLOUDFLARE_B64);
        assert_eq!(guess_format(line.as_bytes()), Format::HttpsSvc);
    }

    #[test]
    fn guesses_ascii_hex() {
        assert_eq!(guess_format(b"deadbeef;0011"), Format::AsciiHex);
    }

    #[test]
    fn guesses_binary() {
        assert_eq!(guess_format(&[0x00, 0xFE, 0x0D, 0xFF]), Format::Bin);
    }

    #[test]
    fn format_invariance() {
        let binary = base64::decode_config(CLOUDFLARE_B64, base64::STANDARD).unwrap();

        let from_b64 = decode(Format::B64Txt, CLOUDFLARE_B64.as_bytes()).unwrap();
        assert_eq!(from_b64, binary);

        let hex = encode_ascii_hex(&binary);
        let from_hex = decode(Format::AsciiHex, hex.as_bytes()).unwrap();
        assert_eq!(from_hex, binary);

        let svcb_line = format!("1 . ech={}", CLOUDFLARE_B64);
        let from_svcb = decode(Format::HttpsSvc, svcb_line.as_bytes()).unwrap();
        assert_eq!(from_svcb, binary);
    }

    #[test]
    fn semicolon_concatenates() {
        let a = decode(Format::AsciiHex, b"aabb").unwrap();
        let b = decode(Format::AsciiHex, b"ccdd").unwrap();
        let joined = decode(Format::AsciiHex, b"aabb;ccdd").unwrap();
        assert_eq!(joined, [a, b].concat());
    }

    #[test]
    fn rejects_oversized_input() {
        let big = vec![b'0'; MAX_INPUT_LEN + 1];
        assert_eq!(decode(Format::AsciiHex, &big), Err(EncodingError::InputTooLong));
    }

    #[test]
    fn rejects_odd_length_hex() {
        assert_eq!(decode(Format::AsciiHex, b"abc"), Err(EncodingError::InvalidEncoding));
    }
}
