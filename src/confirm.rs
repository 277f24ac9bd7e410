//! Accept-Confirmation (§4.G): the 8-byte signal a server writes into
//! `ServerHello.random[24..32]` and a client compares, to learn whether
//! its ECH offer was accepted.

use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha384};

const LABEL: &[u8] = b"ech accept confirmation";
const SIGNAL_LEN: usize = 8;

/// The transcript hash algorithm selected for the handshake. Falls back
/// to `Sha256` if the cipher suite isn't known yet when this is computed
/// (§4.G's explicit fallback note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeHash {
    Sha256,
    Sha384,
}

impl Default for HandshakeHash {
    fn default() -> Self {
        Self::Sha256
    }
}

/// `length(2) ‖ "tls13 " ‖ label<1..255> ‖ context<0..255>`, RFC 8446
/// §7.1's `HkdfLabel` structure.
fn hkdf_label(length: u16, label: &[u8], context: &[u8]) -> Vec<u8> {
    let mut full_label = Vec::with_capacity(6 + label.len());
    full_label.extend_from_slice(b"tls13 ");
    full_label.extend_from_slice(label);

    let mut out = Vec::with_capacity(2 + 1 + full_label.len() + 1 + context.len());
    out.extend_from_slice(&length.to_be_bytes());
    out.push(u8::try_from(full_label.len()).expect("label under 255 bytes"));
    out.extend_from_slice(&full_label);
    out.push(u8::try_from(context.len()).expect("context under 255 bytes"));
    out.extend_from_slice(context);
    out
}

fn transcript_hash(hash: HandshakeHash, transcript: &[u8]) -> Vec<u8> {
    match hash {
        HandshakeHash::Sha256 => Sha256::digest(transcript).to_vec(),
        HandshakeHash::Sha384 => Sha384::digest(transcript).to_vec(),
    }
}

/// Builds `T = inner_CH_full ‖ SH_with_random[24..32] = 0` and computes
/// `HKDF-Expand-Label(handshake_secret, "ech accept confirmation",
/// Hash(T), 8)`.
pub fn compute_signal(
    hash: HandshakeHash,
    handshake_secret: &[u8],
    inner_client_hello: &[u8],
    server_hello_with_random_zeroed: &[u8],
) -> [u8; SIGNAL_LEN] {
    let mut transcript = Vec::with_capacity(inner_client_hello.len() + server_hello_with_random_zeroed.len());
    transcript.extend_from_slice(inner_client_hello);
    transcript.extend_from_slice(server_hello_with_random_zeroed);

    let digest = transcript_hash(hash, &transcript);
    let info = hkdf_label(SIGNAL_LEN as u16, LABEL, &digest);

    let mut signal = [0u8; SIGNAL_LEN];
    match hash {
        HandshakeHash::Sha256 => {
            let hk = Hkdf::<Sha256>::from_prk(handshake_secret).expect("handshake_secret has sufficient length");
            hk.expand(&info, &mut signal).expect("8-byte output is within HKDF's max length");
        }
        HandshakeHash::Sha384 => {
            let hk = Hkdf::<Sha384>::from_prk(handshake_secret).expect("handshake_secret has sufficient length");
            hk.expand(&info, &mut signal).expect("8-byte output is within HKDF's max length");
        }
    }
    signal
}

/// Zeroes `random[24..32]` in a copy of a ServerHello body — the shape
/// the transcript in [`compute_signal`] requires, since the real random
/// (containing the eventual signal) can't be part of its own input.
pub fn zero_server_hello_random(server_hello: &[u8], random_start: usize) -> Vec<u8> {
    let mut out = server_hello.to_vec();
    if let Some(slice) = out.get_mut(random_start + 24..random_start + 32) {
        slice.fill(0);
    }
    out
}

/// Writes `signal` into `server_hello[random_start + 24 .. + 32]`.
pub fn write_signal(server_hello: &mut [u8], random_start: usize, signal: &[u8; SIGNAL_LEN]) {
    server_hello[random_start + 24..random_start + 32].copy_from_slice(signal);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_and_server_computations_agree() {
        let handshake_secret = [0x5a; 32];
        let inner_ch = b"inner client hello bytes";
        let sh = vec![0u8; 40];
        let random_start = 2;

        let zeroed = zero_server_hello_random(&sh, random_start);
        let signal = compute_signal(HandshakeHash::Sha256, &handshake_secret, inner_ch, &zeroed);

        let zeroed_again = zero_server_hello_random(&sh, random_start);
        let signal_again = compute_signal(HandshakeHash::Sha256, &handshake_secret, inner_ch, &zeroed_again);

        assert_eq!(signal, signal_again);
    }

    #[test]
    fn different_transcripts_diverge() {
        let handshake_secret = [0x5a; 32];
        let sh = zero_server_hello_random(&vec![1u8; 40], 2);

        let a = compute_signal(HandshakeHash::Sha256, &handshake_secret, b"inner-a", &sh);
        let b = compute_signal(HandshakeHash::Sha256, &handshake_secret, b"inner-b", &sh);
        assert_ne!(a, b);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut sh = vec![0u8; 40];
        let signal = [1, 2, 3, 4, 5, 6, 7, 8];
        write_signal(&mut sh, 2, &signal);
        assert_eq!(&sh[26..34], &signal);
    }
}
