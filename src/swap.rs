//! Swap & Finalize (§4.I).
//!
//! Re-architected per the design notes as a single tagged enum rather
//! than aliasing pointers between an "outer" and "inner" ClientHello:
//! the only thing a session needs after a successful decrypt is which
//! ClientHello bytes and which SNI now govern the handshake.

/// Which ClientHello currently governs a session's transcript and
/// server-name processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChState {
    /// No successful ECH decrypt occurred (absent or GREASE); the
    /// outer CH governs, and `name` is the outer/`public_name` SNI.
    Outer { client_hello: Vec<u8>, name: Option<String> },
    /// A successful decrypt occurred; the inner CH governs, and `name`
    /// is the real (inner) SNI.
    Inner { client_hello: Vec<u8>, name: Option<String> },
}

impl ChState {
    /// The ClientHello bytes that should drive the rest of the
    /// handshake and transcript hashing.
    pub fn client_hello(&self) -> &[u8] {
        match self {
            Self::Outer { client_hello, .. } | Self::Inner { client_hello, .. } => client_hello,
        }
    }

    /// The SNI that should drive certificate selection and the
    /// server-name callback.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Outer { name, .. } | Self::Inner { name, .. } => name.as_deref(),
        }
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner { .. })
    }
}

/// Outcome flags fired alongside a swap, mirroring the `attempted`/
/// `success`/`done`/`grease` bookkeeping a caller's user callback needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapFlags {
    pub attempted: bool,
    pub success: bool,
    pub done: bool,
    pub grease: bool,
}

impl SwapFlags {
    pub const NOT_OFFERED: Self = Self { attempted: false, success: false, done: true, grease: false };
    pub const GREASED: Self = Self { attempted: true, success: false, done: true, grease: true };
    pub const ACCEPTED: Self = Self { attempted: true, success: true, done: true, grease: false };
}

/// Promotes a session from [`ChState::Outer`] to [`ChState::Inner`] after
/// a successful decrypt, replacing the transcript with the inner CH
/// bytes (optionally followed by bytes already received after the outer
/// CH record) and the governing name with the true (inner) SNI.
pub fn swap_to_inner(inner_client_hello: Vec<u8>, inner_name: Option<String>, trailing_bytes: &[u8]) -> ChState {
    let mut client_hello = inner_client_hello;
    client_hello.extend_from_slice(trailing_bytes);
    ChState::Inner { client_hello, name: inner_name }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn swap_replaces_transcript_and_name() {
        let state = swap_to_inner(b"inner ch".to_vec(), Some("secret.example".to_string()), b"-trailing");
        assert!(state.is_inner());
        assert_eq!(state.client_hello(), b"inner ch-trailing");
        assert_eq!(state.name(), Some("secret.example"));
    }

    #[test]
    fn outer_state_exposes_public_name() {
        let state = ChState::Outer { client_hello: b"outer ch".to_vec(), name: Some("public.example".to_string()) };
        assert!(!state.is_inner());
        assert_eq!(state.name(), Some("public.example"));
    }
}
