#![forbid(unsafe_code)]

//! Binary onion frame codec (`SPEC_FULL.md` §3, §4.B).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! key_size:u32 | address_size:u32 | content_size:u32 |
//! wrapped_key[key_size] | nonce[16] | address[address_size] | ciphertext[content_size]
//! ```
//!
//! Pure function of bytes, no allocation of unrelated state, no I/O.

use thiserror::Error;

/// Nonce width fixed by the wire format (§3): 16 bytes, tied to the session
/// key by the symmetric cipher mode.
pub const NONCE_SIZE: usize = 16;

const LENGTH_PREFIX_SIZE: usize = 4;
const HEADER_SIZE: usize = 3 * LENGTH_PREFIX_SIZE;

/// The address literal that marks "no further hop" (a response wrapper, or
/// the last hop's return frame).
pub const TERMINATOR_ADDRESS: &str = "none:0000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short to contain a header: got {0} bytes, need at least {HEADER_SIZE}")]
    TooShort(usize),

    #[error("nonce field must be exactly {NONCE_SIZE} bytes")]
    WrongNonceSize,

    #[error("address field must be at least 1 byte")]
    EmptyAddress,

    #[error(
        "frame length mismatch: header declares {declared} bytes total, buffer has {actual}"
    )]
    LengthMismatch { declared: usize, actual: usize },

    #[error("address is not valid ASCII")]
    NonAsciiAddress,
}

/// One decoded onion frame (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnionFrame {
    pub wrapped_key: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub address: String,
    pub ciphertext: Vec<u8>,
}

impl OnionFrame {
    pub fn new(
        wrapped_key: Vec<u8>,
        nonce: [u8; NONCE_SIZE],
        address: impl Into<String>,
        ciphertext: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let address = address.into();
        if address.is_empty() {
            return Err(FrameError::EmptyAddress);
        }
        if !address.is_ascii() {
            return Err(FrameError::NonAsciiAddress);
        }
        Ok(Self {
            wrapped_key,
            nonce,
            address,
            ciphertext,
        })
    }

    /// A frame whose address is the `none:0000` terminator (§3).
    pub fn terminal(wrapped_key: Vec<u8>, nonce: [u8; NONCE_SIZE], ciphertext: Vec<u8>) -> Self {
        Self {
            wrapped_key,
            nonce,
            address: TERMINATOR_ADDRESS.to_string(),
            ciphertext,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.address == TERMINATOR_ADDRESS
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(&self.wrapped_key, &self.nonce, &self.address, &self.ciphertext)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        decode(bytes)
    }
}

/// Concatenate fields per §3. Address is ASCII; no length-prefix escaping.
pub fn encode(wrapped_key: &[u8], nonce: &[u8; NONCE_SIZE], address: &str, ciphertext: &[u8]) -> Vec<u8> {
    let ks = wrapped_key.len() as u32;
    let as_ = address.len() as u32;
    let cs = ciphertext.len() as u32;

    let mut out = Vec::with_capacity(HEADER_SIZE + wrapped_key.len() + NONCE_SIZE + address.len() + ciphertext.len());
    out.extend_from_slice(&ks.to_be_bytes());
    out.extend_from_slice(&as_.to_be_bytes());
    out.extend_from_slice(&cs.to_be_bytes());
    out.extend_from_slice(wrapped_key);
    out.extend_from_slice(nonce);
    out.extend_from_slice(address.as_bytes());
    out.extend_from_slice(ciphertext);
    out
}

/// Read the three 4-byte big-endian lengths, slice in order, verify buffer
/// length equals `28+ks+as+cs`.
pub fn decode(bytes: &[u8]) -> Result<OnionFrame, FrameError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FrameError::TooShort(bytes.len()));
    }

    let ks = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let as_ = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let cs = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;

    if as_ == 0 {
        return Err(FrameError::EmptyAddress);
    }

    let declared_total = HEADER_SIZE
        .checked_add(ks)
        .and_then(|n| n.checked_add(NONCE_SIZE))
        .and_then(|n| n.checked_add(as_))
        .and_then(|n| n.checked_add(cs))
        .ok_or(FrameError::LengthMismatch {
            declared: usize::MAX,
            actual: bytes.len(),
        })?;

    if declared_total != bytes.len() {
        return Err(FrameError::LengthMismatch {
            declared: declared_total,
            actual: bytes.len(),
        });
    }

    let key_start = HEADER_SIZE;
    let nonce_start = key_start + ks;
    let addr_start = nonce_start + NONCE_SIZE;
    let content_start = addr_start + as_;

    let wrapped_key = bytes[key_start..nonce_start].to_vec();

    let nonce: [u8; NONCE_SIZE] = bytes[nonce_start..addr_start]
        .try_into()
        .map_err(|_| FrameError::WrongNonceSize)?;

    let address_bytes = &bytes[addr_start..content_start];
    if !address_bytes.is_ascii() {
        return Err(FrameError::NonAsciiAddress);
    }
    let address = String::from_utf8_lossy(address_bytes).into_owned();

    let ciphertext = bytes[content_start..].to_vec();

    Ok(OnionFrame {
        wrapped_key,
        nonce,
        address,
        ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_nonce() -> [u8; NONCE_SIZE] {
        [7u8; NONCE_SIZE]
    }

    #[test]
    fn round_trip_basic() {
        let frame = OnionFrame::new(
            vec![1, 2, 3, 4],
            sample_nonce(),
            "https://node-014.example:8443",
            b"hello onion".to_vec(),
        )
        .unwrap();

        let bytes = frame.encode();
        let decoded = OnionFrame::decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn terminal_address_round_trips() {
        let frame = OnionFrame::terminal(vec![9; 256], sample_nonce(), b"response bytes".to_vec());
        assert!(frame.is_terminal());
        let decoded = OnionFrame::decode(&frame.encode()).unwrap();
        assert!(decoded.is_terminal());
    }

    #[test]
    fn empty_ciphertext_decodes() {
        let frame = OnionFrame::new(vec![1; 256], sample_nonce(), TERMINATOR_ADDRESS, vec![]).unwrap();
        let decoded = OnionFrame::decode(&frame.encode()).unwrap();
        assert!(decoded.ciphertext.is_empty());
    }

    #[test]
    fn rejects_truncated_buffer() {
        let frame = OnionFrame::new(vec![1; 256], sample_nonce(), "none:0000", vec![1, 2, 3]).unwrap();
        let mut bytes = frame.encode();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(OnionFrame::decode(&bytes), Err(FrameError::LengthMismatch { .. })));
    }

    #[test]
    fn rejects_short_header() {
        assert_eq!(OnionFrame::decode(&[0u8; 4]), Err(FrameError::TooShort(4)));
    }

    #[test]
    fn rejects_zero_length_address() {
        let ks = 0u32.to_be_bytes();
        let as_ = 0u32.to_be_bytes();
        let cs = 0u32.to_be_bytes();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ks);
        bytes.extend_from_slice(&as_);
        bytes.extend_from_slice(&cs);
        assert_eq!(OnionFrame::decode(&bytes), Err(FrameError::EmptyAddress));
    }

    #[test]
    fn altered_content_size_is_rejected() {
        let frame = OnionFrame::new(vec![1; 256], sample_nonce(), "none:0000", vec![1, 2, 3, 4]).unwrap();
        let mut bytes = frame.encode();
        // Corrupt the content_size field (bytes 8..12) to claim one byte more
        // than is actually present (§8 S6).
        let corrupted = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) + 1;
        bytes[8..12].copy_from_slice(&corrupted.to_be_bytes());
        assert!(matches!(OnionFrame::decode(&bytes), Err(FrameError::LengthMismatch { .. })));
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            key in proptest::collection::vec(any::<u8>(), 0..300),
            nonce in any::<[u8; NONCE_SIZE]>(),
            address in "[a-zA-Z0-9:/.]{1,64}",
            content in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let frame = OnionFrame::new(key, nonce, address, content).unwrap();
            let bytes = frame.encode();
            let decoded = OnionFrame::decode(&bytes).unwrap();
            prop_assert_eq!(frame, decoded);
        }
    }
}
