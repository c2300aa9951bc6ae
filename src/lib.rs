//! dnscourier: payload fragmentation over DNS query names
//!
//! Encodes an arbitrary byte payload into a sequence of DNS lookups so data
//! can leave a network that only permits DNS. A payload too large for one
//! query is split across several, each carrying a small header (direction
//! flag, fragment index, session id, checksum) followed by a slice of the
//! payload, re-segmented into legal 63-character labels and terminated by a
//! fixed base domain the resolver will forward upstream.
//!
//! The default query budget of 238 characters is chosen so that the full
//! DNS response still fits a single 512-byte UDP packet, which matters for
//! the embedded clients this format was designed around.
//!
//! ## Quick Start
//!
//! ```rust
//! use dnscourier::{QueryEncoder, SessionId, MAX_QUERY_LEN};
//!
//! # fn main() -> Result<(), dnscourier::CourierError> {
//! let encoder = QueryEncoder::new("tunnel.example.com");
//! let id = SessionId::random();
//!
//! // base32-encode raw bytes, then emit one query name per fragment
//! let queries = encoder.encode_message(&id, b"temperature=21.5", MAX_QUERY_LEN)?;
//! for q in &queries {
//!     // hand q to the system resolver
//!     assert!(q.ends_with(".tunnel.example.com"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Transmission of the produced names, retries for dropped lookups and the
//! authoritative server answering them are the embedding application's
//! concern; this crate only produces and parses the names themselves.

pub mod assembly;
pub mod chunk;
pub mod encoder;
pub mod session;

// Re-export core types
pub use assembly::{MessageBuffer, MessageCache};
pub use chunk::QueryChunk;
pub use encoder::QueryEncoder;
pub use session::SessionId;

/// Default maximum query-name length. Keeps the full DNS response inside a
/// single 512-byte UDP packet.
pub const MAX_QUERY_LEN: usize = 238;

/// Maximum characters per DNS label (RFC 1035).
pub const MAX_LABEL_LEN: usize = 63;

/// Fixed header overhead per query:
/// 1 flag byte + 1 index byte + 13 id bytes + 1 checksum byte.
pub const HEADER_LEN: usize = 16;

/// Length of the session id carried in every query header.
pub const SESSION_ID_LEN: usize = 13;

/// A session carries at most this many fragments, bounded by the
/// single-character index encoding.
pub const MAX_QUERIES_PER_SESSION: usize = 32;

/// RFC 4648 base32 alphabet. Indexed by fragment number for the header's
/// index byte and by the folded checksum value for the checksum byte.
pub const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// dnscourier error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CourierError {
    /// Base domain leaves no payload room at the requested query length
    #[error("domain '{domain}' plus header overhead leaves no payload space at query length {max_query_len}")]
    DomainTooLong { domain: String, max_query_len: usize },

    /// Fragment index past the 32-fragment session ceiling
    #[error("fragment index {0} exceeds the 32-query session limit")]
    IndexOutOfRange(usize),

    /// Payload needs more fragments than one session can carry
    #[error("payload of {len} bytes needs {queries} queries, more than the 32 a session can carry")]
    PayloadTooLarge { len: usize, queries: usize },

    /// Session id is not exactly 13 characters
    #[error("session id must be exactly 13 characters, got {0}")]
    SessionIdLength(usize),

    /// Session id contains a character outside the base32 alphabet
    #[error("session id character '{0}' is outside the base32 alphabet")]
    SessionIdChar(char),

    /// Payload byte that cannot legally appear in a DNS label
    #[error("payload byte {byte:#04x} at offset {offset} is not DNS-label-safe")]
    PayloadNotDnsSafe { byte: u8, offset: usize },

    /// Caller-supplied output buffer cannot hold the query plus terminator
    #[error("output buffer of {have} bytes too small for query of {need} bytes (incl. terminator)")]
    BufferTooSmall { need: usize, have: usize },

    /// Received query does not end in the expected base domain
    #[error("query name does not end with the tunnel base domain")]
    DomainMismatch,

    /// Received query shorter than the 16-byte header
    #[error("query name too short to hold a header")]
    TruncatedHeader,

    /// Received query's direction flag is neither 'A' nor 'B'
    #[error("unknown direction flag '{0}'")]
    BadFlag(char),

    /// Received query's index byte is not a base32 alphabet character
    #[error("cannot decode fragment index character '{0}'")]
    BadIndexChar(char),

    /// Received query's header fails checksum verification
    #[error("header checksum mismatch")]
    ChecksumMismatch,
}

pub type Result<T> = std::result::Result<T, CourierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_is_rfc4648() {
        assert_eq!(BASE32_ALPHABET.len(), 32);
        assert_eq!(BASE32_ALPHABET[0], b'A');
        assert_eq!(BASE32_ALPHABET[25], b'Z');
        assert_eq!(BASE32_ALPHABET[26], b'2');
        assert_eq!(BASE32_ALPHABET[31], b'7');
    }

    #[test]
    fn test_header_accounts_for_all_fields() {
        assert_eq!(HEADER_LEN, 1 + 1 + SESSION_ID_LEN + 1);
    }
}
