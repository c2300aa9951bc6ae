//! Parsing received query names back into fragments.
//!
//! The server side of the tunnel: given the question name of an incoming
//! lookup, strip the base domain and separator dots, validate the 16-byte
//! header and hand back the fragment's payload text.

use log::debug;

use crate::encoder::fold;
use crate::{CourierError, Result, SessionId, BASE32_ALPHABET, HEADER_LEN, SESSION_ID_LEN};

/// One received fragment of a session's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryChunk {
    /// Session the fragment belongs to
    pub id: SessionId,
    /// Fragment position within the session (0-31)
    pub index: u8,
    /// Whether this fragment's slice reaches the end of the payload
    pub last: bool,
    /// Payload text carried by this fragment, dots removed, uppercased
    pub content: String,
}

impl QueryChunk {
    /// Parse a question name received for `domain`.
    ///
    /// Resolvers may lowercase names in flight, so parsing is
    /// case-insensitive throughout.
    ///
    /// # Errors
    ///
    /// Fails when the name does not end in `domain`, is shorter than the
    /// header, carries an unknown flag or index character, or fails
    /// checksum verification.
    pub fn parse(raw_question: &str, domain: &str) -> Result<Self> {
        // Question names are ASCII by definition; anything else cannot
        // match the domain suffix and must not panic the slicing below.
        if !raw_question.is_ascii() {
            return Err(CourierError::DomainMismatch);
        }
        let suffix = format!(".{}", domain);
        if raw_question.len() <= suffix.len()
            || !raw_question[raw_question.len() - suffix.len()..].eq_ignore_ascii_case(&suffix)
        {
            return Err(CourierError::DomainMismatch);
        }
        let prefix = &raw_question[..raw_question.len() - suffix.len()];

        let flat: String = prefix
            .chars()
            .filter(|c| *c != '.')
            .collect::<String>()
            .to_ascii_uppercase();
        if flat.len() < HEADER_LEN {
            return Err(CourierError::TruncatedHeader);
        }
        let header = &flat.as_bytes()[..HEADER_LEN];

        let last = match header[0] {
            b'A' => false,
            b'B' => true,
            other => return Err(CourierError::BadFlag(other as char)),
        };

        let index = BASE32_ALPHABET
            .iter()
            .position(|c| *c == header[1])
            .ok_or(CourierError::BadIndexChar(header[1] as char))? as u8;

        // XOR-fold all 16 header characters; a correct checksum character
        // cancels the preamble back to zero. Anything outside the alphabet
        // cannot have been emitted by a well-formed sender.
        let mut check = 0u8;
        for &b in header {
            if !matches!(b, b'A'..=b'Z' | b'2'..=b'7') {
                return Err(CourierError::ChecksumMismatch);
            }
            check ^= fold(b);
        }
        if check != 0 {
            return Err(CourierError::ChecksumMismatch);
        }

        let id = SessionId::new(&flat[2..2 + SESSION_ID_LEN])?;
        let content = flat[HEADER_LEN..].to_string();
        debug!(
            "parsed fragment {} of session {}: {} payload chars{}",
            index,
            id,
            content.len(),
            if last { " (last)" } else { "" }
        );

        Ok(Self {
            id,
            index,
            last,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryEncoder, MAX_QUERY_LEN};

    #[test]
    fn test_parse_golden_query() {
        let chunk = QueryChunk::parse("BAABCDEFGHIJKLMNHELLOWORLD.t.io", "t.io").unwrap();
        assert_eq!(chunk.id.as_str(), "ABCDEFGHIJKLM");
        assert_eq!(chunk.index, 0);
        assert!(chunk.last);
        assert_eq!(chunk.content, "HELLOWORLD");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let chunk = QueryChunk::parse("baabcdefghijklmnhelloworld.T.IO", "t.io").unwrap();
        assert_eq!(chunk.content, "HELLOWORLD");
        assert!(chunk.last);
    }

    #[test]
    fn test_parse_multi_label_query() {
        let enc = QueryEncoder::new("tunnel.example.com");
        let id = SessionId::new("ABCDEFGHIJKLM").unwrap();
        let payload = vec![b'K'; 200];
        let query = enc
            .build_query(0, &id, &payload, MAX_QUERY_LEN)
            .unwrap()
            .unwrap();
        assert!(query.matches('.').count() > 3, "payload spans labels");

        let chunk = QueryChunk::parse(&query, "tunnel.example.com").unwrap();
        assert_eq!(chunk.index, 0);
        assert!(chunk.last);
        assert_eq!(chunk.content.as_bytes(), &payload[..]);
    }

    #[test]
    fn test_wrong_domain_rejected() {
        let err = QueryChunk::parse("BAABCDEFGHIJKLMNHELLOWORLD.t.io", "example.com").unwrap_err();
        assert_eq!(err, CourierError::DomainMismatch);
    }

    #[test]
    fn test_truncated_header_rejected() {
        let err = QueryChunk::parse("BAAB.t.io", "t.io").unwrap_err();
        assert_eq!(err, CourierError::TruncatedHeader);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = QueryChunk::parse("CAABCDEFGHIJKLMNHELLOWORLD.t.io", "t.io").unwrap_err();
        assert_eq!(err, CourierError::BadFlag('C'));
    }

    #[test]
    fn test_corrupted_header_fails_checksum() {
        // One id character flipped relative to the golden query
        let err = QueryChunk::parse("BAABCDEFGHIJKLZNHELLOWORLD.t.io", "t.io").unwrap_err();
        assert_eq!(err, CourierError::ChecksumMismatch);

        // Flag flipped: still a legal flag, but the checksum no longer folds
        let err = QueryChunk::parse("AAABCDEFGHIJKLMNHELLOWORLD.t.io", "t.io").unwrap_err();
        assert_eq!(err, CourierError::ChecksumMismatch);
    }

    #[test]
    fn test_every_built_query_parses_back() {
        let enc = QueryEncoder::new("t.io");
        let id = SessionId::new("Z6Z6Z6Z6Z6Z6Z").unwrap();
        let payload = vec![b'T'; 75];
        let count = enc.query_count(&payload, 40).unwrap();

        for i in 0..count {
            let q = enc.build_query(i, &id, &payload, 40).unwrap().unwrap();
            let chunk = QueryChunk::parse(&q, "t.io").unwrap();
            assert_eq!(chunk.id, id);
            assert_eq!(chunk.index as usize, i);
            assert_eq!(chunk.last, i == count - 1);
        }
    }
}
