//! Query-name encoder
//!
//! Splits a payload into DNS query names of the form
//! `<header+payload labels>.<base-domain>`, one name per fragment. The
//! 16-byte header is `[flag][index][13-byte session id][checksum]`; the
//! flag is `'A'` while more fragments follow and `'B'` on the fragment
//! whose slice reaches the end of the payload.

use data_encoding::BASE32_NOPAD;
use log::debug;

use crate::{
    CourierError, Result, SessionId, BASE32_ALPHABET, HEADER_LEN, MAX_LABEL_LEN,
    MAX_QUERIES_PER_SESSION,
};

/// Encoder for one tunnel endpoint
pub struct QueryEncoder {
    /// Base domain every query terminates in (e.g. "tunnel.example.com")
    base_domain: String,
}

impl QueryEncoder {
    /// Create an encoder for the given base domain.
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
        }
    }

    /// The base domain this encoder appends to every query.
    pub fn domain(&self) -> &str {
        &self.base_domain
    }

    /// Payload bytes that fit in one query of `max_query_len` characters.
    ///
    /// Starts from `raw - ceil(raw / 63)` (one separator dot per label slice
    /// of the raw budget), then clamps so that header, payload, one dot per
    /// label and the base domain never exceed `max_query_len`. The clamp
    /// matters because the header shares the first label's 63-character
    /// budget and a dot always precedes the base domain.
    ///
    /// # Errors
    ///
    /// Returns [`CourierError::DomainTooLong`] when the domain plus header
    /// overhead leaves no payload room at all. Callers must treat that as a
    /// fatal configuration error, not a per-query condition.
    pub fn capacity(&self, max_query_len: usize) -> Result<usize> {
        let overhead = self.base_domain.len() + HEADER_LEN;
        if max_query_len <= overhead {
            return Err(CourierError::DomainTooLong {
                domain: self.base_domain.clone(),
                max_query_len,
            });
        }

        let raw = max_query_len - overhead;
        let mut cap = raw - raw.div_ceil(MAX_LABEL_LEN);
        while cap > 0 && cap + (HEADER_LEN + cap).div_ceil(MAX_LABEL_LEN) > raw {
            cap -= 1;
        }

        if cap == 0 {
            return Err(CourierError::DomainTooLong {
                domain: self.base_domain.clone(),
                max_query_len,
            });
        }
        Ok(cap)
    }

    /// Number of queries needed to carry `payload`.
    ///
    /// Zero for an empty payload; the caller should send nothing rather
    /// than invoke the builder.
    ///
    /// # Errors
    ///
    /// Fails on non-positive capacity, or when the payload would need more
    /// fragments than the 32 a session's index byte can express.
    pub fn query_count(&self, payload: &[u8], max_query_len: usize) -> Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        let cap = self.capacity(max_query_len)?;
        let queries = payload.len().div_ceil(cap);
        if queries > MAX_QUERIES_PER_SESSION {
            return Err(CourierError::PayloadTooLarge {
                len: payload.len(),
                queries,
            });
        }
        Ok(queries)
    }

    /// Build the query name for fragment `index`, or `None` once the
    /// payload is exhausted.
    ///
    /// Callers loop from index 0 until `Ok(None)`; the `None` is the normal
    /// end-of-stream signal, not an error.
    ///
    /// # Errors
    ///
    /// Fails on non-positive capacity, `index` >= 32, or payload bytes that
    /// cannot appear in a DNS label (anything outside `[A-Za-z0-9-]`;
    /// base32 text is always safe).
    pub fn build_query(
        &self,
        index: usize,
        id: &SessionId,
        payload: &[u8],
        max_query_len: usize,
    ) -> Result<Option<String>> {
        if index >= MAX_QUERIES_PER_SESSION {
            return Err(CourierError::IndexOutOfRange(index));
        }

        let cap = self.capacity(max_query_len)?;
        let start = index * cap;
        if start >= payload.len() {
            // Nothing left for this index
            return Ok(None);
        }

        let end = (start + cap).min(payload.len());
        let last = end == payload.len();
        let slice = &payload[start..end];

        if let Some(off) = slice.iter().position(|b| !is_label_safe(*b)) {
            return Err(CourierError::PayloadNotDnsSafe {
                byte: slice[off],
                offset: start + off,
            });
        }

        let mut name = String::with_capacity(max_query_len);
        name.push(if last { 'B' } else { 'A' });
        name.push(BASE32_ALPHABET[index] as char);
        name.push_str(id.as_str());
        let check = checksum(name.as_bytes());
        name.push(check as char);

        // Re-segment into labels: a dot goes in whenever the count of
        // non-dot characters reaches a multiple of 63, so the header
        // consumes the first 16 characters of the first label's budget.
        let mut written = HEADER_LEN;
        for &b in slice {
            if written % MAX_LABEL_LEN == 0 {
                name.push('.');
            }
            name.push(b as char);
            written += 1;
        }

        name.push('.');
        name.push_str(&self.base_domain);
        debug_assert!(name.len() <= max_query_len);

        debug!(
            "session {} fragment {}: {} payload bytes in {} chars{}",
            id,
            index,
            slice.len(),
            name.len(),
            if last { " (last)" } else { "" }
        );
        Ok(Some(name))
    }

    /// Build fragment `index` into a caller-supplied buffer, NUL-terminated
    /// for handoff to C resolver APIs.
    ///
    /// Returns the number of bytes written including the terminator, or
    /// `None` once the payload is exhausted. Never writes past `out`;
    /// a buffer shorter than the query plus one terminator slot yields
    /// [`CourierError::BufferTooSmall`].
    pub fn write_query(
        &self,
        index: usize,
        id: &SessionId,
        payload: &[u8],
        max_query_len: usize,
        out: &mut [u8],
    ) -> Result<Option<usize>> {
        let name = match self.build_query(index, id, payload, max_query_len)? {
            Some(name) => name,
            None => return Ok(None),
        };

        let need = name.len() + 1;
        if out.len() < need {
            return Err(CourierError::BufferTooSmall {
                need,
                have: out.len(),
            });
        }
        out[..name.len()].copy_from_slice(name.as_bytes());
        out[name.len()] = 0;
        Ok(Some(need))
    }

    /// Base32-encode raw bytes into DNS-safe payload text (RFC 4648, no
    /// padding — '=' cannot appear in a label).
    pub fn encode_payload(raw: &[u8]) -> String {
        BASE32_NOPAD.encode(raw)
    }

    /// Encode raw bytes and emit the full query sequence for one session.
    pub fn encode_message(
        &self,
        id: &SessionId,
        raw: &[u8],
        max_query_len: usize,
    ) -> Result<Vec<String>> {
        let text = Self::encode_payload(raw);
        let count = self.query_count(text.as_bytes(), max_query_len)?;

        let mut queries = Vec::with_capacity(count);
        for index in 0..count {
            match self.build_query(index, id, text.as_bytes(), max_query_len)? {
                Some(query) => queries.push(query),
                None => break,
            }
        }
        Ok(queries)
    }
}

/// Single-character checksum over the header preamble (flag, index and id
/// bytes — 15 in total).
///
/// Each byte folds to its base32 alphabet position (letters of either case
/// to 0-25, digits '2'-'7' to 26-31); the XOR of the folded values indexes
/// the alphabet. A heuristic guard against single-character corruption, in
/// no sense tamper-proof.
pub fn checksum(preamble: &[u8]) -> u8 {
    let mut check = 0u8;
    for &b in preamble {
        check ^= fold(b);
    }
    // Mask keeps the lookup in-table even for non-alphabet input bytes
    BASE32_ALPHABET[(check & 0x1F) as usize]
}

/// Fold a header byte to its checksum value. Bytes outside the alphabet
/// pass through unmapped; the public API never produces them.
pub(crate) fn fold(b: u8) -> u8 {
    match b {
        b'A'..=b'Z' | b'a'..=b'z' => (b & 0x1F) - 1,
        b'2'..=b'7' => b - 0x18,
        _ => b,
    }
}

fn is_label_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}
