//! Opaque pagination cursors
//!
//! A cursor token is a URL-safe string that round-trips a small serializable
//! position record. Tokens are stable across restarts (no in-memory state) and
//! are not a security boundary: they only need to be opaque and to reject
//! anything this module did not produce.
//!
//! ## Token layout
//!
//! ```text
//! base64url( version:u8 | masked(json payload) | crc32(payload):u32be )
//! ```
//!
//! The payload is masked with a keystream derived from its own checksum, so
//! consecutive offsets do not produce visibly sequential tokens. Any altered
//! byte breaks the checksum and decoding fails with `CorruptCursor`; a decode
//! failure never silently resumes from the first page.
//!
//! ## Paging contract
//!
//! A list call requests `page_size` rows. When exactly `page_size` rows come
//! back, a next-page token for `offset + page_size` is emitted; fewer rows
//! means the listing is complete. A result set whose size is a multiple of
//! `page_size` therefore ends with one empty page.

use crate::error::{Error, Result};
use crate::value::Value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Token format version
pub const CURSOR_VERSION: u8 = 1;

const CHECKSUM_LEN: usize = 4;

/// Position of an offset-paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetCursor {
    /// Rows to skip
    pub offset: u64,
}

impl OffsetCursor {
    /// Cursor at the given offset
    pub fn new(offset: u64) -> Self {
        Self { offset }
    }
}

/// Position of a keyset-paginated listing: the last row's sort value and id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysetCursor {
    /// Sort column value of the last row returned
    pub last_sort_value: Value,
    /// Tie-breaking id of the last row returned
    pub last_id: String,
}

fn mask(payload: &mut [u8], checksum: u32) {
    let seed = checksum.to_be_bytes();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= seed[i % seed.len()] ^ (i as u8).wrapping_mul(0x9d);
    }
}

/// Encode a position record into an opaque token
///
/// # Errors
///
/// Returns `InvalidInput` if the position does not serialize.
pub fn encode_cursor<T: Serialize>(position: &T) -> Result<String> {
    let mut payload = serde_json::to_vec(position)
        .map_err(|e| Error::invalid_input(format!("cursor position does not serialize: {}", e)))?;
    let checksum = crc32fast::hash(&payload);
    mask(&mut payload, checksum);

    let mut raw = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    raw.push(CURSOR_VERSION);
    raw.extend_from_slice(&payload);
    raw.extend_from_slice(&checksum.to_be_bytes());
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

/// Decode a token produced by [`encode_cursor`]
///
/// # Errors
///
/// Returns `CorruptCursor` for foreign, truncated or altered tokens.
pub fn decode_cursor<T: DeserializeOwned>(token: &str) -> Result<T> {
    let raw = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|e| Error::corrupt_cursor(format!("not a cursor token: {}", e)))?;
    if raw.len() < 1 + CHECKSUM_LEN {
        return Err(Error::corrupt_cursor("token too short"));
    }
    if raw[0] != CURSOR_VERSION {
        return Err(Error::corrupt_cursor(format!(
            "unsupported cursor version {}",
            raw[0]
        )));
    }

    let (body, checksum_bytes) = raw[1..].split_at(raw.len() - 1 - CHECKSUM_LEN);
    let mut checksum_arr = [0u8; CHECKSUM_LEN];
    checksum_arr.copy_from_slice(checksum_bytes);
    let checksum = u32::from_be_bytes(checksum_arr);

    let mut payload = body.to_vec();
    mask(&mut payload, checksum);
    if crc32fast::hash(&payload) != checksum {
        return Err(Error::corrupt_cursor("checksum mismatch"));
    }
    serde_json::from_slice(&payload)
        .map_err(|e| Error::corrupt_cursor(format!("cursor payload does not decode: {}", e)))
}

/// Page size plus optional continuation token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Rows requested per page (at least 1)
    pub page_size: usize,
    /// Token returned by the previous page
    pub page_token: Option<String>,
}

impl PageRequest {
    /// First page of the given size
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page_token: None,
        }
    }

    /// Continue from a previous page's token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    /// Decode the offset position this request resumes from
    ///
    /// # Errors
    ///
    /// Returns `CorruptCursor` if the token is invalid.
    pub fn offset_cursor(&self) -> Result<OffsetCursor> {
        match &self.page_token {
            Some(token) => decode_cursor(token),
            None => Ok(OffsetCursor::default()),
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Token for the next page; `None` when the listing is complete
    pub next_page_token: Option<String>,
}

/// Next-page token for an offset listing
///
/// Emitted only when the page came back full.
///
/// # Errors
///
/// Returns an error if the cursor does not serialize.
pub fn next_offset_token(
    current: OffsetCursor,
    page_size: usize,
    rows_returned: usize,
) -> Result<Option<String>> {
    if rows_returned < page_size {
        return Ok(None);
    }
    let next = OffsetCursor::new(current.offset + page_size as u64);
    encode_cursor(&next).map(Some)
}
