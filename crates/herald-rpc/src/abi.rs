//! Minimal ABI codec
//!
//! Covers exactly what the message board needs: calls taking no argument or
//! one `string`, a `string` return value, and `Error(string)` revert data.

use thiserror::Error;

/// ABI word size in bytes
pub const WORD: usize = 32;

/// `getMessage()`
pub const GET_MESSAGE_SELECTOR: [u8; 4] = [0xce, 0x6d, 0x41, 0xde];

/// `setMessage(string)`
pub const SET_MESSAGE_SELECTOR: [u8; 4] = [0x36, 0x8b, 0x87, 0x72];

/// `Error(string)`, the standard revert payload
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("empty return data")]
    Empty,

    #[error("data truncated: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("word out of range at byte {0}")]
    Overflow(usize),

    #[error("string is not valid UTF-8")]
    Utf8,

    #[error("selector must be 4 bytes: {0}")]
    Selector(String),
}

/// Parse `0x`-prefixed hex into bytes
pub fn decode_hex(data: &str) -> Result<Vec<u8>, AbiError> {
    let digits = data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
        .unwrap_or(data);
    hex::decode(digits).map_err(|e| AbiError::Hex(e.to_string()))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn parse_selector(s: &str) -> Result<[u8; 4], AbiError> {
    let bytes = decode_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| AbiError::Selector(s.to_string()))
}

/// Calldata for a function without arguments
pub fn encode_call(selector: [u8; 4]) -> String {
    encode_hex(&selector)
}

/// Calldata for a function taking one `string`
pub fn encode_string_call(selector: [u8; 4], value: &str) -> String {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(4 + 2 * WORD + padded);
    out.extend_from_slice(&selector);
    out.extend_from_slice(&word(WORD as u64));
    out.extend_from_slice(&word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(4 + 2 * WORD + padded, 0);

    encode_hex(&out)
}

/// Decode a `string` return value
pub fn decode_string(data: &str) -> Result<String, AbiError> {
    let bytes = decode_hex(data)?;
    if bytes.is_empty() {
        return Err(AbiError::Empty);
    }
    decode_string_bytes(&bytes)
}

/// Extract the message from `Error(string)` revert data
pub fn decode_revert_reason(data: &str) -> Option<String> {
    let bytes = decode_hex(data).ok()?;
    let body = bytes.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    decode_string_bytes(body).ok()
}

fn decode_string_bytes(bytes: &[u8]) -> Result<String, AbiError> {
    let offset = read_word(bytes, 0)?;
    let len = read_word(bytes, offset)?;
    let start = offset + WORD;
    let end = start
        .checked_add(len)
        .ok_or(AbiError::Overflow(offset))?;

    let raw = bytes.get(start..end).ok_or(AbiError::Truncated {
        needed: end,
        have: bytes.len(),
    })?;
    String::from_utf8(raw.to_vec()).map_err(|_| AbiError::Utf8)
}

fn word(value: u64) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Read a word that must fit in usize
fn read_word(bytes: &[u8], at: usize) -> Result<usize, AbiError> {
    let end = at.checked_add(WORD).ok_or(AbiError::Overflow(at))?;
    let w = bytes.get(at..end).ok_or(AbiError::Truncated {
        needed: end,
        have: bytes.len(),
    })?;

    if w[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(AbiError::Overflow(at));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&w[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(low)).map_err(|_| AbiError::Overflow(at))
}
