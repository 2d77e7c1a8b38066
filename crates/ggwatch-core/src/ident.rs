//! Parsing of map codes and creator names typed or pasted by users.
//!
//! Accepted forms:
//! - map: `1234-5678-9012` or `https://fortnite.gg/island?code=1234-5678-9012`
//! - creator: `https://fortnite.gg/creator?name=foo` or a bare name
//!   of 2..=32 characters from `[A-Za-z0-9_.-]`

use crate::error::CoreError;
use crate::types::TargetRef;

const ISLAND_URL_MARKER: &str = "fortnite.gg/island?";
const CREATOR_URL_MARKER: &str = "fortnite.gg/creator?";

/// `dddd-dddd-dddd`.
pub fn is_map_code(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 3
        && groups
            .iter()
            .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_digit()))
}

pub fn is_creator_name(s: &str) -> bool {
    (2..=32).contains(&s.len())
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Extract a decoded query parameter from a URL-ish string.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then(|| percent_decode(v))
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                out.push((hex_val(bytes[i + 1]) << 4) | hex_val(bytes[i + 2]));
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// Resolve a map identifier (code or island URL) to its code.
pub fn parse_map(input: &str) -> Result<String, CoreError> {
    let input = input.trim();
    if input.contains("code=") {
        if let Some(code) = query_param(input, "code") {
            return Ok(code);
        }
    }
    if is_map_code(input) {
        return Ok(input.to_string());
    }
    Err(CoreError::InvalidIdentifier(input.to_string()))
}

/// Resolve a creator identifier (name or creator URL) to its name.
pub fn parse_creator(input: &str) -> Result<String, CoreError> {
    let input = input.trim();
    if input.starts_with("http") || input.contains(CREATOR_URL_MARKER) {
        return query_param(input, "name")
            .ok_or_else(|| CoreError::InvalidIdentifier(input.to_string()));
    }
    if is_creator_name(input) {
        return Ok(input.to_string());
    }
    Err(CoreError::InvalidIdentifier(input.to_string()))
}

/// Route free text to a target, the way a pasted link or code is handled.
///
/// Island links and codes win over creator names, so `1234-5678-9012`
/// resolves to a map even though it is also a valid creator name.
pub fn classify_text(input: &str) -> Option<TargetRef> {
    let t = input.trim();
    if t.contains(ISLAND_URL_MARKER) || is_map_code(t) {
        return parse_map(t).ok().map(TargetRef::map);
    }
    if t.contains(CREATOR_URL_MARKER) || is_creator_name(t) {
        return parse_creator(t).ok().map(TargetRef::creator);
    }
    None
}
