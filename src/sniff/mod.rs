//! First-chunk byte sniffing.
//!
//! # Responsibilities
//! - Extract a session id token from the first bytes of a connection
//! - Detect WebSocket upgrade requests
//! - Detect plain HTTP requests whose body may span several chunks
//!
//! # Design Decisions
//! - Pure functions over the raw buffer; no side effects, no allocation
//!   beyond the extracted token
//! - Best-effort textual scan, not an HTTP parser: the application server
//!   behind the worker does the real parsing
//! - Partial or malformed input is treated as absence, never as an error

/// Length of the opaque session token that follows the `sid=` marker.
const SID_LEN: usize = 20;

/// What the first chunk of a connection revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    /// Session id token, if one was present anywhere in the buffer.
    pub session_id: Option<String>,
    /// True when the header block asks for a WebSocket upgrade.
    pub upgrade: bool,
    /// True for plain HTTP whose body may continue in later chunks.
    pub multi_chunk: bool,
}

/// Inspect the first chunk of a connection.
pub fn sniff(buf: &[u8]) -> Sniffed {
    let upgrade = is_upgrade(buf);
    Sniffed {
        session_id: find_session_id(buf),
        upgrade,
        multi_chunk: !upgrade && has_body_headers(buf),
    }
}

/// Find the 20 word characters following a literal `sid=`, anywhere in the
/// buffer. Shorter runs are skipped and the scan continues, so a truncated
/// token near the end of a partial read does not shadow a complete one.
pub fn find_session_id(buf: &[u8]) -> Option<String> {
    let mut from = 0;
    while let Some(pos) = find(&buf[from..], b"sid=") {
        let start = from + pos + 4;
        let end = start + SID_LEN;
        if end <= buf.len() && buf[start..end].iter().all(|b| is_word_byte(*b)) {
            return Some(String::from_utf8_lossy(&buf[start..end]).into_owned());
        }
        from = from + pos + 1;
    }
    None
}

/// Case-insensitive `upgrade: websocket` header line within the bytes
/// preceding the first blank line. When the blank line has not arrived yet
/// the whole buffer is scanned as-is (single-read best effort).
pub fn is_upgrade(buf: &[u8]) -> bool {
    let head = header_block(buf);
    let needle = b"upgrade: websocket";
    let mut from = 0;
    while let Some(pos) = find_ci(&head[from..], needle) {
        let at = from + pos;
        let after = at + needle.len();
        let line_start = at == 0 || head[..at].ends_with(b"\n");
        let line_end = after == head.len()
            || head[after..].starts_with(b"\r")
            || head[after..].starts_with(b"\n");
        if line_start && line_end {
            return true;
        }
        from = at + 1;
    }
    false
}

/// True when the header block declares a body (`content-length` or
/// `transfer-encoding`), meaning later chunks of the request may follow.
pub fn has_body_headers(buf: &[u8]) -> bool {
    let head = header_block(buf);
    find_ci(head, b"content-length:").is_some() || find_ci(head, b"transfer-encoding:").is_some()
}

/// Declared body length, if a parseable `content-length` header is present.
pub fn content_length(buf: &[u8]) -> Option<usize> {
    let head = header_block(buf);
    let pos = find_ci(head, b"content-length:")?;
    let rest = &head[pos + b"content-length:".len()..];
    let rest = &rest[rest.iter().take_while(|b| **b == b' ').count()..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()
}

/// Byte length of the header block including the blank-line delimiter, if
/// the delimiter is present in the buffer.
pub fn header_block_len(buf: &[u8]) -> Option<usize> {
    find(buf, b"\r\n\r\n").map(|pos| pos + 4)
}

fn header_block(buf: &[u8]) -> &[u8] {
    match find(buf, b"\r\n\r\n") {
        Some(pos) => &buf[..pos],
        None => buf,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}
