//! WARC record framing and HTTP response extraction.
//!
//! Framing works on a contiguous byte buffer rather than a true stream:
//! a capture lookup needs random access by `(url, timestamp)`, and a
//! WARC payload inside a WACZ is bounded by its ZIP entry size, so the
//! whole entry is materialised once and the parsed result is cached and
//! reused by the archive.

use crate::cdxj::normalize_timestamp;
use std::{cmp, collections::HashMap, ops::Range};

/// One framed WARC record: its header map and the position of its
/// payload inside the parent buffer.
///
/// Header names keep the case the archive wrote them with; lookups for
/// `WARC-Target-URI`, `WARC-Date` and `Content-Length` are
/// case-sensitive. This is deliberately different from the HTTP header
/// map on [`ArchivedResponse`], which lower-cases names.
#[derive(Debug, Clone)]
pub struct WarcRecord {
    pub headers: HashMap<String, String>,
    payload: Range<usize>,
}

impl WarcRecord {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        return self.headers.get(name).map(String::as_str);
    }
}

/// A fully framed WARC file: the backing buffer, its records in file
/// order, and a lookup table keyed by `url + "|" + normalized date`.
///
/// On a key collision the earlier record wins, so repeated reads stay
/// deterministic.
#[derive(Debug)]
pub struct ParsedWarc {
    buffer: Vec<u8>,
    records: Vec<WarcRecord>,
    by_key: HashMap<String, usize>,
}

impl ParsedWarc {
    /// Frame a buffer into records.
    ///
    /// Framing scans for the literal `WARC/` marker, takes everything up
    /// to the `\r\n\r\n` separator as the header block, and slices the
    /// payload out by `Content-Length`. A record whose declared length
    /// runs past the end of the buffer is clamped to the end and framing
    /// continues; trailing bytes that never form another record are
    /// silently dropped, matching what real-world archives require.
    #[must_use]
    pub fn parse(buffer: Vec<u8>) -> Self {
        let mut records = Vec::new();
        let mut by_key = HashMap::new();
        let mut cursor = 0_usize;

        while let Some(record) = next_record(&buffer, &mut cursor) {
            if let (Some(url), Some(date)) = (
                record.header("WARC-Target-URI"),
                record.header("WARC-Date"),
            ) {
                let key = format!("{url}|{}", normalize_timestamp(date));
                // first record wins, later duplicates stay reachable
                // through `records` only
                by_key.entry(key).or_insert(records.len());
            }
            records.push(record);
        }

        return Self {
            buffer,
            records,
            by_key,
        };
    }

    /// Records in file order.
    #[must_use]
    pub fn records(&self) -> &[WarcRecord] {
        return &self.records;
    }

    /// Look a record up by target URI and normalized timestamp.
    #[must_use]
    pub fn get(&self, url: &str, iso_date: &str) -> Option<&WarcRecord> {
        let key = format!("{url}|{iso_date}");
        return self.by_key.get(&key).map(|position| &self.records[*position]);
    }

    /// The payload bytes of one of this file's records.
    #[must_use]
    pub fn payload(&self, record: &WarcRecord) -> &[u8] {
        return &self.buffer[record.payload.clone()];
    }
}

fn next_record(buffer: &[u8], cursor: &mut usize) -> Option<WarcRecord> {
    let magic_offset = find(buffer, *cursor, b"WARC/")?;
    let separator_offset = find(buffer, magic_offset, b"\r\n\r\n")?;

    let headers = parse_header_block(&buffer[magic_offset..separator_offset]);
    let content_length = headers
        .get("Content-Length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);

    let payload_start = separator_offset + 4;
    // clamp a truncated payload to the end of the buffer and keep going
    let payload_end = cmp::min(payload_start.saturating_add(content_length), buffer.len());

    // step past the payload and swallow the inter-record separator,
    // tolerating any run of CR/LF bytes in place of the canonical
    // \r\n\r\n
    let mut next_cursor = payload_end;
    while next_cursor < buffer.len()
        && (buffer[next_cursor] == b'\r' || buffer[next_cursor] == b'\n')
    {
        next_cursor += 1;
    }
    *cursor = next_cursor;

    return Some(WarcRecord {
        headers,
        payload: payload_start..payload_end,
    });
}

/// Split a header block into a name/value map. The first line is the
/// WARC version line and is discarded; remaining lines split on the
/// first `:` with both sides trimmed, duplicate names last-wins.
fn parse_header_block(block: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(block);
    let mut headers = HashMap::new();
    for line in text.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(name.trim().to_owned(), value.trim().to_owned());
    }
    return headers;
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    return haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| from + position);
}

/// The HTTP response held inside a `response` record's payload.
///
/// Header names are lower-cased; the body is the raw byte slice after
/// the header separator, with no transfer-encoding or content-length
/// handling on top (the WARC record already framed it). The struct owns
/// copies, so it stays valid after the archive is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ArchivedResponse {
    /// Parse a response payload.
    ///
    /// A payload with no `\r\n\r\n` separator yields status 0, no
    /// headers, and the entire payload as body. A malformed status line
    /// yields status 0 with the headers still parsed.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        let Some(separator_offset) = find(payload, 0, b"\r\n\r\n") else {
            return Self {
                status: 0,
                headers: HashMap::new(),
                body: payload.to_vec(),
            };
        };

        let preamble = String::from_utf8_lossy(&payload[..separator_offset]);
        let mut lines = preamble.lines();
        let status = lines.next().map_or(0, parse_status_line);

        let mut headers = HashMap::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }

        return Self {
            status,
            headers,
            body: payload[separator_offset + 4..].to_vec(),
        };
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        return &self.body;
    }

    /// The body decoded as UTF-8, with replacement characters where the
    /// bytes are not valid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        return String::from_utf8_lossy(&self.body).into_owned();
    }

    #[must_use]
    pub fn header(&self, lowercase_name: &str) -> Option<&str> {
        return self.headers.get(lowercase_name).map(String::as_str);
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        return self.header("content-type");
    }
}

/// Pull the status code out of a line shaped like `HTTP/1.1 200 OK`.
/// Anything that does not match yields 0.
fn parse_status_line(line: &str) -> u16 {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(version) if is_http_version(version) => {}
        _ => return 0,
    }
    return tokens
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);
}

fn is_http_version(token: &str) -> bool {
    let Some(version) = token.strip_prefix("HTTP/") else {
        return false;
    };
    let digits = version.as_bytes();
    return digits.len() == 3
        && digits[0].is_ascii_digit()
        && digits[1] == b'.'
        && digits[2].is_ascii_digit();
}
