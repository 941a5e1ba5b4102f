//! CDX/CDXJ index parsing.
//!
//! Each index line has the shape
//! `<searchable-key> <timestamp> <json-object>`, for example:
//!
//! ```text
//! org,iana)/ 20251216085425000 {"url":"https://www.iana.org/","mime":"text/html","status":200,"filename":"data.warc.gz"}
//! ```
//!
//! Parsing is forgiving the way replay tools have to be: lines with too
//! few fields or unparseable JSON are skipped silently (logged at debug
//! level) rather than failing the whole index.

use serde::Deserialize;

/// One capture row from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDescriptor {
    /// The captured target URL, exactly as indexed.
    pub url: String,
    /// Normalized timestamp, see [`normalize_timestamp`].
    pub ts: String,
    /// HTTP status recorded by the indexer, if any.
    pub status: Option<u16>,
    /// Content type recorded by the indexer, if any.
    pub mime: Option<String>,
    /// Payload digest recorded by the indexer, if any.
    pub digest: Option<String>,
    /// Path of the WARC entry inside the container, already prefixed
    /// with `archive/` when the index carried a bare filename.
    pub warc_path: Option<String>,
    /// Byte offset of the record within the uncompressed WARC.
    /// Informational, lookups go by `(url, ts)` instead.
    pub offset: Option<u64>,
    /// Byte length of the record within the uncompressed WARC.
    /// Informational, like `offset`.
    pub length: Option<u64>,
}

/// The JSON object carried on an index line. Unknown keys are ignored.
#[derive(Deserialize)]
struct CdxjBlock {
    url: Option<String>,
    status: Option<u16>,
    mime: Option<String>,
    digest: Option<String>,
    filename: Option<String>,
    offset: Option<u64>,
    length: Option<u64>,
}

/// Parse the decoded text of an index file into capture descriptors,
/// preserving line order.
///
/// Rows without a usable `url` or timestamp are dropped, so every
/// returned descriptor has a non-empty `url` and `ts`.
#[must_use]
pub fn parse_index(index_text: &str) -> Vec<CaptureDescriptor> {
    let mut captures = Vec::with_capacity(512);

    for line in index_text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.splitn(3, ' ');
        let (Some(_searchable_key), Some(timestamp), Some(json_text)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::debug!("skipping index line with fewer than three fields");
            continue;
        };
        if timestamp.is_empty() {
            continue;
        }

        let block: CdxjBlock = match serde_json::from_str(json_text) {
            Ok(block) => block,
            Err(json_error) => {
                log::debug!("skipping index line with unparseable json: {json_error}");
                continue;
            }
        };
        let Some(url) = block.url.filter(|url| !url.is_empty()) else {
            continue;
        };

        captures.push(CaptureDescriptor {
            url,
            ts: normalize_timestamp(timestamp),
            status: block.status,
            mime: block.mime,
            digest: block.digest,
            warc_path: block.filename.map(|filename| format!("archive/{filename}")),
            offset: block.offset,
            length: block.length,
        });
    }

    return captures;
}

/// Rewrite a 17-digit `YYYYMMDDhhmmssSSS` timestamp into the ISO form
/// `YYYY-MM-DDThh:mm:ss.SSSZ`; anything else passes through verbatim.
///
/// The same rewrite is applied to `WARC-Date` values when building
/// record lookup keys, which is what lets an index row and its WARC
/// record meet on one key.
#[must_use]
pub fn normalize_timestamp(timestamp: &str) -> String {
    let digits = timestamp.as_bytes();
    if digits.len() == 17 && digits.iter().all(|digit| digit.is_ascii_digit()) {
        return format!(
            "{}-{}-{}T{}:{}:{}.{}Z",
            &timestamp[0..4],
            &timestamp[4..6],
            &timestamp[6..8],
            &timestamp[8..10],
            &timestamp[10..12],
            &timestamp[12..14],
            &timestamp[14..17],
        );
    }
    return timestamp.to_owned();
}
