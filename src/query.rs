//! Matching and filtering of files and captures.
//!
//! File paths and capture URLs are matched differently on purpose: a
//! plain string matches file paths by *substring* (paths are browsed)
//! but capture URLs by *exact equality* (captures are keyed). Existing
//! archives depend on that asymmetry.

use crate::{CaptureDescriptor, Error, FileInfo};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// How to match an entry path when searching files.
pub enum FileMatcher {
    /// Plain strings match by substring containment.
    Substring(String),
    Pattern(Regex),
    Predicate(Box<dyn Fn(&FileInfo) -> bool>),
}

impl FileMatcher {
    /// Wrap an arbitrary predicate over [`FileInfo`].
    pub fn predicate(predicate: impl Fn(&FileInfo) -> bool + 'static) -> Self {
        return Self::Predicate(Box::new(predicate));
    }

    #[must_use]
    pub fn matches(&self, file: &FileInfo) -> bool {
        match self {
            Self::Substring(needle) => return file.path.contains(needle.as_str()),
            Self::Pattern(pattern) => return pattern.is_match(&file.path),
            Self::Predicate(predicate) => return predicate(file),
        }
    }
}

impl From<&str> for FileMatcher {
    fn from(needle: &str) -> Self {
        return Self::Substring(needle.to_owned());
    }
}
impl From<String> for FileMatcher {
    fn from(needle: String) -> Self {
        return Self::Substring(needle);
    }
}
impl From<Regex> for FileMatcher {
    fn from(pattern: Regex) -> Self {
        return Self::Pattern(pattern);
    }
}

/// How to match a capture when querying the index.
pub enum UrlMatcher {
    /// Plain strings match the indexed URL by exact equality.
    Exact(String),
    Pattern(Regex),
    Predicate(Box<dyn Fn(&CaptureDescriptor) -> bool>),
}

impl UrlMatcher {
    /// Wrap an arbitrary predicate over [`CaptureDescriptor`].
    pub fn predicate(predicate: impl Fn(&CaptureDescriptor) -> bool + 'static) -> Self {
        return Self::Predicate(Box::new(predicate));
    }

    #[must_use]
    pub fn matches(&self, capture: &CaptureDescriptor) -> bool {
        match self {
            Self::Exact(url) => return capture.url == *url,
            Self::Pattern(pattern) => return pattern.is_match(&capture.url),
            Self::Predicate(predicate) => return predicate(capture),
        }
    }
}

impl From<&str> for UrlMatcher {
    fn from(url: &str) -> Self {
        return Self::Exact(url.to_owned());
    }
}
impl From<String> for UrlMatcher {
    fn from(url: String) -> Self {
        return Self::Exact(url);
    }
}
impl From<Regex> for UrlMatcher {
    fn from(pattern: Regex) -> Self {
        return Self::Pattern(pattern);
    }
}

/// A date-like input: an ISO-parseable string, a parsed datetime, or
/// raw milliseconds since the epoch.
#[derive(Debug, Clone)]
pub enum TimeSpec {
    Text(String),
    DateTime(DateTime<Utc>),
    Millis(i64),
}

impl TimeSpec {
    /// Convert to milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// `Error::Usage` when a text value cannot be parsed as a date.
    pub fn to_millis(&self) -> Result<i64, Error> {
        match self {
            Self::Millis(millis) => return Ok(*millis),
            Self::DateTime(datetime) => return Ok(datetime.timestamp_millis()),
            Self::Text(text) => {
                return parse_millis(text)
                    .ok_or_else(|| Error::Usage(format!("unparseable date value: {text}")));
            }
        }
    }
}

impl From<&str> for TimeSpec {
    fn from(text: &str) -> Self {
        return Self::Text(text.to_owned());
    }
}
impl From<String> for TimeSpec {
    fn from(text: String) -> Self {
        return Self::Text(text);
    }
}
impl From<DateTime<Utc>> for TimeSpec {
    fn from(datetime: DateTime<Utc>) -> Self {
        return Self::DateTime(datetime);
    }
}
impl From<i64> for TimeSpec {
    fn from(millis: i64) -> Self {
        return Self::Millis(millis);
    }
}

/// Parse a date-like string to epoch milliseconds, accepting RFC 3339,
/// a zoneless `YYYY-MM-DDThh:mm:ss[.fff]`, and a bare date with an
/// optional trailing `Z` (such as `1990-01-01Z`). Zoneless forms are
/// taken as UTC.
pub(crate) fn parse_millis(text: &str) -> Option<i64> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().timestamp_millis());
    }
    let date_text = text.strip_suffix('Z').unwrap_or(text);
    if let Ok(date) = NaiveDate::parse_from_str(date_text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    return None;
}

/// `status` filter: one code or a set of codes. A capture with no
/// recorded status never passes an active filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusFilter {
    One(u16),
    Any(Vec<u16>),
}

impl StatusFilter {
    #[must_use]
    pub fn matches(&self, status: Option<u16>) -> bool {
        let Some(status) = status else {
            return false;
        };
        match self {
            Self::One(expected) => return status == *expected,
            Self::Any(expected) => return expected.contains(&status),
        }
    }
}

impl From<u16> for StatusFilter {
    fn from(status: u16) -> Self {
        return Self::One(status);
    }
}
impl From<Vec<u16>> for StatusFilter {
    fn from(statuses: Vec<u16>) -> Self {
        return Self::Any(statuses);
    }
}
impl From<&[u16]> for StatusFilter {
    fn from(statuses: &[u16]) -> Self {
        return Self::Any(statuses.to_vec());
    }
}

/// `mime` filter: exact string equality, or a pattern tested against
/// the recorded type (an absent type tests as the empty string).
pub enum MimeFilter {
    Exact(String),
    Pattern(Regex),
}

impl MimeFilter {
    #[must_use]
    pub fn matches(&self, mime: Option<&str>) -> bool {
        match self {
            Self::Exact(expected) => return mime == Some(expected.as_str()),
            Self::Pattern(pattern) => return pattern.is_match(mime.unwrap_or("")),
        }
    }
}

impl From<&str> for MimeFilter {
    fn from(mime: &str) -> Self {
        return Self::Exact(mime.to_owned());
    }
}
impl From<String> for MimeFilter {
    fn from(mime: String) -> Self {
        return Self::Exact(mime);
    }
}
impl From<Regex> for MimeFilter {
    fn from(pattern: Regex) -> Self {
        return Self::Pattern(pattern);
    }
}

/// Options for [`find_captures`](crate::Archive::find_captures) and
/// [`iterate_captures`](crate::Archive::iterate_captures). The default
/// is no filtering at all.
#[derive(Default)]
pub struct CaptureQuery {
    /// Keep captures at or after this instant.
    pub from: Option<TimeSpec>,
    /// Keep captures at or before this instant.
    pub to: Option<TimeSpec>,
    /// Stop after this many matches. Iteration runs in index order, so
    /// this is a deterministic prefix, not a sample.
    pub limit: Option<usize>,
    pub status: Option<StatusFilter>,
    pub mime: Option<MimeFilter>,
}

impl CaptureQuery {
    /// Convert the date-like bounds to milliseconds once, up front.
    ///
    /// # Errors
    ///
    /// `Error::Usage` when `from` or `to` cannot be parsed as a date.
    pub(crate) fn resolve(self) -> Result<ResolvedQuery, Error> {
        let from_millis = match &self.from {
            Some(bound) => Some(bound.to_millis()?),
            None => None,
        };
        let to_millis = match &self.to {
            Some(bound) => Some(bound.to_millis()?),
            None => None,
        };
        return Ok(ResolvedQuery {
            from_millis,
            to_millis,
            limit: self.limit,
            status: self.status,
            mime: self.mime,
        });
    }
}

/// A [`CaptureQuery`] with its temporal bounds already in epoch
/// milliseconds.
pub(crate) struct ResolvedQuery {
    from_millis: Option<i64>,
    to_millis: Option<i64>,
    pub(crate) limit: Option<usize>,
    status: Option<StatusFilter>,
    mime: Option<MimeFilter>,
}

impl ResolvedQuery {
    pub(crate) fn retains(&self, capture: &CaptureDescriptor) -> bool {
        if self.from_millis.is_some() || self.to_millis.is_some() {
            // a capture whose timestamp cannot be compared is excluded
            // from any temporally filtered result
            let Some(ts_millis) = parse_millis(&capture.ts) else {
                return false;
            };
            if let Some(from_millis) = self.from_millis {
                if ts_millis < from_millis {
                    return false;
                }
            }
            if let Some(to_millis) = self.to_millis {
                if ts_millis > to_millis {
                    return false;
                }
            }
        }
        if let Some(status_filter) = &self.status {
            if !status_filter.matches(capture.status) {
                return false;
            }
        }
        if let Some(mime_filter) = &self.mime {
            if !mime_filter.matches(capture.mime.as_deref()) {
                return false;
            }
        }
        return true;
    }
}

/// Nearest-time strategy for
/// [`get_capture`](crate::Archive::get_capture).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Nearest capture on either side of `at`.
    #[default]
    Closest,
    /// Nearest capture at or before `at`.
    Before,
    /// Nearest capture at or after `at`.
    After,
}

/// Options for [`get_capture`](crate::Archive::get_capture). The `at`
/// instant is required; leaving it unset is a usage error.
#[derive(Debug, Clone, Default)]
pub struct CaptureLookup {
    pub at: Option<TimeSpec>,
    pub strategy: Strategy,
}

impl CaptureLookup {
    /// Lookup closest to `at`.
    pub fn at(at: impl Into<TimeSpec>) -> Self {
        return Self {
            at: Some(at.into()),
            strategy: Strategy::Closest,
        };
    }

    /// Same, with an explicit strategy.
    pub fn at_with(at: impl Into<TimeSpec>, strategy: Strategy) -> Self {
        return Self {
            at: Some(at.into()),
            strategy,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CaptureQuery, FileMatcher, MimeFilter, StatusFilter, TimeSpec, parse_millis,
    };
    use crate::{CaptureDescriptor, Error, FileInfo, UrlMatcher};
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn capture(url: &str, ts: &str) -> CaptureDescriptor {
        return CaptureDescriptor {
            url: url.to_owned(),
            ts: ts.to_owned(),
            status: Some(200),
            mime: Some("text/html".to_owned()),
            digest: None,
            warc_path: None,
            offset: None,
            length: None,
        };
    }

    #[test]
    fn strings_match_files_by_substring_but_captures_exactly() {
        let file = FileInfo {
            path: "indexes/index.cdxj".to_owned(),
            size: 0,
        };
        assert!(FileMatcher::from("index").matches(&file));
        assert!(FileMatcher::from("indexes/index.cdxj").matches(&file));
        assert!(!FileMatcher::from("pages").matches(&file));

        let full_url = capture("https://example.com/page", "2025-01-01T00:00:00.000Z");
        assert!(UrlMatcher::from("https://example.com/page").matches(&full_url));
        // a substring is not enough for captures
        assert!(!UrlMatcher::from("example.com").matches(&full_url));
    }

    #[test]
    fn regex_and_predicate_matchers_dispatch() {
        let file = FileInfo {
            path: "archive/data.warc.gz".to_owned(),
            size: 7,
        };
        assert!(FileMatcher::from(Regex::new(r"\.warc(\.gz)?$").unwrap()).matches(&file));
        assert!(FileMatcher::predicate(|candidate| candidate.size > 5).matches(&file));

        let page = capture("https://example.com/page", "2025-01-01T00:00:00.000Z");
        assert!(UrlMatcher::from(Regex::new(r"example\.com").unwrap()).matches(&page));
        assert!(
            UrlMatcher::predicate(|candidate| candidate.status == Some(200)).matches(&page)
        );
    }

    #[test]
    fn time_specs_convert_to_millis() {
        assert_eq!(
            TimeSpec::from("1970-01-01T00:00:00Z").to_millis().unwrap(),
            0
        );
        assert_eq!(
            TimeSpec::from("1970-01-01T00:00:01.500Z")
                .to_millis()
                .unwrap(),
            1500
        );
        // bare dates with a trailing Z, as replay tools write them
        assert_eq!(TimeSpec::from("1970-01-01Z").to_millis().unwrap(), 0);
        assert_eq!(TimeSpec::from("1970-01-02").to_millis().unwrap(), 86_400_000);
        assert_eq!(TimeSpec::from(42_i64).to_millis().unwrap(), 42);

        assert!(matches!(
            TimeSpec::from("never oclock").to_millis(),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn zoneless_datetimes_are_taken_as_utc() {
        assert_eq!(parse_millis("1970-01-01T00:00:02"), Some(2000));
        assert_eq!(parse_millis("1970-01-01T00:00:02.250"), Some(2250));
    }

    #[test]
    fn time_range_retention_is_inclusive() {
        let query = CaptureQuery {
            from: Some(TimeSpec::from("2025-01-01T00:00:00Z")),
            to: Some(TimeSpec::from("2025-12-31T00:00:00Z")),
            ..CaptureQuery::default()
        };
        let resolved = query.resolve().unwrap();

        assert!(resolved.retains(&capture("u", "2025-01-01T00:00:00.000Z")));
        assert!(resolved.retains(&capture("u", "2025-06-15T12:00:00.000Z")));
        assert!(resolved.retains(&capture("u", "2025-12-31T00:00:00.000Z")));
        assert!(!resolved.retains(&capture("u", "2024-12-31T23:59:59.999Z")));
        assert!(!resolved.retains(&capture("u", "2026-01-01T00:00:00.000Z")));
        // unparseable timestamps cannot satisfy a temporal filter
        assert!(!resolved.retains(&capture("u", "not a timestamp")));
    }

    #[test]
    fn status_filters_match_one_or_any() {
        assert!(StatusFilter::from(200).matches(Some(200)));
        assert!(!StatusFilter::from(200).matches(Some(404)));
        assert!(!StatusFilter::from(200).matches(None));
        assert!(StatusFilter::from(vec![301, 302]).matches(Some(302)));
        assert!(!StatusFilter::from(vec![301, 302]).matches(Some(200)));
    }

    #[test]
    fn mime_filters_match_exactly_or_by_pattern() {
        assert!(MimeFilter::from("text/html").matches(Some("text/html")));
        assert!(!MimeFilter::from("text/html").matches(Some("text/plain")));
        assert!(!MimeFilter::from("text/html").matches(None));

        let pattern = MimeFilter::from(Regex::new("^text/").unwrap());
        assert!(pattern.matches(Some("text/plain")));
        assert!(!pattern.matches(Some("image/png")));
        // absent types are tested as the empty string
        assert!(!pattern.matches(None));
        assert!(MimeFilter::from(Regex::new("^$").unwrap()).matches(None));
    }
}
