//! Read-only access to [WACZ](https://specs.webrecorder.net/wacz/1.1.1/)
//! containers.
//!
//! A WACZ file is a ZIP carrying one or more WARC payload files under
//! `archive/`, a CDX or CDXJ index under `indexes/`, and a
//! `datapackage.json` manifest at the root. This crate opens such a
//! container and answers three kinds of question:
//!
//! 1. which files are inside the container;
//! 2. which captures exist for a URL (optionally narrowed by time range,
//!    status code, or media type);
//! 3. what a specific capture actually responded with (status, headers,
//!    body).
//!
//! ```no_run
//! use unwacz::{Archive, CaptureLookup, CaptureQuery};
//!
//! # fn main() -> Result<(), unwacz::Error> {
//! let archive = Archive::open("collection.wacz")?;
//! let captures = archive.find_captures("https://example.com/", CaptureQuery::default())?;
//! println!("{} captures of the front page", captures.len());
//! if let Some(capture) = archive.get_capture(
//!     "https://example.com/",
//!     CaptureLookup::at("2025-12-16T08:54:25Z"),
//! )? {
//!     let response = archive.open_capture(&capture).open_response()?;
//!     println!("{} ({} bytes)", response.status, response.body().len());
//! }
//! # return Ok(());
//! # }
//! ```
//!
//! The crate never writes: no mutation of archives, no network fetching,
//! no on-disk caching. One [`Archive`] is meant to be driven by one
//! logical task at a time; hosts wanting parallelism should open several
//! archives against the same path.

use std::{
    error,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

pub mod archive;
pub mod cdxj;
pub mod container;
pub mod datapackage;
pub mod query;
pub mod warcparser;

pub use archive::{Archive, Capture, Captures, FileStream, IndexPreference, OpenOptions};
pub use cdxj::CaptureDescriptor;
pub use container::FileInfo;
pub use datapackage::{DataPackage, DataPackageResource};
pub use query::{
    CaptureLookup, CaptureQuery, FileMatcher, MimeFilter, StatusFilter, Strategy, TimeSpec,
    UrlMatcher,
};
pub use warcparser::{ArchivedResponse, ParsedWarc, WarcRecord};

/// Entry path of the manifest every WACZ must carry at its root.
pub const DATAPACKAGE_PATH: &str = "datapackage.json";
/// Preferred index location inside the container.
pub const CDXJ_INDEX_PATH: &str = "indexes/index.cdxj";
/// Plain CDX index location, tried when no CDXJ index is present.
pub const CDX_INDEX_PATH: &str = "indexes/index.cdx";
/// Compatibility fallback used when a capture descriptor does not name
/// its WARC file.
pub const DEFAULT_WARC_PATH: &str = "archive/data.warc.gz";

/// Every failure the crate can surface.
///
/// The two deliberate silent skips (malformed index lines, bytes past
/// the end of WARC framing) never reach this type; everything else
/// propagates to the caller.
#[derive(Debug)]
pub enum Error {
    /// The container itself is bad: corrupt or truncated ZIP data,
    /// a failed inflate, WARC framing gone wrong, or a missing index.
    Container(String),
    /// A requested entry path or capture record is absent.
    NotFound(String),
    /// An underlying read failed.
    Io(std::io::Error),
    /// A text decode was requested with an unusable encoding.
    Decode(String),
    /// An entry did not hold the JSON it was supposed to.
    Parse(serde_json::Error),
    /// The caller misused the API, for example a nearest-time lookup
    /// without an `at` timestamp, or an operation on a closed archive.
    Usage(String),
    /// The operation was cancelled through a [`CancelToken`].
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, message: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(error_message) => {
                return write!(message, "Container error: {error_message}");
            }
            Self::NotFound(error_message) => {
                return write!(message, "Not found: {error_message}");
            }
            Self::Io(io_error) => {
                return write!(message, "Read error: {io_error}");
            }
            Self::Decode(error_message) => {
                return write!(message, "Decode error: {error_message}");
            }
            Self::Parse(json_error) => {
                return write!(message, "JSON parse error: {json_error}");
            }
            Self::Usage(error_message) => {
                return write!(message, "Usage error: {error_message}");
            }
            Self::Cancelled => {
                return write!(message, "Operation cancelled");
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(io_error) => return Some(io_error),
            Self::Parse(json_error) => return Some(json_error),
            Self::Container(_)
            | Self::NotFound(_)
            | Self::Decode(_)
            | Self::Usage(_)
            | Self::Cancelled => return None,
        }
    }
}

/// Cooperative cancellation flag.
///
/// Clone the token, hand one copy to [`OpenOptions`], keep the other,
/// and call [`cancel`](Self::cancel) from wherever the host decides to
/// give up. In-flight operations check the flag at their suspension
/// points (entry drains, inflate, index parsing) and bail out with
/// [`Error::Cancelled`]; partially built caches are discarded, never
/// published. Timeouts are expressed as external cancellation, the
/// crate runs no timers of its own.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        return Self::default();
    }

    /// Flip the flag. Every operation sharing this token fails with
    /// [`Error::Cancelled`] at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        return self.0.load(Ordering::Relaxed);
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        return Ok(());
    }
}
