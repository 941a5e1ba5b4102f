//! The archive facade: one open WACZ container and every operation the
//! crate exposes over it.

use crate::{
    CDX_INDEX_PATH, CDXJ_INDEX_PATH, CancelToken, DATAPACKAGE_PATH, DEFAULT_WARC_PATH, Error,
    cdxj::{self, CaptureDescriptor},
    container::{self, FileInfo, ZipContainer},
    datapackage::DataPackage,
    query::{self, CaptureLookup, CaptureQuery, FileMatcher, Strategy, UrlMatcher},
    warcparser::{ArchivedResponse, ParsedWarc},
};
use std::{
    cell::RefCell,
    collections::HashMap,
    io::{Cursor, Read},
    path::Path,
    rc::Rc,
};

/// Which index file to load, decided at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexPreference {
    /// Try `indexes/index.cdxj`, fall back to `indexes/index.cdx`.
    #[default]
    Cdxj,
    /// Only `indexes/index.cdx`.
    Cdx,
    /// No preference expressed; treated like [`Self::Cdx`] for
    /// compatibility (the crate requires an index either way).
    None,
}

/// Options accepted by [`Archive::open_with`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub prefer_index: IndexPreference,
    /// Shared cancellation flag checked by this archive's operations.
    pub cancel: CancelToken,
}

/// A handle bound to one WACZ container on local storage.
///
/// The archive owns the open ZIP handle, the entry listing, the lazily
/// loaded capture index and a cache of parsed WARC entries. It is meant
/// for one logical task at a time and is deliberately not `Sync`; a
/// host wanting parallel readers opens several archives against the
/// same path.
pub struct Archive {
    container: ZipContainer,
    prefer_index: IndexPreference,
    cancel: CancelToken,
    capture_index: RefCell<Option<Rc<Vec<CaptureDescriptor>>>>,
    warc_cache: RefCell<HashMap<String, Rc<ParsedWarc>>>,
}

impl Archive {
    /// Open a container with default options.
    ///
    /// # Errors
    ///
    /// `Error::Io` when the file cannot be read, `Error::Container`
    /// when it is not a well-formed ZIP.
    pub fn open(container_path: impl AsRef<Path>) -> Result<Self, Error> {
        return Self::open_with(container_path, OpenOptions::default());
    }

    /// Open a container.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus `Error::Cancelled` when the token
    /// in `options` is already tripped.
    pub fn open_with(
        container_path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> Result<Self, Error> {
        options.cancel.check()?;
        let container = ZipContainer::open(container_path.as_ref())?;
        log::debug!(
            "opened container with {} file entries",
            container.files().len()
        );
        return Ok(Self {
            container,
            prefer_index: options.prefer_index,
            cancel: options.cancel,
            capture_index: RefCell::new(None),
            warc_cache: RefCell::new(HashMap::new()),
        });
    }

    /// Snapshot of every file in the container, in central-directory
    /// order.
    #[must_use]
    pub fn list_files(&self) -> Vec<FileInfo> {
        return self.container.files().to_vec();
    }

    /// Files whose path matches. Plain strings match by substring, see
    /// [`FileMatcher`].
    pub fn search_files(&self, matcher: impl Into<FileMatcher>) -> Vec<FileInfo> {
        let matcher = matcher.into();
        return self
            .container
            .files()
            .iter()
            .filter(|file| matcher.matches(file))
            .cloned()
            .collect();
    }

    /// Whether any file matches.
    pub fn has_file(&self, matcher: impl Into<FileMatcher>) -> bool {
        let matcher = matcher.into();
        return self
            .container
            .files()
            .iter()
            .any(|file| matcher.matches(file));
    }

    /// The listing entry for an exact path.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when no such entry exists.
    pub fn get_file(&self, entry_path: &str) -> Result<FileInfo, Error> {
        match self
            .container
            .files()
            .iter()
            .find(|file| file.path == entry_path)
        {
            Some(file) => return Ok(file.clone()),
            None => {
                return Err(Error::NotFound(format!(
                    "no file named {entry_path} in the archive"
                )));
            }
        }
    }

    /// The uncompressed bytes of one entry.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown path, `Error::Io` on read
    /// failure, `Error::Container` on inflate failure, `Error::Usage`
    /// once the archive is closed.
    pub fn read_file(&self, entry_path: &str) -> Result<Vec<u8>, Error> {
        return self.container.read_entry(entry_path, &self.cancel);
    }

    /// A readable stream over one entry's uncompressed bytes.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file).
    pub fn stream_file(&self, entry_path: &str) -> Result<FileStream, Error> {
        let bytes = self.read_file(entry_path)?;
        return Ok(FileStream {
            cursor: Cursor::new(bytes),
        });
    }

    /// An entry decoded as UTF-8 text, with replacement characters
    /// where the bytes are invalid.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file).
    pub fn get_text(&self, entry_path: &str) -> Result<String, Error> {
        let bytes = self.read_file(entry_path)?;
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    /// An entry decoded with a named encoding, `"utf-8"`, `"latin1"`
    /// and friends.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file), plus `Error::Decode` when the
    /// label names no known encoding.
    pub fn get_text_encoded(
        &self,
        entry_path: &str,
        encoding_label: &str,
    ) -> Result<String, Error> {
        let bytes = self.read_file(entry_path)?;
        let Some(encoding) = encoding_rs::Encoding::for_label(encoding_label.as_bytes()) else {
            return Err(Error::Decode(format!(
                "unknown encoding label {encoding_label}"
            )));
        };
        let (decoded, _, _) = encoding.decode(&bytes);
        return Ok(decoded.into_owned());
    }

    /// An entry parsed as JSON.
    ///
    /// # Errors
    ///
    /// As [`read_file`](Self::read_file), plus `Error::Parse` when the
    /// entry does not hold valid JSON.
    pub fn get_json(&self, entry_path: &str) -> Result<serde_json::Value, Error> {
        let text = self.get_text(entry_path)?;
        match serde_json::from_str(&text) {
            Ok(value) => return Ok(value),
            Err(json_error) => return Err(Error::Parse(json_error)),
        }
    }

    /// The container's `datapackage.json`, deserialized into the typed
    /// model.
    ///
    /// # Errors
    ///
    /// As [`get_json`](Self::get_json).
    pub fn datapackage(&self) -> Result<DataPackage, Error> {
        let bytes = self.read_file(DATAPACKAGE_PATH)?;
        match serde_json::from_slice(&bytes) {
            Ok(datapackage) => return Ok(datapackage),
            Err(json_error) => return Err(Error::Parse(json_error)),
        }
    }

    /// All captures matching `matcher` and `query`, in index order.
    ///
    /// # Errors
    ///
    /// `Error::Container` when the container holds no index,
    /// `Error::Usage` for unparseable `from`/`to` values or a closed
    /// archive, plus the [`read_file`](Self::read_file) errors on first
    /// load.
    pub fn find_captures(
        &self,
        matcher: impl Into<UrlMatcher>,
        query: CaptureQuery,
    ) -> Result<Vec<CaptureDescriptor>, Error> {
        return Ok(self.iterate_captures(matcher, query)?.collect());
    }

    /// Lazy variant of [`find_captures`](Self::find_captures). The
    /// returned iterator walks a snapshot of the index, so it stays
    /// usable while other operations run.
    ///
    /// # Errors
    ///
    /// As [`find_captures`](Self::find_captures).
    pub fn iterate_captures(
        &self,
        matcher: impl Into<UrlMatcher>,
        query: CaptureQuery,
    ) -> Result<Captures, Error> {
        let index = self.capture_index()?;
        let resolved = query.resolve()?;
        return Ok(Captures {
            index,
            position: 0,
            matched: 0,
            matcher: matcher.into(),
            query: resolved,
        });
    }

    /// The capture nearest to `lookup.at`, honoring the lookup's
    /// strategy. Ties go to the earlier index row. `None` when no
    /// candidate survives the strategy filter.
    ///
    /// # Errors
    ///
    /// `Error::Usage` when `lookup.at` is unset or unparseable, plus
    /// the [`find_captures`](Self::find_captures) errors.
    pub fn get_capture(
        &self,
        matcher: impl Into<UrlMatcher>,
        lookup: CaptureLookup,
    ) -> Result<Option<CaptureDescriptor>, Error> {
        let Some(at) = lookup.at else {
            return Err(Error::Usage(
                "get_capture requires an `at` timestamp".to_owned(),
            ));
        };
        let at_millis = at.to_millis()?;

        // candidate set with every filter reset, the url matcher alone
        let mut best: Option<(i64, CaptureDescriptor)> = None;
        for capture in self.iterate_captures(matcher, CaptureQuery::default())? {
            let Some(ts_millis) = query::parse_millis(&capture.ts) else {
                continue;
            };
            let delta = ts_millis - at_millis;
            match lookup.strategy {
                Strategy::Before if delta > 0 => continue,
                Strategy::After if delta < 0 => continue,
                _ => {}
            }
            let distance = delta.abs();
            // strict comparison keeps the first-encountered candidate
            // on a tie
            if best
                .as_ref()
                .is_none_or(|(best_distance, _)| distance < *best_distance)
            {
                best = Some((distance, capture));
            }
        }
        return Ok(best.map(|(_, capture)| capture));
    }

    /// A lightweight handle for reading one capture's stored response.
    #[must_use]
    pub fn open_capture(&self, descriptor: &CaptureDescriptor) -> Capture<'_> {
        return Capture {
            archive: self,
            descriptor: descriptor.clone(),
        };
    }

    /// Release the file handle and drop the caches. Idempotent. Byte
    /// and capture reads fail with `Error::Usage` afterwards; listing
    /// operations keep answering from their snapshot.
    pub fn close(&self) {
        self.container.close();
        self.capture_index.borrow_mut().take();
        self.warc_cache.borrow_mut().clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        return self.container.is_closed();
    }

    /// Load (or return the memoized) capture index, honoring the
    /// open-time preference.
    fn capture_index(&self) -> Result<Rc<Vec<CaptureDescriptor>>, Error> {
        if let Some(index) = self.capture_index.borrow().as_ref() {
            return Ok(Rc::clone(index));
        }

        let index_path = self.select_index_path()?;
        let index_bytes = self.container.read_entry(index_path, &self.cancel)?;
        let index_text = String::from_utf8_lossy(&index_bytes);
        let captures = Rc::new(cdxj::parse_index(&index_text));
        // a cancelled parse must not publish a cache entry
        self.cancel.check()?;
        log::debug!("loaded {} captures from {index_path}", captures.len());

        *self.capture_index.borrow_mut() = Some(Rc::clone(&captures));
        return Ok(captures);
    }

    fn select_index_path(&self) -> Result<&'static str, Error> {
        match self.prefer_index {
            IndexPreference::Cdxj => {
                if self.container.has_entry(CDXJ_INDEX_PATH) {
                    return Ok(CDXJ_INDEX_PATH);
                }
                if self.container.has_entry(CDX_INDEX_PATH) {
                    return Ok(CDX_INDEX_PATH);
                }
            }
            IndexPreference::Cdx | IndexPreference::None => {
                if self.container.has_entry(CDX_INDEX_PATH) {
                    return Ok(CDX_INDEX_PATH);
                }
            }
        }
        return Err(Error::Container(
            "no CDX or CDXJ index present in the container".to_owned(),
        ));
    }

    /// Load (or return the memoized) parsed WARC for one entry path,
    /// inflating `.gz` entries on the way in.
    fn parsed_warc(&self, warc_path: &str) -> Result<Rc<ParsedWarc>, Error> {
        if let Some(parsed) = self.warc_cache.borrow().get(warc_path) {
            log::debug!("warc cache hit for {warc_path}");
            return Ok(Rc::clone(parsed));
        }

        let raw_bytes = self.container.read_entry(warc_path, &self.cancel)?;
        let buffer = if warc_path.ends_with(".gz") {
            container::gunzip(&raw_bytes, &self.cancel)?
        } else {
            raw_bytes
        };
        let parsed = Rc::new(ParsedWarc::parse(buffer));
        self.cancel.check()?;
        log::debug!(
            "framed {} records from {warc_path}",
            parsed.records().len()
        );

        self.warc_cache
            .borrow_mut()
            .insert(warc_path.to_owned(), Rc::clone(&parsed));
        return Ok(parsed);
    }
}

/// Readable stream over one entry's uncompressed bytes.
///
/// The entry is drained up front; the ZIP handle is only borrowed for
/// the duration of [`Archive::stream_file`], never by the stream
/// itself.
pub struct FileStream {
    cursor: Cursor<Vec<u8>>,
}

impl Read for FileStream {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        return self.cursor.read(buffer);
    }
}

/// Lazy sequence of matching captures, in index order. Produced by
/// [`Archive::iterate_captures`].
pub struct Captures {
    index: Rc<Vec<CaptureDescriptor>>,
    position: usize,
    matched: usize,
    matcher: UrlMatcher,
    query: query::ResolvedQuery,
}

impl Iterator for Captures {
    type Item = CaptureDescriptor;

    fn next(&mut self) -> Option<CaptureDescriptor> {
        if let Some(limit) = self.query.limit {
            if self.matched >= limit {
                return None;
            }
        }
        while self.position < self.index.len() {
            let capture = &self.index[self.position];
            self.position += 1;
            if self.matcher.matches(capture) && self.query.retains(capture) {
                self.matched += 1;
                return Some(capture.clone());
            }
        }
        return None;
    }
}

/// One capture, ready to have its stored response read.
pub struct Capture<'archive> {
    archive: &'archive Archive,
    descriptor: CaptureDescriptor,
}

impl Capture<'_> {
    #[must_use]
    pub fn descriptor(&self) -> &CaptureDescriptor {
        return &self.descriptor;
    }

    /// Read and parse the stored HTTP response for this capture.
    ///
    /// The WARC entry named by the descriptor (falling back to
    /// `archive/data.warc.gz` for descriptors that do not name one) is
    /// materialized, framed and cached; the record is then selected by
    /// `(url, ts)`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` when the WARC entry or the record itself is
    /// absent, `Error::Container` on inflate or framing trouble,
    /// `Error::Usage` once the archive is closed.
    pub fn open_response(&self) -> Result<ArchivedResponse, Error> {
        let warc_path = self
            .descriptor
            .warc_path
            .as_deref()
            .unwrap_or(DEFAULT_WARC_PATH);
        let parsed = self.archive.parsed_warc(warc_path)?;

        let Some(record) = parsed.get(&self.descriptor.url, &self.descriptor.ts) else {
            return Err(Error::NotFound(format!(
                "no record for {} at {} in {warc_path}",
                self.descriptor.url, self.descriptor.ts
            )));
        };
        return Ok(ArchivedResponse::from_payload(parsed.payload(record)));
    }
}
