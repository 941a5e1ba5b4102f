//! Random access to the entries of one ZIP container.
//!
//! The central directory is read once at open time; entry data is only
//! decompressed when asked for. Stored and deflate entries are
//! supported, which is all the WACZ spec permits.

use crate::{CancelToken, Error};
use flate2::read::MultiGzDecoder;
use std::{
    cell::RefCell,
    collections::HashMap,
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};
use zip::{ZipArchive, result::ZipError};

/// Name and uncompressed size of one container entry, in
/// central-directory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
}

/// An open ZIP handle plus the entry listing derived from its central
/// directory. Directory entries (names ending in `/`) are dropped from
/// the listing.
///
/// Entry reads borrow the handle for their whole duration, so only one
/// read can be in flight at a time. The owning [`Archive`](crate::Archive)
/// upholds that discipline by construction.
pub(crate) struct ZipContainer {
    archive: RefCell<Option<ZipArchive<File>>>,
    files: Vec<FileInfo>,
    positions: HashMap<String, usize>,
}

impl ZipContainer {
    /// Open a container and read its central directory.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the file cannot be opened or read,
    /// `Error::Container` if the bytes are not a well-formed ZIP.
    pub(crate) fn open(container_path: &Path) -> Result<Self, Error> {
        let file = match File::open(container_path) {
            Ok(file) => file,
            Err(io_error) => return Err(Error::Io(io_error)),
        };
        let mut archive = match ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(zip_error) => return Err(container_error(zip_error)),
        };

        let mut files = Vec::with_capacity(archive.len());
        let mut positions = HashMap::with_capacity(archive.len());
        for entry_index in 0..archive.len() {
            // raw access skips decompression set-up, the central
            // directory metadata is all that is needed here
            let entry = match archive.by_index_raw(entry_index) {
                Ok(entry) => entry,
                Err(zip_error) => return Err(container_error(zip_error)),
            };
            if entry.is_dir() {
                continue;
            }
            let entry_path = entry.name().to_owned();
            positions.insert(entry_path.clone(), entry_index);
            files.push(FileInfo {
                path: entry_path,
                size: entry.size(),
            });
        }

        return Ok(Self {
            archive: RefCell::new(Some(archive)),
            files,
            positions,
        });
    }

    /// Entries in central-directory order, directories skipped.
    pub(crate) fn files(&self) -> &[FileInfo] {
        return &self.files;
    }

    pub(crate) fn has_entry(&self, entry_path: &str) -> bool {
        return self.positions.contains_key(entry_path);
    }

    /// Drain one entry to its uncompressed bytes.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown path, `Error::Usage` once the
    /// container is closed, `Error::Container` when inflate fails,
    /// `Error::Io` on a plain read failure, `Error::Cancelled` if the
    /// token trips mid-drain.
    pub(crate) fn read_entry(
        &self,
        entry_path: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, Error> {
        let entry_index = match self.positions.get(entry_path) {
            Some(position) => *position,
            None => {
                return Err(Error::NotFound(format!(
                    "no entry named {entry_path} in the container"
                )));
            }
        };

        let mut guard = self.archive.borrow_mut();
        let archive = match guard.as_mut() {
            Some(archive) => archive,
            None => return Err(Error::Usage("archive is closed".to_owned())),
        };
        let mut entry = match archive.by_index(entry_index) {
            Ok(entry) => entry,
            Err(zip_error) => return Err(container_error(zip_error)),
        };

        let size_hint = usize::try_from(entry.size()).unwrap_or(0);
        return drain(&mut entry, size_hint, cancel);
    }

    /// Drop the file handle. Idempotent; the entry listing survives so
    /// that metadata queries keep answering from their snapshot.
    pub(crate) fn close(&self) {
        self.archive.borrow_mut().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        return self.archive.borrow().is_none();
    }
}

/// Inflate a gzipped WARC entry. WARC gzip files are usually
/// multi-member, one member per record, so a multi-member decoder is
/// required to see past the first record.
///
/// # Errors
///
/// `Error::Container` on truncated input or a CRC/length mismatch,
/// `Error::Cancelled` if the token trips mid-inflate.
pub(crate) fn gunzip(compressed: &[u8], cancel: &CancelToken) -> Result<Vec<u8>, Error> {
    let mut decoder = MultiGzDecoder::new(compressed);
    return drain(&mut decoder, compressed.len().saturating_mul(4), cancel);
}

/// Read a stream to its end in chunks, checking the cancellation token
/// between chunks.
fn drain(
    reader: &mut impl Read,
    size_hint: usize,
    cancel: &CancelToken,
) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(size_hint);
    let mut chunk = [0_u8; 8192];
    loop {
        cancel.check()?;
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(bytes),
            Ok(bytes_read) => bytes.extend_from_slice(&chunk[..bytes_read]),
            Err(io_error) if io_error.kind() == ErrorKind::Interrupted => {}
            // the decompressors report corrupt streams as InvalidData
            // and truncated ones as UnexpectedEof, both of which are
            // the container's fault rather than the disk's
            Err(io_error)
                if matches!(
                    io_error.kind(),
                    ErrorKind::InvalidData | ErrorKind::UnexpectedEof
                ) =>
            {
                return Err(Error::Container(io_error.to_string()));
            }
            Err(io_error) => return Err(Error::Io(io_error)),
        }
    }
}

fn container_error(zip_error: ZipError) -> Error {
    match zip_error {
        ZipError::Io(io_error) => return Error::Io(io_error),
        ZipError::FileNotFound => {
            return Error::NotFound("entry not present in the container".to_owned());
        }
        other => return Error::Container(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ZipContainer, gunzip};
    use crate::{CancelToken, Error};
    use flate2::{Compression, write::GzEncoder};
    use pretty_assertions::assert_eq;
    use std::{fs::File, io::Write as _, path::PathBuf};
    use zip::{CompressionMethod, ZipWriter, write::FileOptions};

    fn write_container(entries: &[(&str, &[u8])]) -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let container_path = temp_dir.path().join("container.zip");
        let mut writer = ZipWriter::new(File::create(&container_path).unwrap());
        for (entry_path, entry_bytes) in entries {
            writer
                .start_file(
                    *entry_path,
                    FileOptions::default().compression_method(CompressionMethod::Deflated),
                )
                .unwrap();
            writer.write_all(entry_bytes).unwrap();
        }
        writer.finish().unwrap();
        return (temp_dir, container_path);
    }

    #[test]
    fn lists_entries_in_central_directory_order() {
        let (_temp_dir, container_path) = write_container(&[
            ("zebra.txt", b"last alphabetically, first in the zip"),
            ("alpha.txt", b"first alphabetically, second in the zip"),
        ]);
        let container = ZipContainer::open(&container_path).unwrap();

        let listed: Vec<&str> = container
            .files()
            .iter()
            .map(|file| file.path.as_str())
            .collect();
        assert_eq!(listed, vec!["zebra.txt", "alpha.txt"]);
    }

    #[test]
    fn reports_uncompressed_sizes() {
        let body = b"0123456789".repeat(100);
        let (_temp_dir, container_path) = write_container(&[("big.txt", body.as_slice())]);
        let container = ZipContainer::open(&container_path).unwrap();

        assert_eq!(container.files()[0].size, 1000);
        assert_eq!(
            container
                .read_entry("big.txt", &CancelToken::new())
                .unwrap(),
            body
        );
    }

    #[test]
    fn missing_entry_is_not_found() {
        let (_temp_dir, container_path) = write_container(&[("present.txt", b"here")]);
        let container = ZipContainer::open(&container_path).unwrap();

        let missing = container.read_entry("absent.txt", &CancelToken::new());
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn close_is_idempotent_and_blocks_reads() {
        let (_temp_dir, container_path) = write_container(&[("present.txt", b"here")]);
        let container = ZipContainer::open(&container_path).unwrap();

        container.close();
        container.close();
        assert!(container.is_closed());
        assert!(matches!(
            container.read_entry("present.txt", &CancelToken::new()),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn not_a_zip_is_a_container_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bogus_path = temp_dir.path().join("bogus.zip");
        std::fs::write(&bogus_path, b"definitely not a zip file").unwrap();

        assert!(matches!(
            ZipContainer::open(&bogus_path),
            Err(Error::Container(_))
        ));
    }

    #[test]
    fn cancelled_token_stops_a_read() {
        let (_temp_dir, container_path) = write_container(&[("present.txt", b"here")]);
        let container = ZipContainer::open(&container_path).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            container.read_entry("present.txt", &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn gunzip_round_trips_multi_member_streams() {
        let mut members = Vec::new();
        for chunk in [&b"first member "[..], &b"second member"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk).unwrap();
            members.extend_from_slice(&encoder.finish().unwrap());
        }

        let inflated = gunzip(&members, &CancelToken::new()).unwrap();
        assert_eq!(inflated, b"first member second member");
    }

    #[test]
    fn gunzip_rejects_truncated_input() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"some bytes worth compressing").unwrap();
        let mut compressed = encoder.finish().unwrap();
        compressed.truncate(compressed.len() - 6);

        let truncated = gunzip(&compressed, &CancelToken::new());
        assert!(matches!(truncated, Err(Error::Container(_))));
    }
}
