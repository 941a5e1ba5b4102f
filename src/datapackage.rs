//! Structured view of a datapackage.json file.
//! According to [the spec](https://specs.webrecorder.net/wacz/1.1.1/#datapackage-json):
//!
//! > The file **must** be present at the root of the WACZ which serves as the manifest for the web archive
//! > and is compliant with the [FRICTIONLESS-DATA-PACKAGE](https://specs.frictionlessdata.io/data-package/) specification.
//!
//! A typical manifest looks like this:
//!
//! ```json
//! {
//!   "profile": "data-package",
//!   "wacz_version": "1.1.1",
//!   "created": "2025-05-16T11:03:03.499792020+01:00",
//!   "software": "wacksy 0.1.0",
//!   "resources": [
//!     {
//!       "name": "data.warc",
//!       "path": "archive/data.warc",
//!       "hash": "sha256:210d0810aaf4a4aba556f97bc7fc497d176a8c171d8edab3390e213a41bed145",
//!       "bytes": 4599
//!     },
//!     {
//!       "name": "index.cdxj",
//!       "path": "indexes/index.cdxj",
//!       "hash": "sha256:0494f16f39fbb3744556e1d64be1088109ac35c730f4a30ac3a3b10942340ca3",
//!       "bytes": 543
//!     }
//!   ]
//! }
//! ```
//!
//! This module only reads manifests, and real-world ones stray from the
//! spec often enough that every field is optional here; callers that
//! need the raw value can reach for
//! [`get_json`](crate::Archive::get_json) instead.

use serde::Deserialize;

/// The main datapackage struct.
#[derive(Debug, Deserialize)]
pub struct DataPackage {
    /// In WACZ 1.1.1 this value is `data-package`.
    pub profile: Option<String>,
    /// Version of the WACZ spec the container claims to follow.
    pub wacz_version: Option<String>,
    /// WACZ creation date, usually in RFC 3339 format.
    pub created: Option<String>,
    /// The name of the software that created the WACZ file.
    pub software: Option<String>,
    /// File names, paths, sizes, and fixity for the files the
    /// container says it holds.
    #[serde(default)]
    pub resources: Vec<DataPackageResource>,
}

/// A resource listed in the datapackage.
#[derive(Debug, Deserialize)]
pub struct DataPackageResource {
    #[serde(rename = "name")]
    pub file_name: Option<String>,
    pub path: Option<String>,
    pub hash: Option<String>,
    pub bytes: Option<u64>,
}

impl DataPackage {
    /// The resource entry for an entry path, if the manifest lists it.
    #[must_use]
    pub fn resource(&self, entry_path: &str) -> Option<&DataPackageResource> {
        return self
            .resources
            .iter()
            .find(|resource| resource.path.as_deref() == Some(entry_path));
    }
}

#[cfg(test)]
mod tests {
    use super::DataPackage;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_a_typical_manifest() {
        let manifest = r#"{
            "profile": "data-package",
            "wacz_version": "1.1.1",
            "created": "2025-12-16T09:00:00Z",
            "software": "wacksy 0.1.0",
            "resources": [
                {
                    "name": "data.warc.gz",
                    "path": "archive/data.warc.gz",
                    "hash": "sha256:210d0810aaf4",
                    "bytes": 4599
                }
            ]
        }"#;
        let datapackage: DataPackage = serde_json::from_str(manifest).unwrap();

        assert_eq!(datapackage.profile.as_deref(), Some("data-package"));
        assert_eq!(datapackage.resources.len(), 1);
        let resource = datapackage.resource("archive/data.warc.gz").unwrap();
        assert_eq!(resource.file_name.as_deref(), Some("data.warc.gz"));
        assert_eq!(resource.bytes, Some(4599));
        assert!(datapackage.resource("archive/other.warc").is_none());
    }

    #[test]
    fn tolerates_a_sparse_manifest() {
        let datapackage: DataPackage = serde_json::from_str("{}").unwrap();
        assert!(datapackage.profile.is_none());
        assert!(datapackage.resources.is_empty());
    }
}
