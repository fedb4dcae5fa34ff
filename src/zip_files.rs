//! # Zip Files Module
//!
//! [`ZipServant`] serves files from an archive decoded once, at
//! construction, into an in-memory map of normalized entries. Entry bytes
//! are immutable after load and shared by reference count, so serving never
//! touches the archive again.
//!
//! The lookup understands single-page-application URLs: a trailing slash, a
//! `#` fragment, or an implicit directory all fall through to that
//! directory's `index.html`, which lets client-side routers own everything
//! after the fragment.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use tracing::debug;

use crate::response::Response;

/// Failure while decoding the archive; fatal to servant construction.
#[derive(Debug)]
pub enum ArchiveError {
    /// The byte buffer is not a readable zip archive.
    Malformed(String),
    /// An entry's bytes could not be read out of the archive.
    Entry(String, io::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Malformed(msg) => write!(f, "malformed archive: {msg}"),
            ArchiveError::Entry(name, e) => write!(f, "failed to read entry {name:?}: {e}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// One decoded archive entry. Directory entries carry empty content.
#[derive(Debug, Clone)]
struct ZipEntry {
    name: String,
    data: Arc<[u8]>,
    is_dir: bool,
}

/// Archive-backed terminal servant.
pub struct ZipServant {
    entries: HashMap<String, ZipEntry>,
}

impl ZipServant {
    /// Decode the archive, normalizing entry names by stripping leading
    /// `/` and `./`. Any decode failure aborts construction.
    pub fn from_bytes(archive: &[u8]) -> Result<Self, ArchiveError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive))
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        let mut entries = HashMap::new();
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
            let name = Self::normalize_name(file.name());
            let is_dir = file.is_dir();
            let data: Arc<[u8]> = if is_dir {
                Arc::from(Vec::new())
            } else {
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)
                    .map_err(|e| ArchiveError::Entry(name.clone(), e))?;
                Arc::from(buf)
            };
            entries.insert(
                name.clone(),
                ZipEntry {
                    name,
                    data,
                    is_dir,
                },
            );
        }
        debug!(entry_count = entries.len(), "archive loaded");
        Ok(ZipServant { entries })
    }

    fn normalize_name(raw: &str) -> String {
        let mut name = raw;
        loop {
            if let Some(rest) = name.strip_prefix('/') {
                name = rest;
            } else if let Some(rest) = name.strip_prefix("./") {
                name = rest;
            } else {
                break;
            }
        }
        name.to_string()
    }

    /// Try the key as-is, then with `./` and `/` prefixes.
    fn find_file(&self, path: &str) -> Option<&ZipEntry> {
        self.entries
            .get(path)
            .or_else(|| self.entries.get(&format!("./{path}")))
            .or_else(|| self.entries.get(&format!("/{path}")))
    }

    /// The `index.html` belonging to a directory path ("" means the root).
    fn index_in_directory(&self, dir: &str) -> Option<&ZipEntry> {
        if dir.is_empty() {
            self.find_file("index.html")
        } else {
            self.find_file(&format!("{dir}/index.html"))
        }
    }

    /// True iff any stored key lies beneath `path + "/"`.
    fn is_implicit_directory(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.entries.keys().any(|k| k.starts_with(&prefix))
    }

    fn serve_entry(entry: &ZipEntry) -> Response {
        let mime = mime_guess::from_path(&entry.name).first_or_octet_stream();
        let mut resp = Response::new(200);
        resp.headers
            .insert("Content-Type".into(), mime.to_string());
        resp.body = entry.data.to_vec();
        resp
    }

    /// Serve the unmatched tail of a GET request.
    ///
    /// Resolution order: exact file match; root index for an empty path;
    /// directory index for a trailing slash; directory index when a `#`
    /// fragment is present (SPA fall-through); directory index for an
    /// implicit directory; 404.
    pub fn serve(&self, remaining: &str) -> Response {
        let mut sanitized = remaining.strip_prefix('/').unwrap_or(remaining).to_string();
        if let Some(q) = sanitized.find('?') {
            sanitized.truncate(q);
        }
        let sanitized = sanitized.replace("..", "");

        let (directory_path, has_fragment) = match sanitized.find('#') {
            Some(h) => (sanitized[..h].trim_end_matches('/').to_string(), true),
            None => (sanitized.trim_end_matches('/').to_string(), false),
        };

        if let Some(entry) = self.find_file(&sanitized).filter(|e| !e.is_dir) {
            return Self::serve_entry(entry);
        }
        let index = if sanitized.is_empty() {
            self.index_in_directory("")
        } else if sanitized.ends_with('/') {
            self.index_in_directory(&directory_path)
        } else if has_fragment {
            self.index_in_directory(&directory_path)
        } else if self.is_implicit_directory(&sanitized) {
            self.index_in_directory(&sanitized)
        } else {
            None
        };
        match index.filter(|e| !e.is_dir) {
            Some(entry) => Self::serve_entry(entry),
            None => Response::not_found(remaining),
        }
    }

    /// Number of decoded entries, directories included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default();
            for (name, content) in files {
                if name.ends_with('/') {
                    writer.add_directory(name.trim_end_matches('/'), options).unwrap();
                } else {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(content.as_bytes()).unwrap();
                }
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn spa_servant() -> ZipServant {
        ZipServant::from_bytes(&archive(&[
            ("index.html", "<h1>root</h1>"),
            ("admin/", ""),
            ("admin/index.html", "<h1>admin</h1>"),
            ("admin/app.js", "console.log('admin');"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_exact_file_match() {
        let servant = spa_servant();
        let resp = servant.serve("admin/app.js");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"console.log('admin');");
        assert!(resp
            .headers
            .get("Content-Type")
            .is_some_and(|ct| ct.contains("javascript")));
    }

    #[test]
    fn test_empty_path_serves_root_index() {
        let resp = spa_servant().serve("");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"<h1>root</h1>");
    }

    #[test]
    fn test_trailing_slash_serves_directory_index() {
        let resp = spa_servant().serve("admin/");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"<h1>admin</h1>");
    }

    #[test]
    fn test_fragment_falls_through_to_directory_index() {
        let resp = spa_servant().serve("admin/#/users");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"<h1>admin</h1>");
        assert_eq!(
            resp.headers.get("Content-Type").map(String::as_str),
            Some("text/html")
        );
    }

    #[test]
    fn test_implicit_directory_serves_index() {
        let resp = spa_servant().serve("admin");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"<h1>admin</h1>");
    }

    #[test]
    fn test_traversal_is_rejected() {
        let resp = spa_servant().serve("../../etc/passwd");
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_missing_entry_is_404() {
        assert_eq!(spa_servant().serve("nope.txt").status, 404);
    }

    #[test]
    fn test_loaded_entries_round_trip() {
        let files = [("a.txt", "alpha"), ("dir/b.txt", "beta")];
        let servant = ZipServant::from_bytes(&archive(&files)).unwrap();
        for (name, content) in files {
            assert_eq!(servant.serve(name).body, content.as_bytes());
        }
    }

    #[test]
    fn test_garbage_archive_fails_construction() {
        assert!(ZipServant::from_bytes(b"not a zip archive").is_err());
    }
}
