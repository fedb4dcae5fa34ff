//! # Static Files Module
//!
//! [`FileServant`] serves files from a base directory on GET requests whose
//! route resolution left a tail beneath the servant's mount point. The
//! filesystem itself stays external; the servant holds only the base path.
//!
//! Resolution rules, in order: traversal sequences are stripped before the
//! tail is resolved against the base directory; a missing target is 404; a
//! directory serves its `index.html` or 403 when there is none; hidden
//! (dot-named) targets are 403; everything else is served with a detected
//! Content-Type.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::response::Response;

/// Directory-backed terminal servant.
#[derive(Debug, Clone)]
pub struct FileServant {
    base_dir: PathBuf,
}

impl FileServant {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// Map the unmatched tail onto a path under the base directory.
    ///
    /// `..` sequences are removed outright before the walk; any parent or
    /// root component that survives still refuses the lookup.
    fn map_path(&self, remaining: &str) -> Option<PathBuf> {
        let clean = remaining.replace("..", "");
        let clean = clean.trim_start_matches('/');
        let mut target = self.base_dir.clone();
        for comp in Path::new(clean).components() {
            match comp {
                Component::Normal(part) => target.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(target)
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
    }

    fn serve_path(path: &Path) -> Response {
        match fs::read(path) {
            Ok(bytes) => {
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                let mut resp = Response::new(200);
                resp.headers
                    .insert("Content-Type".into(), mime.to_string());
                resp.body = bytes;
                resp
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file read failed");
                Response::not_found(&path.display().to_string())
            }
        }
    }

    /// Serve the unmatched tail of a GET request.
    pub fn serve(&self, remaining: &str) -> Response {
        let target = match self.map_path(remaining) {
            Some(p) => p,
            None => return Response::not_found(remaining),
        };
        if !target.exists() {
            return Response::not_found(remaining);
        }
        if target.is_dir() {
            let index = target.join("index.html");
            if index.is_file() {
                return Self::serve_path(&index);
            }
            return Response::forbidden("directory has no index");
        }
        if Self::is_hidden(&target) {
            return Response::forbidden("hidden file");
        }
        Self::serve_path(&target)
    }
}
