//! Static file serving for the web front-end.
//!
//! Only files below the configured root are reachable: `..` segments are
//! refused outright and the resolved path is checked against the
//! canonical root, which also catches symlinks pointing outside it.
//! Directories resolve to their `index.html`.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::trace;
use rouille::{Request, Response};

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serves files from `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .with_context(|| format!("Web directory not found: {}", root.display()))?;
        if !root.is_dir() {
            bail!("Web directory is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a decoded URL path to a file inside the root.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in url_path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') || Path::new(segment).has_root() {
                return None;
            }
            path.push(segment);
        }
        if path.is_dir() {
            path.push(INDEX_FILE);
        }

        let path = path.canonicalize().ok()?;
        (path.starts_with(&self.root) && path.is_file()).then_some(path)
    }

    /// File response for `request`, or `None` when nothing matches.
    pub fn serve(&self, request: &Request) -> Option<Response> {
        let path = self.resolve(&request.url())?;
        let file = File::open(&path).ok()?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        trace!("Static: {} -> {}", request.url(), path.display());
        Some(Response::from_file(rouille::extension_to_mime(ext), file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn site() -> (tempfile::TempDir, StaticFiles) {
        let dir = tempfile::tempdir().unwrap();
        let web = dir.path().join("web");
        fs::create_dir_all(web.join("js")).unwrap();
        fs::write(web.join("index.html"), "<html>browse</html>").unwrap();
        fs::write(web.join("js/app.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let files = StaticFiles::new(&web).unwrap();
        (dir, files)
    }

    #[test]
    fn test_resolves_files_and_index() {
        let (_dir, files) = site();
        assert_eq!(files.resolve("/js/app.js"), Some(files.root().join("js/app.js")));
        assert_eq!(files.resolve("/"), Some(files.root().join("index.html")));
        assert_eq!(files.resolve("/./index.html"), Some(files.root().join("index.html")));
        assert_eq!(files.resolve("/missing.css"), None);
        assert_eq!(files.resolve("/js"), None);
    }

    #[test]
    fn test_traversal_is_refused() {
        let (_dir, files) = site();
        assert_eq!(files.resolve("/../secret.txt"), None);
        assert_eq!(files.resolve("/js/../../secret.txt"), None);
        assert_eq!(files.resolve("/js/..\\..\\secret.txt"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_refused() {
        let (dir, files) = site();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), files.root().join("link.txt")).unwrap();
        assert_eq!(files.resolve("/link.txt"), None);
    }

    #[test]
    fn test_serve_sets_mime_type() {
        let (_dir, files) = site();
        let request = Request::fake_http("GET", "/js/app.js", vec![], vec![]);
        let response = files.serve(&request).unwrap();
        assert_eq!(response.status_code, 200);
        let content_type = response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            .map(|(_, v)| v.to_string());
        assert_eq!(content_type.as_deref(), Some("application/javascript"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StaticFiles::new(dir.path().join("nope")).is_err());
    }
}
