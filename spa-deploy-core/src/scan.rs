//! Local build directory scanner.
//!
//! [`LocalScan`] walks the build root lazily and yields one [`LocalFile`] per regular file
//! that passes the include/ignore globs, hashing each file as it is reached.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{ConfigError, ScanError};
use crate::glob::GlobList;

/// A file found under the build root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute (or root-joined) filesystem path.
    pub path: PathBuf,
    /// Storage key: path relative to the root, `/`-separated.
    pub key: String,
    pub size: u64,
    /// Lowercase hex MD5 of the file contents.
    pub hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub root: PathBuf,
    /// Patterns a key must match; empty means everything.
    pub include_glob: Vec<String>,
    pub ignore_glob: Vec<String>,
}

/// Lazy, single-pass scan of a build directory.
pub struct LocalScan {
    root: PathBuf,
    walker: walkdir::IntoIter,
    include: Option<GlobList>,
    ignore: GlobList,
    seen: HashSet<String>,
}

impl LocalScan {
    pub fn new(options: &ScanOptions) -> Result<Self, ConfigError> {
        let include = if options.include_glob.is_empty() {
            None
        } else {
            Some(GlobList::new(&options.include_glob)?)
        };
        let ignore = GlobList::new(&options.ignore_glob)?;
        debug!(
            root = %options.root.display(),
            include = ?options.include_glob,
            ignore = ?options.ignore_glob,
            "Scanning local build directory"
        );
        Ok(Self {
            root: options.root.clone(),
            walker: WalkDir::new(&options.root).follow_links(true).into_iter(),
            include,
            ignore,
            seen: HashSet::new(),
        })
    }

    fn accepts(&self, key: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |g| g.is_match(key));
        included && !self.ignore.is_match(key)
    }
}

impl Iterator for LocalScan {
    type Item = Result<LocalFile, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(Err(ScanError::Walk { path, source }));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = storage_key(&self.root, entry.path()) else {
                continue;
            };
            if !self.accepts(&key) || !self.seen.insert(key.clone()) {
                trace!(key = %key, "Skipping filtered or duplicate file");
                continue;
            }
            return Some(local_file(entry.into_path(), key));
        }
    }
}

fn local_file(path: PathBuf, key: String) -> Result<LocalFile, ScanError> {
    let io_err = |source| ScanError::Io {
        path: path.clone(),
        source,
    };
    let size = std::fs::metadata(&path).map_err(io_err)?.len();
    let hash = file_md5(&path).map_err(io_err)?;
    Ok(LocalFile {
        path,
        key,
        size,
        hash,
    })
}

/// Relative, `/`-joined key for `path` under `root`.
fn storage_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Streaming MD5 of a file, hex encoded.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of an in-memory buffer, hex encoded.
pub fn bytes_md5(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
