//! Narrow filesystem port used by the file inbound.
//!
//! The adapter never touches `std::fs` directly: it goes through
//! [`FileSystem`], which keeps the protocol logic testable and leaves room
//! for network-backed implementations selected by URI scheme. Today only the
//! local backend is registered; the other recognized schemes validate but
//! report that no backend is available.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::InboundError;

/// Schemes the file inbound recognizes in `transport.vfs.FileURI`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsScheme {
    File,
    Ftp,
    Sftp,
    Ftps,
}

impl VfsScheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "file" => Some(VfsScheme::File),
            "ftp" => Some(VfsScheme::Ftp),
            "sftp" => Some(VfsScheme::Sftp),
            "ftps" => Some(VfsScheme::Ftps),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VfsScheme::File => "file",
            VfsScheme::Ftp => "ftp",
            VfsScheme::Sftp => "sftp",
            VfsScheme::Ftps => "ftps",
        }
    }
}

/// Metadata subset the adapter needs from `stat`.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub len: u64,
    pub modified: SystemTime,
    pub mode: u32,
    pub is_dir: bool,
}

/// One directory entry from `list_dir`.
#[derive(Debug, Clone)]
pub struct DirEntryMeta {
    pub name: String,
    pub is_dir: bool,
}

/// Everything the file inbound needs from a filesystem backend.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryMeta>>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn stat(&self, path: &Path) -> io::Result<FileMeta>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    /// Exclusive create: fails with `AlreadyExists` if the path exists.
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Local-disk backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryMeta>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            entries.push(DirEntryMeta {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileMeta> {
        let meta = std::fs::metadata(path)?;
        Ok(FileMeta {
            len: meta.len(),
            modified: meta.modified()?,
            mode: file_mode(&meta),
            is_dir: meta.is_dir(),
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(contents)
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(mode)
                .create(path)
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            std::fs::create_dir_all(path)
        }
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Ok(())
        }
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

/// Resolve a `transport.vfs` URI to a backend plus the local path it denotes.
///
/// `file://` URIs get the local backend. The network schemes are recognized
/// as valid configuration but no backend is registered for them, which
/// surfaces as a startup diagnostic rather than a parse error.
pub fn resolve_backend(
    uri: &str,
) -> Result<(std::sync::Arc<dyn FileSystem>, PathBuf), InboundError> {
    let parsed = url::Url::parse(uri).map_err(|err| InboundError::InvalidUri {
        uri: uri.to_string(),
        reason: err.to_string(),
    })?;

    let scheme = VfsScheme::parse(parsed.scheme()).ok_or_else(|| InboundError::UnsupportedScheme {
        scheme: parsed.scheme().to_string(),
    })?;

    match scheme {
        VfsScheme::File => {
            let path = parsed
                .to_file_path()
                .map_err(|_| InboundError::InvalidUri {
                    uri: uri.to_string(),
                    reason: "file URI does not denote a local path".to_string(),
                })?;
            Ok((std::sync::Arc::new(OsFileSystem), path))
        }
        other => Err(InboundError::NoRegisteredBackend {
            scheme: other.as_str().to_string(),
        }),
    }
}

/// Resolve the local path of a `file://` URI using an already selected
/// backend (used for move destinations, which must share the source scheme).
pub fn file_uri_to_path(uri: &str) -> Result<PathBuf, InboundError> {
    let parsed = url::Url::parse(uri).map_err(|err| InboundError::InvalidUri {
        uri: uri.to_string(),
        reason: err.to_string(),
    })?;
    if parsed.scheme() != "file" {
        return Err(InboundError::UnsupportedScheme {
            scheme: parsed.scheme().to_string(),
        });
    }
    parsed.to_file_path().map_err(|_| InboundError::InvalidUri {
        uri: uri.to_string(),
        reason: "file URI does not denote a local path".to_string(),
    })
}
