//! File-backed append store.

use super::AppendStore;
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default reverse-read window for file stores (one page).
pub const DEFAULT_READ_WINDOW: usize = 4096;

/// Append store over a single file.
///
/// The file is opened in append mode, so writes always land at the tail no
/// matter where the last read left the cursor.
#[derive(Debug)]
pub struct FileStore {
    /// Path of the backing file, also used as the store id
    id: String,
    path: PathBuf,
    file: Mutex<File>,
    /// Tracked length so `len()` never touches the filesystem
    len: AtomicU64,
    read_window: usize,
    read_ops: AtomicU64,
}

impl FileStore {
    /// Open or create a file store with the default read window.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_window(path, DEFAULT_READ_WINDOW)
    }

    /// Open or create a file store reading `read_window` bytes per reverse read.
    ///
    /// Missing parent directories are created.
    pub fn open_with_window<P: AsRef<Path>>(path: P, read_window: usize) -> Result<Self> {
        if read_window == 0 {
            return Err(Error::invalid_argument("read_window must be > 0"));
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        log::debug!("Opened file store {:?} ({} bytes)", path, len);

        Ok(Self {
            id: path.to_string_lossy().into_owned(),
            path,
            file: Mutex::new(file),
            len: AtomicU64::new(len),
            read_window,
            read_ops: AtomicU64::new(0),
        })
    }

    /// Flush and fsync everything appended so far.
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Get the path to the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of `reverse_read` calls served.
    pub fn read_ops(&self) -> u64 {
        self.read_ops.load(Ordering::Relaxed)
    }
}

impl AppendStore for FileStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    fn append(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut file = self.file.lock();
        file.write_all(data)?;
        self.len.fetch_add(data.len() as u64, Ordering::Release);
        Ok(())
    }

    fn reverse_read(&self, from_inclusive: u64) -> Result<Option<Bytes>> {
        let len = self.len();
        if from_inclusive >= len {
            return Ok(None);
        }
        self.read_ops.fetch_add(1, Ordering::Relaxed);

        let end = from_inclusive + 1;
        let start = end.saturating_sub(self.read_window as u64);
        let mut buffer = vec![0u8; (end - start) as usize];

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buffer)?;

        Ok(Some(Bytes::from(buffer)))
    }
}
