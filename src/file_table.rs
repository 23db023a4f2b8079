use std::io;
use std::path::Path;

/// The index of a file loaded into a [`FileTable`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileNo(u16);

/// A grow-only table of loaded file contents.
///
/// External segments reference a window into one of these files instead of
/// owning their text. The table is only ever appended to, so a `FileNo`
/// stays valid for the lifetime of the table.
#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<String>,
}

impl FileTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the file at `path` and returns its index.
    ///
    /// This is the only fallible boundary of the engine: the underlying
    /// operating-system error is returned as-is.
    pub fn open(&mut self, path: impl AsRef<Path>) -> io::Result<FileNo> {
        assert!(self.files.len() < (u16::MAX / 2) as usize);

        let contents = std::fs::read_to_string(path)?;
        self.files.push(contents);
        Ok(FileNo((self.files.len() - 1) as u16))
    }

    /// The full contents of a loaded file.
    #[inline]
    pub fn get(&self, file: FileNo) -> &str {
        &self.files[file.0 as usize]
    }
}
