use flate2::read::MultiGzDecoder;
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while opening or reading a line-oriented input file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{} does not exist", path.display())]
    NotFound { path: PathBuf },
    #[error("error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    fn from_open(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// A trait that abstracts sequential, line-oriented access to text data such as
/// VCF bodies and allcount files, regardless of whether the bytes on disk are
/// compressed.
pub trait TextSource: Send {
    /// The path (or label) this source reads from, used in diagnostics.
    fn path(&self) -> &Path;

    /// One-based number of the line most recently returned by `next_line`.
    fn line_number(&self) -> usize;

    /// Returns the next line without its trailing `\n` / `\r\n`, or `None` at
    /// end of input. The slice is only valid until the next call.
    fn next_line<'a>(&'a mut self) -> Result<Option<&'a [u8]>, SourceError>;
}

/// Line reader over any buffered byte stream.
pub struct LineSource {
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    line_active: bool,
    line_number: usize,
    path: PathBuf,
}

impl LineSource {
    /// Wraps an already-open reader. `label` is reported in error messages.
    pub fn from_reader(label: impl Into<PathBuf>, reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            line: Vec::with_capacity(1024),
            line_active: false,
            line_number: 0,
            path: label.into(),
        }
    }
}

impl TextSource for LineSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn line_number(&self) -> usize {
        self.line_number
    }

    fn next_line<'a>(&'a mut self) -> Result<Option<&'a [u8]>, SourceError> {
        if self.line_active {
            self.line.clear();
            self.line_active = false;
        }

        let bytes_read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }

        self.line_number += 1;
        self.line_active = true;
        Ok(Some(&self.line))
    }
}

/// Opens a local text file for line-by-line reading. Gzip (and BGZF) input is
/// detected from its magic bytes and decompressed transparently.
pub fn open_text_source(path: &Path) -> Result<Box<dyn TextSource>, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::from_open(path, e))?;
    let mut reader = BufReader::new(file);

    let compressed = {
        let head = reader.fill_buf().map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        head.len() >= 2 && is_gzip_magic([head[0], head[1]])
    };

    if compressed {
        debug!("Reading {} as gzip-compressed text", path.display());
        let decoder = BufReader::new(MultiGzDecoder::new(reader));
        Ok(Box::new(LineSource::from_reader(path, decoder)))
    } else {
        Ok(Box::new(LineSource::from_reader(path, reader)))
    }
}

fn is_gzip_magic(magic: [u8; 2]) -> bool {
    magic[0] == 0x1F && magic[1] == 0x8B
}
