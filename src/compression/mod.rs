// src/compression/mod.rs
//! Compression formats and codecs
//!
//! Packaged archives are always written as zstd. Reading accepts gzip, xz
//! and zstd so upstream tarballs and older artifacts can be unpacked too.

mod compressor;

pub use compressor::{CompressionReport, Compressor};

use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw tar)
    None,
    /// Gzip (.gz, .tgz)
    Gzip,
    /// XZ/LZMA (.xz)
    Xz,
    /// Zstandard (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    ///
    /// ```
    /// use toolpack::compression::CompressionFormat;
    ///
    /// assert_eq!(CompressionFormat::from_extension("llvm.tar.zst"), CompressionFormat::Zstd);
    /// assert_eq!(CompressionFormat::from_extension("llvm.tar.xz"), CompressionFormat::Xz);
    /// assert_eq!(CompressionFormat::from_extension("llvm.tar"), CompressionFormat::None);
    /// ```
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") || path.ends_with(".tgz") {
            Self::Gzip
        } else if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect from the file's first bytes, falling back to its extension
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 6];
        let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let mut filled = 0;
        while filled < header.len() {
            match file.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(path, e)),
            }
        }

        match Self::from_magic_bytes(&header[..filled]) {
            Self::None => Ok(Self::from_extension(&path.to_string_lossy())),
            format => Ok(format),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
            Self::Zstd => ".zst",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// zstd effort selection
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// zstd 1
    Lowest,
    /// zstd 22, used for published archives
    #[default]
    Highest,
    /// zstd 15
    Default,
    /// zstd 1..=22
    Numeric(i32),
}

impl CompressionLevel {
    /// Resolve to a zstd level, rejecting values outside 1..=22
    pub fn to_zstd_level(self) -> Result<i32> {
        match self {
            Self::Lowest => Ok(1),
            Self::Highest => Ok(22),
            Self::Default => Ok(15),
            Self::Numeric(n) => {
                if (1..=22).contains(&n) {
                    Ok(n)
                } else {
                    Err(Error::Codec {
                        reason: format!("zstd compression level must be between 1 and 22, got {}", n),
                    })
                }
            }
        }
    }
}

/// Wrap `reader` in a decoder for `format`
///
/// `CompressionFormat::None` returns the reader unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| Error::Codec {
                reason: format!("cannot create zstd decoder: {}", e),
            })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Open a file and wrap it in the decoder its contents call for
pub fn open_decoder(path: &Path) -> Result<(CompressionFormat, Box<dyn Read>)> {
    let format = CompressionFormat::detect(path)?;
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = std::io::BufReader::new(file);
    Ok((format, create_decoder(reader, format)?))
}
