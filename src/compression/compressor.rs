// src/compression/compressor.rs

//! Streaming zstd compression of finished archives

use super::CompressionLevel;
use crate::config::{CompressionSection, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::options::RunOptions;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Sizes before and after compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionReport {
    pub input_size: u64,
    pub output_size: u64,
}

impl CompressionReport {
    /// Output size as a percentage of input size
    pub fn ratio_percent(&self) -> f64 {
        if self.input_size == 0 {
            0.0
        } else {
            self.output_size as f64 / self.input_size as f64 * 100.0
        }
    }
}

/// zstd compressor with chunked, cancellable streaming
#[derive(Debug, Clone)]
pub struct Compressor {
    level: i32,
    threads: u32,
    chunk_size: usize,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Result<Self> {
        Ok(Self {
            level: level.to_zstd_level()?,
            threads: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn from_config(config: &CompressionSection) -> Result<Self> {
        Ok(Self::new(CompressionLevel::Numeric(config.level))?
            .with_threads(config.threads)
            .with_chunk_size(config.chunk_size))
    }

    /// zstd worker threads; 0 compresses on the calling thread
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    /// Compress `reader` into `writer` one chunk at a time
    ///
    /// Returns the number of input bytes consumed. Cancellation is checked
    /// between chunks.
    pub fn compress_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        writer: W,
        options: &RunOptions,
    ) -> Result<(u64, W)> {
        let codec_error = |e: io::Error| Error::Codec {
            reason: format!("zstd level {}: {}", self.level, e),
        };

        let mut encoder = zstd::Encoder::new(writer, self.level).map_err(codec_error)?;
        if self.threads > 0 {
            encoder.multithread(self.threads).map_err(codec_error)?;
        }
        encoder.include_checksum(true).map_err(codec_error)?;

        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            options.check_cancelled("compress")?;
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(codec_error(e)),
            };
            encoder.write_all(&buffer[..n]).map_err(codec_error)?;
            total += n as u64;
            options.advance(n as u64);
        }

        let writer = encoder.finish().map_err(codec_error)?;
        Ok((total, writer))
    }

    /// Compress `input` into `output`
    ///
    /// Output goes to a temporary `.incomplete` file beside `output` and is
    /// renamed into place only after the encoder finishes. On error or
    /// cancellation the temporary file is deleted.
    pub fn compress_file(
        &self,
        input: &Path,
        output: &Path,
        options: &RunOptions,
    ) -> Result<CompressionReport> {
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(format!("no file name: {}", output.display())))?;

        // Fails here, before any input is read, if the directory is not writable
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".incomplete")
            .tempfile_in(parent)
            .map_err(|e| Error::io(parent, e))?;

        let source = File::open(input).map_err(|e| Error::io(input, e))?;
        let input_size = source.metadata().map_err(|e| Error::io(input, e))?.len();

        info!(
            "Compressing {} (zstd level {}, {} threads)",
            input.display(),
            self.level,
            self.threads
        );
        options.begin("Compressing", input_size);

        let writer = BufWriter::new(temp);
        let (read, writer) = self.compress_stream(source, writer, options)?;
        let temp = writer.into_inner().map_err(|e| Error::io(output, e.into_error()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(temp.path(), e))?;

        let file = temp.persist(output).map_err(|e| Error::io(output, e.error))?;
        let output_size = file.metadata().map_err(|e| Error::io(output, e))?.len();

        let report = CompressionReport {
            input_size: read,
            output_size,
        };
        options.finish("Compression complete");
        info!(
            "Compressed {} -> {} bytes ({:.1}%)",
            report.input_size,
            report.output_size,
            report.ratio_percent()
        );
        debug!("Wrote {}", output.display());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    #[test]
    fn test_compress_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("llvm.tar");
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 97) as u8).collect();
        std::fs::write(&input, &data).unwrap();
        let output = temp_dir.path().join("llvm.tar.zst");

        let compressor = Compressor::new(CompressionLevel::Numeric(3))
            .unwrap()
            .with_chunk_size(4096);
        let report = compressor
            .compress_file(&input, &output, &RunOptions::new())
            .unwrap();

        assert_eq!(report.input_size, data.len() as u64);
        assert!(report.output_size < report.input_size);
        let decoded = zstd::decode_all(File::open(&output).unwrap()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_multithreaded_output_decodes() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.tar");
        std::fs::write(&input, vec![42u8; 2 * 1024 * 1024]).unwrap();
        let output = temp_dir.path().join("in.tar.zst");

        Compressor::new(CompressionLevel::Lowest)
            .unwrap()
            .with_threads(2)
            .compress_file(&input, &output, &RunOptions::new())
            .unwrap();

        let decoded = zstd::decode_all(File::open(&output).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_cancel_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.tar");
        std::fs::write(&input, vec![1u8; 10_000]).unwrap();
        let output = temp_dir.path().join("in.tar.zst");

        let options = RunOptions::new().with_cancel(Arc::new(AtomicBool::new(true)));
        let result = Compressor::new(CompressionLevel::Lowest)
            .unwrap()
            .compress_file(&input, &output, &options);

        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert!(!output.exists());
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("in.tar")]);
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!(
            Compressor::new(CompressionLevel::Numeric(40)),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_unwritable_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.tar");
        std::fs::write(&input, b"x").unwrap();
        let output = temp_dir.path().join("missing-dir").join("out.tar.zst");

        let err = Compressor::new(CompressionLevel::Lowest)
            .unwrap()
            .compress_file(&input, &output, &RunOptions::new())
            .unwrap_err();
        assert!(err.to_string().contains("missing-dir"));
    }
}
