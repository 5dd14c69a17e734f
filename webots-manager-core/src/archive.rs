//! Release archive extraction
//!
//! Extraction sits behind a trait so the version store does not care about
//! the archive format. The default implementation handles plain tar and tar
//! compressed with gzip or bzip2.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ManagerError, Result};

/// Unpacks an archive file into a directory
pub trait ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Tar extractor; compression is detected from the stream header
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    None,
    Gzip,
    Bzip2,
}

impl Codec {
    fn sniff(header: &[u8]) -> Self {
        if header.starts_with(GZIP_MAGIC) {
            Codec::Gzip
        } else if header.starts_with(BZIP2_MAGIC) {
            Codec::Bzip2
        } else {
            Codec::None
        }
    }
}

impl TarExtractor {
    fn unpack<R: Read>(reader: R, archive: &Path, dest: &Path) -> Result<()> {
        let mut tar = tar::Archive::new(reader);
        tar.set_preserve_permissions(true);
        tar.unpack(dest)
            .map_err(|e| ManagerError::ArchiveExtractionFailed {
                archive: archive.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let failed = |reason: String| ManagerError::ArchiveExtractionFailed {
            archive: archive.to_path_buf(),
            reason,
        };

        let mut header = Vec::with_capacity(BZIP2_MAGIC.len());
        File::open(archive)
            .and_then(|file| file.take(BZIP2_MAGIC.len() as u64).read_to_end(&mut header))
            .map_err(|e| failed(e.to_string()))?;
        if header.len() < GZIP_MAGIC.len() {
            return Err(failed("archive is truncated".to_string()));
        }

        let reader = BufReader::new(File::open(archive).map_err(|e| failed(e.to_string()))?);
        let codec = Codec::sniff(&header);
        tracing::debug!(
            "Extracting {:?} tar {} to {}",
            codec,
            archive.display(),
            dest.display()
        );
        match codec {
            Codec::Gzip => Self::unpack(flate2::read::GzDecoder::new(reader), archive, dest),
            Codec::Bzip2 => Self::unpack(bzip2::read::BzDecoder::new(reader), archive, dest),
            Codec::None => Self::unpack(reader, archive, dest),
        }
    }
}
