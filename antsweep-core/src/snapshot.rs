//! Binary snapshots of sweep results.

use std::convert::TryFrom;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::result::RunResult;
use crate::{Result, VERSION};

/// First byte of snapshot data, marks how the payload is encoded.
const RAW_MARKER: u8 = 0;
const LZ4_MARKER: u8 = 1;

/// Collection of run results together with some metadata, as persisted at
/// the end of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub results: Vec<RunResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created: DateTime<Utc>,
    /// Version of the library that created the snapshot
    pub version: String,
}

impl From<Vec<RunResult>> for Snapshot {
    fn from(results: Vec<RunResult>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                created: Utc::now(),
                version: VERSION.to_string(),
            },
            results,
        }
    }
}

impl TryFrom<&[u8]> for Snapshot {
    type Error = Error;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        let (marker, payload) = match bytes.split_first() {
            Some((m, p)) => (*m, p),
            None => return Err(Error::FailedReadingSnapshot("empty snapshot".to_string())),
        };
        let snapshot: Snapshot = match marker {
            RAW_MARKER => bincode::deserialize(payload)
                .map_err(|e| Error::FailedReadingSnapshot(e.to_string()))?,
            #[cfg(feature = "lz4")]
            LZ4_MARKER => {
                let data = lz4::block::decompress(payload, None)
                    .map_err(|e| Error::SnapshotDecompressionError(e.to_string()))?;
                bincode::deserialize(&data)
                    .map_err(|e| Error::FailedReadingSnapshot(e.to_string()))?
            }
            m => {
                return Err(Error::FailedReadingSnapshot(format!(
                    "unsupported snapshot encoding: {}",
                    m
                )))
            }
        };
        Ok(snapshot)
    }
}

impl Snapshot {
    /// Serializes the snapshot. Compression is only applied with the `lz4`
    /// feature enabled.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>> {
        let data: Vec<u8> =
            bincode::serialize(&self).map_err(|e| Error::FailedCreatingSnapshot(e.to_string()))?;
        #[cfg(feature = "lz4")]
        {
            if compress {
                let mut out = vec![LZ4_MARKER];
                out.extend(lz4::block::compress(&data, None, true)?);
                return Ok(out);
            }
        }
        #[cfg(not(feature = "lz4"))]
        {
            if compress {
                warn!("lz4 feature disabled, writing uncompressed snapshot");
            }
        }
        let mut out = Vec::with_capacity(data.len() + 1);
        out.push(RAW_MARKER);
        out.extend(data);
        Ok(out)
    }

    pub fn write_to(&self, path: &Path, compress: bool) -> Result<()> {
        let bytes = self.to_bytes(compress)?;
        fs::write(path, &bytes)?;
        debug!(
            "wrote snapshot with {} results to {} ({} bytes)",
            self.results.len(),
            path.to_string_lossy(),
            bytes.len()
        );
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Snapshot::try_from(bytes.as_slice())
    }
}

/// Writes results to a snapshot file at the given path.
pub fn write_snapshot(path: &Path, results: Vec<RunResult>, compress: bool) -> Result<()> {
    Snapshot::from(results).write_to(path, compress)
}

/// Reads results back from a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<Vec<RunResult>> {
    Ok(Snapshot::read_from(path)?.results)
}
