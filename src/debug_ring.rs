//! Debug ring: an optional memory-mapped wraparound PCM dump (§4.6).
//!
//! Written unlocked from the audio callback; readers (offline tooling) are
//! expected to tolerate a torn tail, as the spec notes. The file holds raw
//! little-endian native 16-bit PCM, two channels interleaved.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use memmap2::MmapMut;

use crate::error::{PlayerError, Result};

/// Default ring length: 20 seconds of 44100 Hz stereo.
pub const DEFAULT_DUMP_SAMPLES: usize = 20 * 44100 * 2;

pub struct DebugRing {
    map: parking_lot::Mutex<MmapMut>,
    dump_samples: usize,
    cursor: AtomicUsize,
}

impl DebugRing {
    /// Truncate-create `path`, pre-size it to `dump_samples * 2` bytes and
    /// memory-map it read-write.
    pub fn create(path: &Path, dump_samples: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(PlayerError::Io)?;

        let byte_len = dump_samples.checked_mul(2).ok_or_else(|| {
            PlayerError::Config(format!("dump size {dump_samples} samples overflows"))
        })?;
        file.set_len(byte_len as u64).map_err(PlayerError::Io)?;

        // Safety: the file is exclusively ours (just created/truncated) and
        // stays open for the mapping's lifetime via `map`.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(PlayerError::Io)?;

        Ok(DebugRing {
            map: parking_lot::Mutex::new(map),
            dump_samples,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Append produced samples (post byte-swap, i.e. host order) into the
    /// ring at the current cursor, wrapping around as needed, then advance
    /// the cursor. The file itself stores native-endian 16-bit words.
    pub fn write_samples(&self, samples: &[i16]) {
        if samples.is_empty() || self.dump_samples == 0 {
            return;
        }
        let mut map = self.map.lock();
        let mut idx = self.cursor.load(Ordering::Relaxed);
        for &s in samples {
            let bytes = s.to_ne_bytes();
            let off = idx * 2;
            map[off] = bytes[0];
            map[off + 1] = bytes[1];
            idx += 1;
            if idx >= self.dump_samples {
                idx = 0;
            }
        }
        self.cursor.store(idx, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn creates_file_of_expected_size() {
        let tmp = NamedTempFile::new().unwrap();
        let ring = DebugRing::create(tmp.path(), 100).unwrap();
        let metadata = std::fs::metadata(tmp.path()).unwrap();
        assert_eq!(metadata.len(), 200);
        drop(ring);
    }

    #[test]
    fn wraps_around() {
        let tmp = NamedTempFile::new().unwrap();
        let ring = DebugRing::create(tmp.path(), 4).unwrap();
        ring.write_samples(&[1, 2, 3, 4, 5, 6]);
        // Ring holds 4 samples; writing 6 wraps around and overwrites the
        // first two slots with 5 and 6, leaving 3 and 4 from the first pass.
        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(i16::from_ne_bytes([bytes[0], bytes[1]]), 5);
        assert_eq!(i16::from_ne_bytes([bytes[2], bytes[3]]), 6);
        assert_eq!(i16::from_ne_bytes([bytes[4], bytes[5]]), 3);
        assert_eq!(i16::from_ne_bytes([bytes[6], bytes[7]]), 4);
    }
}
