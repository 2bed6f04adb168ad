//! On-disk cache of parsed TrueType metrics.
//!
//! One JSON file per (family, style), named `{family}{style}.mtx.json`. A
//! record is only reused when the source signature and the kerning and
//! subsetting flags it was built with all match the current request.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::fonts::{FontMetrics, FontStyle};

/// SHA-256 of the font program, hex encoded.
pub fn source_signature(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    signature: String,
    use_kerning: bool,
    subsetting: bool,
    metrics: FontMetrics,
}

#[derive(Debug, Clone)]
pub struct MetricsCache {
    dir: PathBuf,
}

impl MetricsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, family: &str, style: FontStyle) -> PathBuf {
        self.dir.join(format!("{family}{}.mtx.json", style.code()))
    }

    /// Return cached metrics, or `None` on a miss, a stale record or an
    /// unreadable file.
    pub fn load(
        &self,
        family: &str,
        style: FontStyle,
        signature: &str,
        use_kerning: bool,
        subsetting: bool,
    ) -> Option<FontMetrics> {
        let path = self.path_for(family, style);
        let text = fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("ignoring corrupt metrics cache {}: {e}", path.display());
                return None;
            }
        };
        if record.signature != signature {
            log::debug!("metrics cache {} stale: font file changed", path.display());
            return None;
        }
        if record.use_kerning != use_kerning || record.subsetting != subsetting {
            log::debug!("metrics cache {} stale: option flags changed", path.display());
            return None;
        }
        log::debug!("metrics cache hit: {}", path.display());
        Some(record.metrics)
    }

    pub fn store(
        &self,
        family: &str,
        style: FontStyle,
        signature: &str,
        use_kerning: bool,
        subsetting: bool,
        metrics: &FontMetrics,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let record = CacheRecord {
            signature: signature.to_string(),
            use_kerning,
            subsetting,
            metrics: metrics.clone(),
        };
        fs::write(self.path_for(family, style), serde_json::to_vec(&record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_fonts::core_metrics;

    fn sample() -> FontMetrics {
        core_metrics("helvetica", FontStyle::empty()).unwrap()
    }

    #[test]
    fn signature_is_hex_sha256() {
        let sig = source_signature(b"abc");
        assert_eq!(sig, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn store_then_load_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetricsCache::new(dir.path());
        cache.store("dejavusans", FontStyle::BOLD, "sig", true, true, &sample()).unwrap();
        assert!(dir.path().join("dejavusansB.mtx.json").exists());
        let hit = cache.load("dejavusans", FontStyle::BOLD, "sig", true, true);
        assert_eq!(hit, Some(sample()));
    }

    #[test]
    fn signature_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetricsCache::new(dir.path());
        cache.store("f", FontStyle::empty(), "old", true, true, &sample()).unwrap();
        assert!(cache.load("f", FontStyle::empty(), "new", true, true).is_none());
    }

    #[test]
    fn flag_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetricsCache::new(dir.path());
        cache.store("f", FontStyle::empty(), "sig", true, true, &sample()).unwrap();
        assert!(cache.load("f", FontStyle::empty(), "sig", false, true).is_none());
        assert!(cache.load("f", FontStyle::empty(), "sig", true, false).is_none());
    }

    #[test]
    fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.mtx.json"), b"{not json").unwrap();
        let cache = MetricsCache::new(dir.path());
        assert!(cache.load("f", FontStyle::empty(), "sig", true, true).is_none());
    }
}
