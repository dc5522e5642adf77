// ─────────────────────────────────────────────────────────────────────
// SCPN GLE Core — Artifact Cache
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! File-backed cache of stage outputs as `.npy` arrays.
//!
//! A missing or unreadable file is a miss, never an error. The directory also
//! holds a fingerprint of the settings the artifacts were computed with; a
//! different fingerprint clears the cached arrays on open.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use gle_types::error::{GleError, GleResult};
use ndarray_npy::{read_npy, write_npy, ReadNpyExt, WriteNpyExt};
use tracing::{debug, info, warn};

const FINGERPRINT_FILE: &str = "fingerprint.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Trajectories,
    Times,
    InitialMean,
    Correlation,
    Drift,
    Kernel,
    Forces,
    ForceMean,
    ForceCovariance,
    NoiseFactor,
    Simulated,
}

impl Artifact {
    pub const ALL: [Artifact; 11] = [
        Artifact::Trajectories,
        Artifact::Times,
        Artifact::InitialMean,
        Artifact::Correlation,
        Artifact::Drift,
        Artifact::Kernel,
        Artifact::Forces,
        Artifact::ForceMean,
        Artifact::ForceCovariance,
        Artifact::NoiseFactor,
        Artifact::Simulated,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Trajectories => "trajectories.npy",
            Artifact::Times => "times.npy",
            Artifact::InitialMean => "initial_mean.npy",
            Artifact::Correlation => "correlation.npy",
            Artifact::Drift => "drift.npy",
            Artifact::Kernel => "kernel.npy",
            Artifact::Forces => "forces.npy",
            Artifact::ForceMean => "force_mean.npy",
            Artifact::ForceCovariance => "force_covariance.npy",
            Artifact::NoiseFactor => "noise_factor.npy",
            Artifact::Simulated => "simulated.npy",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name().trim_end_matches(".npy"))
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (creating if needed) the cache directory.
    pub fn open(root: impl Into<PathBuf>) -> GleResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open and drop every cached array unless the stored fingerprint equals
    /// `fingerprint`. The new fingerprint is written afterwards.
    pub fn open_with_fingerprint(root: impl Into<PathBuf>, fingerprint: &str) -> GleResult<Self> {
        let cache = Self::open(root)?;
        let path = cache.root.join(FINGERPRINT_FILE);
        let stored = fs::read_to_string(&path).ok();
        if stored.as_deref() != Some(fingerprint) {
            if stored.is_some() {
                info!(root = %cache.root.display(), "settings changed, clearing cached artifacts");
            }
            cache.clear()?;
            fs::write(&path, fingerprint)?;
        }
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    pub fn contains(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    pub fn load<T: ReadNpyExt>(&self, artifact: Artifact) -> Option<T> {
        let path = self.path(artifact);
        if !path.is_file() {
            debug!(%artifact, "cache miss");
            return None;
        }
        match read_npy(&path) {
            Ok(value) => {
                debug!(%artifact, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(%artifact, error = %e, "unreadable cached artifact, recomputing");
                None
            }
        }
    }

    pub fn store<T: WriteNpyExt>(&self, artifact: Artifact, value: &T) -> GleResult<()> {
        write_npy(self.path(artifact), value)?;
        debug!(%artifact, "artifact stored");
        Ok(())
    }

    pub fn remove(&self, artifact: Artifact) -> GleResult<()> {
        match fs::remove_file(self.path(artifact)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GleError::Io(e)),
        }
    }

    pub fn clear(&self) -> GleResult<()> {
        Artifact::ALL.iter().try_for_each(|&a| self.remove(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(dir.path().join("out")).unwrap();
        let a = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64);
        cache.store(Artifact::Drift, &a).unwrap();
        assert!(cache.contains(Artifact::Drift));
        let back: Array2<f64> = cache.load(Artifact::Drift).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_miss_and_wrong_rank_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(dir.path()).unwrap();
        assert!(cache.load::<Array2<f64>>(Artifact::Kernel).is_none());
        cache.store(Artifact::Kernel, &Array2::<f64>::zeros((2, 2))).unwrap();
        assert!(cache.load::<Array3<f64>>(Artifact::Kernel).is_none());
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(dir.path()).unwrap();
        cache.remove(Artifact::Forces).unwrap();
        cache.store(Artifact::Forces, &Array3::<f64>::zeros((2, 2, 1))).unwrap();
        cache.remove(Artifact::Forces).unwrap();
        assert!(!cache.contains(Artifact::Forces));
    }

    #[test]
    fn test_fingerprint_change_clears() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open_with_fingerprint(dir.path(), "a").unwrap();
        cache.store(Artifact::Correlation, &Array2::<f64>::eye(2)).unwrap();

        let same = ArtifactCache::open_with_fingerprint(dir.path(), "a").unwrap();
        assert!(same.contains(Artifact::Correlation));

        let changed = ArtifactCache::open_with_fingerprint(dir.path(), "b").unwrap();
        assert!(!changed.contains(Artifact::Correlation));
    }
}
