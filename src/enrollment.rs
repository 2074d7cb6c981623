//! Enrollment profile persistence
//!
//! One profile record per installation: the averaged speaker embedding plus
//! an optional locker-password hash gating re-enrollment. The profile is
//! replaced wholesale on re-enrollment, never merged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// File name of the profile record inside the data directory
const PROFILE_FILE: &str = "profile.json";

/// The enrolled speaker template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentProfile {
    embedding: Vec<f32>,
}

impl EnrollmentProfile {
    /// Wrap an averaged embedding into a profile
    #[must_use]
    pub const fn new(embedding: Vec<f32>) -> Self {
        Self { embedding }
    }

    /// The fixed-length speaker embedding
    #[must_use]
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// On-disk record: profile plus optional locker-password hash
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRecord {
    embedding: Option<Vec<f32>>,
    password_hash: Option<String>,
}

/// Persists the single enrollment profile and locker password
///
/// Overwrite policy: once a locker password is set, `save` replaces the
/// profile only when the confirmation candidate matches. With no password
/// ever set, overwrite is unconditional (first-enrollment bootstrap).
pub struct EnrollmentStore {
    path: PathBuf,
}

impl EnrollmentStore {
    /// Create a store rooted at the given data directory
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PROFILE_FILE),
        }
    }

    /// Load the enrolled profile, if any
    ///
    /// # Errors
    ///
    /// Returns error if the record exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<EnrollmentProfile>> {
        Ok(self
            .read_record()?
            .embedding
            .map(EnrollmentProfile::new))
    }

    /// Replace the enrolled profile
    ///
    /// `confirmation` is checked against the stored locker password when one
    /// is set. The previously stored profile is left untouched on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordMismatch`] if confirmation fails, or a
    /// storage error if the record cannot be written
    pub fn save(&self, profile: &EnrollmentProfile, confirmation: Option<&str>) -> Result<()> {
        let mut record = self.read_record()?;

        if let Some(hash) = &record.password_hash {
            let confirmed = confirmation.is_some_and(|candidate| *hash == hash_password(candidate));
            if !confirmed {
                tracing::warn!("profile overwrite rejected: locker password mismatch");
                return Err(Error::PasswordMismatch);
            }
        }

        record.embedding = Some(profile.embedding().to_vec());
        self.write_record(&record)?;
        tracing::info!(path = %self.path.display(), "enrollment profile saved");
        Ok(())
    }

    /// Set (or replace) the locker password
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    pub fn set_password(&self, password: &str) -> Result<()> {
        let mut record = self.read_record()?;
        record.password_hash = Some(hash_password(password));
        self.write_record(&record)?;
        tracing::info!("locker password updated");
        Ok(())
    }

    /// Whether a locker password has ever been set
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be read
    pub fn has_password(&self) -> Result<bool> {
        Ok(self.read_record()?.password_hash.is_some())
    }

    /// Check a candidate against the stored locker password
    ///
    /// With no password set, any candidate confirms (bootstrap case).
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be read
    pub fn confirm_password(&self, candidate: &str) -> Result<bool> {
        Ok(self
            .read_record()?
            .password_hash
            .as_ref()
            .is_none_or(|hash| *hash == hash_password(candidate)))
    }

    fn read_record(&self) -> Result<StoredRecord> {
        if !self.path.exists() {
            return Ok(StoredRecord::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("read {}: {e}", self.path.display())))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_record(&self, record: &StoredRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Storage(format!("write {}: {e}", self.path.display())))?;
        Ok(())
    }
}

/// SHA-256 hash of the locker password, hex encoded
fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, EnrollmentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EnrollmentStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_load_without_record() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_none());
        assert!(!store.has_password().unwrap());
    }

    #[test]
    fn test_save_then_load_roundtrips() {
        let (_dir, store) = store();
        let profile = EnrollmentProfile::new(vec![0.25, -0.5, 0.75]);

        store.save(&profile, None).unwrap();
        let loaded = store.load().unwrap().unwrap();

        for (a, b) in loaded.embedding().iter().zip(profile.embedding()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_overwrite_without_password_is_unconditional() {
        let (_dir, store) = store();
        store
            .save(&EnrollmentProfile::new(vec![1.0]), None)
            .unwrap();
        store
            .save(&EnrollmentProfile::new(vec![2.0]), None)
            .unwrap();

        assert_eq!(store.load().unwrap().unwrap().embedding(), &[2.0]);
    }

    #[test]
    fn test_wrong_password_leaves_profile_unchanged() {
        let (_dir, store) = store();
        store
            .save(&EnrollmentProfile::new(vec![1.0]), None)
            .unwrap();
        store.set_password("open sesame").unwrap();

        let err = store
            .save(&EnrollmentProfile::new(vec![9.0]), Some("wrong"))
            .unwrap_err();
        assert!(matches!(err, Error::PasswordMismatch));

        let missing = store
            .save(&EnrollmentProfile::new(vec![9.0]), None)
            .unwrap_err();
        assert!(matches!(missing, Error::PasswordMismatch));

        assert_eq!(store.load().unwrap().unwrap().embedding(), &[1.0]);
    }

    #[test]
    fn test_correct_password_allows_overwrite() {
        let (_dir, store) = store();
        store
            .save(&EnrollmentProfile::new(vec![1.0]), None)
            .unwrap();
        store.set_password("open sesame").unwrap();

        store
            .save(&EnrollmentProfile::new(vec![3.0]), Some("open sesame"))
            .unwrap();
        assert_eq!(store.load().unwrap().unwrap().embedding(), &[3.0]);
    }

    #[test]
    fn test_confirm_password() {
        let (_dir, store) = store();

        // Bootstrap: anything confirms before a password exists
        assert!(store.confirm_password("whatever").unwrap());

        store.set_password("secret").unwrap();
        assert!(store.confirm_password("secret").unwrap());
        assert!(!store.confirm_password("guess").unwrap());
        assert!(store.has_password().unwrap());
    }

    #[test]
    fn test_password_survives_profile_overwrite() {
        let (_dir, store) = store();
        store.set_password("secret").unwrap();
        store
            .save(&EnrollmentProfile::new(vec![1.0]), Some("secret"))
            .unwrap();

        assert!(store.has_password().unwrap());
        assert!(store.confirm_password("secret").unwrap());
    }
}
