//! Calibration profile storage
//!
//! The fitted interval is computed once per session and then only read. The
//! store publishes it behind a lock and optionally persists it as JSON so a
//! restarted worker does not have to re-extract the reference recordings.

use crate::classifier::{ConfidenceClassifier, FittedClassifier};
use crate::error::CalibrationError;
use crate::features::FeatureExtractor;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use poise_types::{CalibrationSet, ConfidenceInterval, NanPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fitted interval plus how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub version: i32,
    pub created_at: String,
    /// Reference recordings the interval was fitted on
    pub sources: Vec<String>,
    pub sigma_multiplier: f64,
    #[serde(default)]
    pub nan_policy: NanPolicy,
    pub interval: ConfidenceInterval,
}

impl CalibrationProfile {
    pub fn new(
        sources: Vec<String>,
        classifier: &ConfidenceClassifier,
        interval: ConfidenceInterval,
    ) -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now().to_rfc3339(),
            sources,
            sigma_multiplier: classifier.sigma_multiplier,
            nan_policy: classifier.nan_policy,
            interval,
        }
    }

    /// Classifier bound to this profile's interval
    pub fn classifier(&self) -> Result<FittedClassifier, CalibrationError> {
        ConfidenceClassifier::new(self.sigma_multiplier, self.nan_policy).restore(self.interval)
    }

    /// Why this profile does not fit the given settings, if it does not.
    /// An empty `sources` list accepts any recordings.
    pub fn mismatch<P: AsRef<Path>>(
        &self,
        classifier: &ConfidenceClassifier,
        sources: &[P],
    ) -> Option<String> {
        if self.sigma_multiplier != classifier.sigma_multiplier {
            return Some(format!(
                "fitted with sigma {} but {} is configured",
                self.sigma_multiplier, classifier.sigma_multiplier
            ));
        }
        if self.nan_policy != classifier.nan_policy {
            return Some(format!(
                "fitted with NaN policy {:?} but {:?} is configured",
                self.nan_policy, classifier.nan_policy
            ));
        }
        if !sources.is_empty() {
            let mut wanted: Vec<String> = sources
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect();
            let mut fitted = self.sources.clone();
            wanted.sort();
            fitted.sort();
            if wanted != fitted {
                return Some("calibration sources changed".to_string());
            }
        }
        None
    }
}

/// Extract every reference recording and fit the interval.
///
/// Any undecodable file aborts the whole calibration.
pub fn calibrate_from_files<P: AsRef<Path>>(
    extractor: &FeatureExtractor,
    classifier: &ConfidenceClassifier,
    paths: &[P],
) -> Result<CalibrationProfile> {
    let mut set = CalibrationSet::default();
    let mut sources = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let features = extractor
            .extract_file(path)
            .with_context(|| format!("Failed to calibrate on {:?}", path))?;
        tracing::debug!("Calibration sample {:?}: {:?}", path, features);
        set.push(features);
        sources.push(path.display().to_string());
    }

    let fitted = classifier.fit(&set)?;

    tracing::info!(
        "Calibrated on {} recording(s), ±{}σ:\n{}",
        set.len(),
        classifier.sigma_multiplier,
        fitted.interval()
    );

    Ok(CalibrationProfile::new(sources, classifier, *fitted.interval()))
}

/// Slot contents: the profile plus whether this process fitted it
#[derive(Default)]
struct Slot {
    profile: Option<CalibrationProfile>,
    /// False for a profile loaded from disk
    fitted_here: bool,
}

/// Holds the session's calibration profile
pub struct CalibrationStore {
    path: Option<PathBuf>,
    slot: Arc<RwLock<Slot>>,
}

impl CalibrationStore {
    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            slot: Arc::new(RwLock::new(Slot::default())),
        }
    }

    /// Store backed by a JSON file.
    ///
    /// A saved profile is reused only if it was fitted with the same sigma
    /// multiplier, NaN policy and (when `sources` is non-empty) the same
    /// reference recordings. Otherwise it is ignored and replaced by the next fit.
    pub fn open<P: AsRef<Path>>(
        path: PathBuf,
        classifier: &ConfidenceClassifier,
        sources: &[P],
    ) -> Result<Self> {
        let profile = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read calibration profile {:?}", path))?;
            let profile: CalibrationProfile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse calibration profile {:?}", path))?;

            match profile.mismatch(classifier, sources) {
                Some(reason) => {
                    tracing::warn!(
                        "Ignoring calibration profile {:?}: {}; it will be refitted",
                        path,
                        reason
                    );
                    None
                }
                None => {
                    tracing::info!(
                        "Loaded calibration profile from {:?} ({} sources, created {})",
                        path,
                        profile.sources.len(),
                        profile.created_at
                    );
                    Some(profile)
                }
            }
        } else {
            None
        };

        Ok(Self {
            path: Some(path),
            slot: Arc::new(RwLock::new(Slot {
                profile,
                fitted_here: false,
            })),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.slot.read().profile.is_some()
    }

    /// True once this process has fitted a profile, as opposed to loading one
    pub fn fitted_this_session(&self) -> bool {
        self.slot.read().fitted_here
    }

    pub fn profile(&self) -> Option<CalibrationProfile> {
        self.slot.read().profile.clone()
    }

    pub fn interval(&self) -> Option<ConfidenceInterval> {
        self.slot.read().profile.as_ref().map(|p| p.interval)
    }

    /// Publish a freshly fitted profile.
    ///
    /// Fitting happens once per session: a profile fitted by this process
    /// cannot be replaced, one loaded from disk can. Nothing is published
    /// unless the profile was saved.
    pub fn install(&self, profile: CalibrationProfile) -> Result<()> {
        let mut slot = self.slot.write();
        if slot.fitted_here {
            anyhow::bail!("Calibration profile is already fitted for this session");
        }

        self.save(&profile)?;
        slot.profile = Some(profile);
        slot.fitted_here = true;
        Ok(())
    }

    /// Return the current profile, running `fit` only if there is none yet
    pub fn get_or_fit<F>(&self, fit: F) -> Result<CalibrationProfile>
    where
        F: FnOnce() -> Result<CalibrationProfile>,
    {
        if let Some(profile) = self.slot.read().profile.as_ref() {
            return Ok(profile.clone());
        }

        let mut slot = self.slot.write();
        // Another caller may have fitted while we waited for the lock
        if let Some(profile) = slot.profile.as_ref() {
            return Ok(profile.clone());
        }

        let profile = fit()?;
        self.save(&profile)?;
        slot.profile = Some(profile.clone());
        slot.fitted_here = true;
        Ok(profile)
    }

    /// Save to disk (atomic write)
    fn save(&self, profile: &CalibrationProfile) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(profile)?;
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace {:?}", path))?;

        tracing::debug!("Saved calibration profile to {:?}", path);
        Ok(())
    }
}
