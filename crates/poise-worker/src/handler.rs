//! Command dispatch

use anyhow::{Context, Result};
use poise_analysis::{
    calibrate_from_files, CalibrationStore, ConfidenceClassifier, FeatureExtractor,
    FittedClassifier,
};
use poise_coach::evaluation_prompt;
use poise_types::{AnalysisConfig, ConfidenceVerdict, WorkerCommand, WorkerResponse};

/// Everything a session needs: one extractor and one calibration profile
pub struct Worker {
    config: AnalysisConfig,
    extractor: FeatureExtractor,
    classifier: ConfidenceClassifier,
    store: CalibrationStore,
}

impl Worker {
    pub fn new(config: AnalysisConfig, store: CalibrationStore) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config),
            classifier: ConfidenceClassifier::from_config(&config),
            config,
            store,
        }
    }

    /// Worker whose profile lives at the configured path, if any.
    /// A saved profile fitted under other settings is not reused.
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        let store = match &config.calibration_path {
            Some(path) => CalibrationStore::open(
                path.clone(),
                &ConfidenceClassifier::from_config(&config),
                &config.calibration_sources,
            )?,
            None => CalibrationStore::in_memory(),
        };
        Ok(Self::new(config, store))
    }

    /// Handle one command. Failures become `WorkerResponse::Error`.
    pub fn handle(&self, command: WorkerCommand) -> WorkerResponse {
        match self.dispatch(command) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Command failed: {:#}", e);
                WorkerResponse::Error {
                    message: format!("{:#}", e),
                }
            }
        }
    }

    fn dispatch(&self, command: WorkerCommand) -> Result<WorkerResponse> {
        match command {
            WorkerCommand::Calibrate { paths } => {
                if self.store.fitted_this_session() {
                    anyhow::bail!("Calibration profile is already fitted for this session");
                }
                let profile = calibrate_from_files(&self.extractor, &self.classifier, &paths)?;
                self.store.install(profile.clone())?;

                Ok(WorkerResponse::Calibration {
                    interval: profile.interval,
                    sources: profile.sources,
                })
            }

            WorkerCommand::Extract { path } => {
                let features = self.extractor.extract_file(&path)?;
                Ok(WorkerResponse::Features { features })
            }

            WorkerCommand::Classify { path } => {
                let verdict = self.classify_file(&path)?;
                Ok(WorkerResponse::Verdict(verdict))
            }

            WorkerCommand::ClassifyFeatures { features } => {
                let verdict = self.fitted()?.evaluate_raw(&features);
                log_verdict("features", &verdict);
                Ok(WorkerResponse::Verdict(verdict))
            }

            WorkerCommand::EvaluationPrompt {
                path,
                question,
                answer,
            } => {
                let verdict = self.classify_file(&path)?;
                Ok(WorkerResponse::Prompt {
                    confident: verdict.confident,
                    prompt: evaluation_prompt(&question, verdict.confident, &answer),
                })
            }

            // Handled by the IPC loop
            WorkerCommand::Shutdown => Ok(WorkerResponse::Ok),
        }
    }

    fn classify_file(&self, path: &str) -> Result<ConfidenceVerdict> {
        let fitted = self.fitted()?;
        let features = self.extractor.extract_file(path)?;
        let verdict = fitted.evaluate(&features);
        log_verdict(path, &verdict);
        Ok(verdict)
    }

    /// The session classifier, fitting from the configured sources on first use
    fn fitted(&self) -> Result<FittedClassifier> {
        let profile = self.store.get_or_fit(|| {
            if self.config.calibration_sources.is_empty() {
                anyhow::bail!("Not calibrated: send Calibrate or configure calibrationSources");
            }
            tracing::info!(
                "Calibrating from {} configured source(s)",
                self.config.calibration_sources.len()
            );
            calibrate_from_files(
                &self.extractor,
                &self.classifier,
                &self.config.calibration_sources,
            )
        })?;

        profile
            .classifier()
            .context("Stored calibration profile is unusable")
    }
}

fn log_verdict(source: &str, verdict: &ConfidenceVerdict) {
    tracing::info!(
        "Verdict for {}: confident={}, failed={:?}",
        source,
        verdict.confident,
        verdict.failed_fields()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise_types::{FeatureName, NanPolicy, RawFeature, RawFeatureVector, Waveform};
    use std::path::{Path, PathBuf};

    fn write_sine(dir: &Path, name: &str, freq: f64) -> PathBuf {
        let samples = (0..16000)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / 16000.0).sin()) as f32)
            .collect();
        let path = dir.join(name);
        let bytes = poise_audio::waveform_to_wav_bytes(&Waveform::mono(samples, 16000)).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn path_string(path: &Path) -> String {
        path.display().to_string()
    }

    fn calibrated_worker(dir: &Path) -> Worker {
        let worker = Worker::new(AnalysisConfig::default(), CalibrationStore::in_memory());
        let paths = vec![
            path_string(&write_sine(dir, "neutral.wav", 140.0)),
            path_string(&write_sine(dir, "confident.wav", 160.0)),
        ];
        let response = worker.handle(WorkerCommand::Calibrate { paths });
        assert!(matches!(response, WorkerResponse::Calibration { .. }), "{:?}", response);
        worker
    }

    #[test]
    fn test_classify_before_calibration_is_an_error() {
        let worker = Worker::new(AnalysisConfig::default(), CalibrationStore::in_memory());
        let response = worker.handle(WorkerCommand::ClassifyFeatures {
            features: RawFeatureVector::default(),
        });
        match response {
            WorkerResponse::Error { message } => assert!(message.contains("Not calibrated")),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_calibrate_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let worker = calibrated_worker(dir.path());

        let again = worker.handle(WorkerCommand::Calibrate {
            paths: vec![path_string(&dir.path().join("neutral.wav"))],
        });
        assert!(matches!(again, WorkerResponse::Error { .. }));
    }

    #[test]
    fn test_classify_features_inside_band() {
        let dir = tempfile::tempdir().unwrap();
        let worker = calibrated_worker(dir.path());
        let interval = worker.store.interval().unwrap();

        let mut raw = RawFeatureVector::default();
        for name in FeatureName::ALL {
            let (lo, hi) = interval.bounds(name);
            let value = RawFeature::Scalar((lo + hi) / 2.0);
            match name {
                FeatureName::PitchMean => raw.pitch_mean = value,
                FeatureName::PitchStd => raw.pitch_std = value,
                FeatureName::LoudnessMean => raw.loudness_mean = value,
                FeatureName::LoudnessStd => raw.loudness_std = value,
                FeatureName::SpeakingRate => raw.speaking_rate = value,
            }
        }

        match worker.handle(WorkerCommand::ClassifyFeatures { features: raw }) {
            WorkerResponse::Verdict(verdict) => {
                // Pitch bounds come from two clean tones and are finite
                let pitch = verdict
                    .fields
                    .iter()
                    .find(|c| c.feature == FeatureName::PitchMean)
                    .unwrap();
                assert!(pitch.passed);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_evaluation_prompt_carries_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let worker = calibrated_worker(dir.path());
        let answer = write_sine(dir.path(), "answer.wav", 300.0);

        let response = worker.handle(WorkerCommand::EvaluationPrompt {
            path: path_string(&answer),
            question: "Why do you want this job?".to_string(),
            answer: "Because I like building things.".to_string(),
        });
        match response {
            WorkerResponse::Prompt { confident, prompt } => {
                assert!(!confident);
                assert!(prompt.contains("Why do you want this job?"));
                assert!(prompt.contains("confident is\nfalse."));
                assert!(prompt.ends_with("Because I like building things."));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_lazy_calibration_from_config_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            calibration_sources: vec![
                write_sine(dir.path(), "neutral.wav", 140.0),
                write_sine(dir.path(), "confident.wav", 160.0),
            ],
            calibration_path: Some(dir.path().join("calibration.json")),
            ..AnalysisConfig::default()
        };
        let worker = Worker::from_config(config).unwrap();
        assert!(!worker.store.is_fitted());

        let response = worker.handle(WorkerCommand::Classify {
            path: path_string(&dir.path().join("neutral.wav")),
        });
        assert!(matches!(response, WorkerResponse::Verdict(_)), "{:?}", response);
        assert!(worker.store.is_fitted());
        assert!(dir.path().join("calibration.json").exists());
    }

    #[test]
    fn test_saved_profile_under_other_policy_is_refitted() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            write_sine(dir.path(), "neutral.wav", 140.0),
            write_sine(dir.path(), "confident.wav", 160.0),
        ];
        let config = AnalysisConfig {
            calibration_sources: sources.clone(),
            calibration_path: Some(dir.path().join("calibration.json")),
            ..AnalysisConfig::default()
        };
        let first = Worker::from_config(config.clone()).unwrap();
        let response = first.handle(WorkerCommand::Classify {
            path: path_string(&sources[0]),
        });
        assert!(matches!(response, WorkerResponse::Verdict(_)), "{:?}", response);

        let lenient = AnalysisConfig {
            nan_policy: NanPolicy::IgnoreField,
            ..config
        };
        let second = Worker::from_config(lenient).unwrap();
        assert!(!second.store.is_fitted());

        let response = second.handle(WorkerCommand::Classify {
            path: path_string(&sources[0]),
        });
        assert!(matches!(response, WorkerResponse::Verdict(_)), "{:?}", response);
        assert_eq!(second.store.profile().unwrap().nan_policy, NanPolicy::IgnoreField);
    }

    #[test]
    fn test_calibrate_replaces_saved_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            calibration_path: Some(dir.path().join("calibration.json")),
            ..AnalysisConfig::default()
        };
        let paths = vec![
            path_string(&write_sine(dir.path(), "neutral.wav", 140.0)),
            path_string(&write_sine(dir.path(), "confident.wav", 160.0)),
        ];

        let first = Worker::from_config(config.clone()).unwrap();
        let response = first.handle(WorkerCommand::Calibrate { paths: paths.clone() });
        assert!(matches!(response, WorkerResponse::Calibration { .. }), "{:?}", response);

        // A new session loads the profile but may still calibrate once
        let second = Worker::from_config(config).unwrap();
        assert!(second.store.is_fitted());
        let response = second.handle(WorkerCommand::Calibrate { paths: paths.clone() });
        assert!(matches!(response, WorkerResponse::Calibration { .. }), "{:?}", response);
        let again = second.handle(WorkerCommand::Calibrate { paths });
        assert!(matches!(again, WorkerResponse::Error { .. }));
    }

    #[test]
    fn test_calibrate_can_retry_after_failed_save() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = AnalysisConfig {
            calibration_path: Some(blocker.join("calibration.json")),
            ..AnalysisConfig::default()
        };
        let worker = Worker::from_config(config).unwrap();
        let paths = vec![
            path_string(&write_sine(dir.path(), "neutral.wav", 140.0)),
            path_string(&write_sine(dir.path(), "confident.wav", 160.0)),
        ];

        for _ in 0..2 {
            match worker.handle(WorkerCommand::Calibrate { paths: paths.clone() }) {
                WorkerResponse::Error { message } => {
                    assert!(!message.contains("already fitted"), "{}", message)
                }
                other => panic!("unexpected response: {:?}", other),
            }
        }
        assert!(!worker.store.is_fitted());
    }

    #[test]
    fn test_extract_missing_file_is_an_error() {
        let worker = Worker::new(AnalysisConfig::default(), CalibrationStore::in_memory());
        let response = worker.handle(WorkerCommand::Extract {
            path: "/nonexistent/answer.wav".to_string(),
        });
        assert!(matches!(response, WorkerResponse::Error { .. }));
    }
}
