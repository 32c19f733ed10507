pub mod model;

pub use model::{Activation, EmotionModel, HeadConfig, ModelFiles};

use once_cell::sync::OnceCell;
use redmood_core::{ClassifierConfig, CoreError, EmotionVector, ErrorExt};
use tracing::info;

/// Scores a text against the six emotions. Implementations must be
/// deterministic for a fixed model.
pub trait EmotionClassifier: Send + Sync {
    fn score(&self, text: &str) -> Result<EmotionVector, CoreError>;
}

/// Loads the model on first use and keeps it for the life of the process.
/// Concurrent first calls build it once; a failed load is retried on the
/// next call.
pub struct LazyClassifier {
    config: ClassifierConfig,
    model: OnceCell<EmotionModel>,
}

impl LazyClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn model(&self) -> Result<&EmotionModel, CoreError> {
        self.model.get_or_try_init(|| {
            info!("Loading emotion model {}", self.config.model_repo);
            EmotionModel::load(&self.config).map_err(|e| {
                e.log_error();
                CoreError::from(e)
            })
        })
    }
}

impl EmotionClassifier for LazyClassifier {
    fn score(&self, text: &str) -> Result<EmotionVector, CoreError> {
        Ok(self.model()?.score(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redmood_core::ClassificationError;

    #[test]
    fn test_failed_load_is_not_kept() {
        let dir = std::env::temp_dir().join(format!("redmood-lazy-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let classifier = LazyClassifier::new(ClassifierConfig {
            model_repo: dir.to_string_lossy().into_owned(),
            ..ClassifierConfig::default()
        });
        assert!(!classifier.is_loaded());

        for _ in 0..2 {
            let result = classifier.score("so happy today");
            assert!(matches!(
                result,
                Err(CoreError::Classification(
                    ClassificationError::ModelLoadingFailed { .. }
                ))
            ));
            assert!(!classifier.is_loaded());
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
