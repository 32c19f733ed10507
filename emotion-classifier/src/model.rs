//! BERT sequence classification on CPU with candle.
//!
//! The checkpoint is a `BertForSequenceClassification` export: a BERT
//! encoder under `bert.*`, its pooler (`bert.pooler.dense`, tanh over the
//! CLS token) and a linear `classifier` head with one output per label.

use candle_core::{Device, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use redmood_core::{ClassificationError, ClassifierConfig, Emotion, EmotionVector};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// How logits become per-label probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Softmax,
    Sigmoid,
}

impl Activation {
    pub fn for_problem_type(problem_type: Option<&str>) -> Self {
        match problem_type {
            Some("multi_label_classification") => Activation::Sigmoid,
            _ => Activation::Softmax,
        }
    }

    pub fn apply(self, logits: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Activation::Softmax => candle_nn::ops::softmax(logits, D::Minus1),
            Activation::Sigmoid => logits.neg()?.exp()?.affine(1.0, 1.0)?.recip(),
        }
    }
}

/// The parts of `config.json` the classification head needs. The encoder
/// itself is configured from the same file through candle's `Config`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadConfig {
    pub hidden_size: usize,
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
    #[serde(default)]
    pub problem_type: Option<String>,
}

impl HeadConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn activation(&self) -> Activation {
        Activation::for_problem_type(self.problem_type.as_deref())
    }

    /// The emotion behind each output index. Output ids must be `0..n`
    /// and cover exactly the six known emotions.
    pub fn label_order(&self) -> Result<Vec<Emotion>, ClassificationError> {
        let mut indexed = Vec::with_capacity(self.id2label.len());
        for (id, label) in &self.id2label {
            let emotion =
                Emotion::from_label(label).ok_or_else(|| ClassificationError::UnknownLabel {
                    label: label.clone(),
                })?;
            let index = id
                .trim()
                .parse::<usize>()
                .map_err(|_| ClassificationError::UnknownLabel {
                    label: format!("{}={}", id, label),
                })?;
            indexed.push((index, emotion));
        }
        indexed.sort_by_key(|(index, _)| *index);

        for (expected, (index, emotion)) in indexed.iter().enumerate() {
            if *index != expected {
                return Err(ClassificationError::UnknownLabel {
                    label: format!("{}={}", index, emotion),
                });
            }
        }
        for emotion in Emotion::ALL {
            if !indexed.iter().any(|(_, e)| *e == emotion) {
                return Err(ClassificationError::MissingLabel {
                    label: emotion.label().to_string(),
                });
            }
        }

        Ok(indexed.into_iter().map(|(_, emotion)| emotion).collect())
    }
}

/// Local paths of the three files a checkpoint is built from.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// A local directory is used as is; anything else is treated as a Hub
    /// repository and downloaded into the Hugging Face cache.
    pub fn resolve(config: &ClassifierConfig) -> Result<Self, ClassificationError> {
        let local = Path::new(&config.model_repo);
        if local.is_dir() {
            debug!("Using local model directory {}", local.display());
            return Ok(Self {
                config: local.join(CONFIG_FILE),
                tokenizer: local.join(TOKENIZER_FILE),
                weights: local.join(&config.weights_file),
            });
        }

        info!(
            "Fetching {}@{} from the Hugging Face Hub",
            config.model_repo, config.revision
        );
        let api = Api::new().map_err(|e| load_failed(&config.model_repo, e))?;
        let repo = api.repo(Repo::with_revision(
            config.model_repo.clone(),
            RepoType::Model,
            config.revision.clone(),
        ));
        let fetch = |file: &str| {
            repo.get(file)
                .map_err(|e| load_failed(&config.model_repo, format!("{}: {}", file, e)))
        };

        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: fetch(&config.weights_file)?,
        })
    }
}

pub struct EmotionModel {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    labels: Vec<Emotion>,
    activation: Activation,
    max_tokens: usize,
    device: Device,
}

impl EmotionModel {
    pub fn load(config: &ClassifierConfig) -> Result<Self, ClassificationError> {
        let files = ModelFiles::resolve(config)?;
        Self::from_files(&config.model_repo, &files)
    }

    pub fn from_files(model: &str, files: &ModelFiles) -> Result<Self, ClassificationError> {
        let raw_config = std::fs::read_to_string(&files.config)
            .map_err(|e| load_failed(model, format!("{}: {}", files.config.display(), e)))?;
        let bert_config: Config =
            serde_json::from_str(&raw_config).map_err(|e| load_failed(model, e))?;
        let head = HeadConfig::from_json(&raw_config).map_err(|e| load_failed(model, e))?;
        let labels = head.label_order().map_err(|e| load_failed(model, e))?;
        let activation = head.activation();
        debug!(
            "Model config: hidden_size={}, labels={:?}, activation={:?}",
            head.hidden_size, labels, activation
        );

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| load_failed(model, e))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| load_failed(model, e))?;

        let device = Device::Cpu;
        let vb = if files.weights.extension().is_some_and(|ext| ext == "bin") {
            VarBuilder::from_pth(&files.weights, DTYPE, &device)
        } else {
            unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights.clone()], DTYPE, &device) }
        }
        .map_err(|e| load_failed(model, e))?;

        let bert = BertModel::load(vb.pp("bert"), &bert_config).map_err(|e| load_failed(model, e))?;
        let pooler = linear(head.hidden_size, head.hidden_size, vb.pp("bert.pooler.dense"))
            .map_err(|e| load_failed(model, e))?;
        let classifier = linear(head.hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(|e| load_failed(model, e))?;

        info!("Emotion model {} loaded", model);
        Ok(Self {
            bert,
            pooler,
            classifier,
            tokenizer,
            labels,
            activation,
            max_tokens: head.max_position_embeddings,
            device,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn score(&self, text: &str) -> Result<EmotionVector, ClassificationError> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            ClassificationError::TokenizationFailed {
                text_length: text.chars().count(),
                reason: e.to_string(),
            }
        })?;

        let ids = encoding.get_ids();
        check_context(ids.len(), self.max_tokens)?;

        let probabilities = self
            .forward(ids, encoding.get_type_ids())
            .map_err(|e| ClassificationError::InferenceFailed {
                reason: e.to_string(),
            })?;
        EmotionVector::from_scores(self.labels.iter().copied().zip(probabilities))
    }

    fn forward(&self, ids: &[u32], type_ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;

        // (1, seq_len, hidden) -> CLS -> (1, hidden)
        let hidden = self.bert.forward(&input_ids, &token_type_ids, None)?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        self.activation.apply(&logits)?.squeeze(0)?.to_vec1::<f32>()
    }
}

/// Inputs are never truncated; anything past the position embeddings fails.
fn check_context(length: usize, max_tokens: usize) -> Result<(), ClassificationError> {
    if length > max_tokens {
        return Err(ClassificationError::InputTooLong { length, max_tokens });
    }
    Ok(())
}

fn load_failed(model: &str, reason: impl Display) -> ClassificationError {
    ClassificationError::ModelLoadingFailed {
        model: model.to_string(),
        reason: reason.to_string(),
    }
}
