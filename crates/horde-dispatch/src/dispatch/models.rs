use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Model family; decides which ControlNet flavour a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    StableDiffusion1,
    StableDiffusion2,
    StableDiffusionXl,
    StableCascade,
    Flux1,
}

impl Baseline {
    pub const fn is_sdxl(self) -> bool {
        matches!(self, Baseline::StableDiffusionXl)
    }
}

/// Reference entry for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub baseline: Baseline,
    #[serde(default)]
    pub average_steps: Option<u32>,
}

/// Lookup into the model reference table.
pub trait ModelReference: Send + Sync {
    fn average_steps(&self, model: &str) -> Option<u32>;
    fn baseline(&self, model: &str) -> Option<Baseline>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelReferenceError {
    #[error("unable to read model reference: {0}")]
    Io(#[from] std::io::Error),
    #[error("model reference is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// In-memory model reference keyed by exact model name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelRecord>,
}

impl ModelCatalog {
    pub fn new(models: BTreeMap<String, ModelRecord>) -> Self {
        Self { models }
    }

    /// Small table used when no reference file is configured.
    pub fn builtin() -> Self {
        let entries = [
            ("stable_diffusion", Baseline::StableDiffusion1, 40),
            ("stable_diffusion_2.1", Baseline::StableDiffusion2, 40),
            ("SDXL 1.0", Baseline::StableDiffusionXl, 40),
            ("AlbedoBase XL (SDXL)", Baseline::StableDiffusionXl, 30),
            ("Stable Cascade 1.0", Baseline::StableCascade, 20),
            ("Flux.1-Schnell fp8 (Compact)", Baseline::Flux1, 8),
        ];

        let models = entries
            .into_iter()
            .map(|(name, baseline, steps)| {
                (
                    name.to_string(),
                    ModelRecord {
                        baseline,
                        average_steps: Some(steps),
                    },
                )
            })
            .collect();

        Self { models }
    }

    /// Parses a JSON object of `{ "<model>": { "baseline": ..., "average_steps": ... } }`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ModelReferenceError> {
        let models = serde_json::from_reader(reader)?;
        Ok(Self { models })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ModelReferenceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn insert(&mut self, name: impl Into<String>, record: ModelRecord) {
        self.models.insert(name.into(), record);
    }

    pub fn get(&self, model: &str) -> Option<&ModelRecord> {
        self.models.get(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelReference for ModelCatalog {
    fn average_steps(&self, model: &str) -> Option<u32> {
        self.get(model).and_then(|record| record.average_steps)
    }

    fn baseline(&self, model: &str) -> Option<Baseline> {
        self.get(model).map(|record| record.baseline)
    }
}
