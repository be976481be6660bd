use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptText {
    pub text: String,
}

impl PromptText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInit {
    /// `-1` asks the service to pick a random seed.
    pub seed: i64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffusionParams {
    pub width: u32,
    pub height: u32,
    pub prompts: Vec<PromptText>,
    pub negative_prompts: Vec<PromptText>,
    pub sd_model: String,
    pub sd_vae: String,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub clip_skip: u32,
    pub eta_noise_seed_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    InputInitialize {
        #[serde(rename = "inputInitialize")]
        input_initialize: SeedInit,
    },
    Diffusion {
        diffusion: DiffusionParams,
    },
}

/// Flat stage list submitted to `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub request_id: String,
    pub stages: Vec<Stage>,
}

impl PipelineJob {
    pub fn diffusion(&self) -> Option<&DiffusionParams> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Diffusion { diffusion } => Some(diffusion),
            Stage::InputInitialize { .. } => None,
        })
    }

    pub fn prompt(&self) -> Option<&str> {
        self.diffusion()
            .and_then(|diffusion| diffusion.prompts.first())
            .map(|prompt| prompt.text.as_str())
    }
}
