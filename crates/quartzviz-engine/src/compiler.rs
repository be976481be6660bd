//! Builds the job requests the imaging service runs.

use quartzviz_contracts::jobs::{
    DiffusionParams, GraphError, InputValue, JobRequest, NodeSpec, PipelineJob, PromptText,
    ResourceHandle, SeedInit, Stage, WorkflowGraph, WorkflowJob,
};
use uuid::Uuid;

use crate::size::Resolution;

pub const DIFFUSION_MODEL: &str = "779398605850080514";
pub const DIFFUSION_VAE: &str = "ae.sft";
pub const DIFFUSION_SAMPLER: &str = "Euler a";
pub const DIFFUSION_STEPS: u32 = 30;
pub const DIFFUSION_CFG_SCALE: f32 = 8.0;

pub const SOURCE_NODE: &str = "2";
pub const TEXTURE_NODE: &str = "17";
pub const PREVIEW_NODE: &str = "7";

const SAM_MODEL: &str = "sam_vit_h (2.56GB)";
const GROUNDING_MODEL: &str = "GroundingDINO_SwinB (938MB)";
const DEFAULT_REGION: &str = "default";

/// Region to segment, as a single label or a list of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionLabel {
    Single(String),
    Choices(Vec<String>),
}

impl RegionLabel {
    /// Lower-cased segmentation prompt. Lists use their first entry.
    pub fn prompt(&self) -> String {
        let label = match self {
            Self::Single(label) => label.as_str(),
            Self::Choices(labels) => labels.first().map(String::as_str).unwrap_or(DEFAULT_REGION),
        };
        let label = label.trim();
        if label.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            label.to_lowercase()
        }
    }
}

impl From<&str> for RegionLabel {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for RegionLabel {
    fn from(values: Vec<String>) -> Self {
        Self::Choices(values)
    }
}

/// Segments `region` on the source and pastes the seamlessly tiled texture into the mask.
pub fn inpaint_graph(
    source: &ResourceHandle,
    texture: &ResourceHandle,
    region: &RegionLabel,
) -> Result<WorkflowGraph, GraphError> {
    let link = |node: &str, slot: u32| InputValue::link(node, slot);
    let mut graph = WorkflowGraph::new();

    graph.insert(
        SOURCE_NODE,
        NodeSpec::new("TensorArt_LoadImage")
            .input("_height", 1024i64)
            .input("_width", 768i64)
            .input("image", source.as_str())
            .input("upload", "image"),
    );
    graph.insert(
        TEXTURE_NODE,
        NodeSpec::new("TensorArt_LoadImage")
            .input("_height", 768i64)
            .input("_width", 512i64)
            .input("image", texture.as_str())
            .input("upload", "image"),
    );
    graph.insert(
        "3",
        NodeSpec::new("LayerMask: LoadSegmentAnythingModels")
            .input("grounding_dino_model", GROUNDING_MODEL)
            .input("sam_model", SAM_MODEL),
    );
    graph.insert(
        "4",
        NodeSpec::new("TensorArt_PromptText").input("Text", region.prompt()),
    );
    graph.insert(
        "1",
        NodeSpec::new("LayerMask: SegmentAnythingUltra V3")
            .input("black_point", 0.3)
            .input("detail_dilate", 6i64)
            .input("detail_erode", 65i64)
            .input("detail_method", "GuidedFilter")
            .input("device", "cuda")
            .input("image", link(SOURCE_NODE, 0))
            .input("max_megapixels", 2i64)
            .input("process_detail", true)
            .input("prompt", link("4", 0))
            .input("sam_models", link("3", 0))
            .input("threshold", 0.3)
            .input("white_point", 0.99),
    );
    graph.insert(
        "8",
        NodeSpec::new("MaskToImage").input("mask", link("1", 1)),
    );
    graph.insert(
        "10",
        NodeSpec::new("Image Seamless Texture")
            .input("blending", 0.37)
            .input("images", link(TEXTURE_NODE, 0))
            .input("tiled", "true")
            .input("tiles", 2i64),
    );
    graph.insert(
        "13",
        NodeSpec::new("Paste By Mask")
            .input("image_base", link(SOURCE_NODE, 0))
            .input("image_to_paste", link("10", 0))
            .input("mask", link("8", 0))
            .input("resize_behavior", "resize"),
    );
    graph.insert(
        PREVIEW_NODE,
        NodeSpec::new("PreviewImage").input("images", link("13", 0)),
    );

    graph.validate()?;
    Ok(graph)
}

pub fn compile_inpaint_graph(
    source: &ResourceHandle,
    texture: &ResourceHandle,
    region: &RegionLabel,
) -> Result<JobRequest, GraphError> {
    let params = inpaint_graph(source, texture, region)?;
    Ok(JobRequest::Workflow(WorkflowJob {
        request_id: format!("workflow_{}", chrono::Utc::now().timestamp_millis()),
        params,
        running_notify_url: String::new(),
    }))
}

/// Seed initialisation followed by one diffusion stage.
pub fn compile_diffusion_job(prompt: &str, resolution: Resolution) -> JobRequest {
    JobRequest::Pipeline(PipelineJob {
        request_id: Uuid::new_v4().simple().to_string(),
        stages: vec![
            Stage::InputInitialize {
                input_initialize: SeedInit { seed: -1, count: 1 },
            },
            Stage::Diffusion {
                diffusion: DiffusionParams {
                    width: resolution.width,
                    height: resolution.height,
                    prompts: vec![PromptText::new(prompt)],
                    negative_prompts: vec![PromptText::new(" ")],
                    sd_model: DIFFUSION_MODEL.to_string(),
                    sd_vae: DIFFUSION_VAE.to_string(),
                    sampler: DIFFUSION_SAMPLER.to_string(),
                    steps: DIFFUSION_STEPS,
                    cfg_scale: DIFFUSION_CFG_SCALE,
                    clip_skip: 1,
                    eta_noise_seed_delta: 31337,
                },
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn handles() -> (ResourceHandle, ResourceHandle) {
        (ResourceHandle::new("res-src"), ResourceHandle::new("res-tex"))
    }

    #[test]
    fn inpaint_graph_wires_fixed_topology() -> anyhow::Result<()> {
        let (source, texture) = handles();
        let graph = inpaint_graph(&source, &texture, &RegionLabel::from("Wall"))?;
        assert_eq!(graph.len(), 9);

        let value = serde_json::to_value(&graph)?;
        assert_eq!(value["2"]["inputs"]["image"], json!("res-src"));
        assert_eq!(value["17"]["inputs"]["image"], json!("res-tex"));
        assert_eq!(value["17"]["inputs"]["_width"], json!(512));
        assert_eq!(value["4"]["inputs"]["Text"], json!("wall"));
        assert_eq!(value["1"]["inputs"]["prompt"], json!(["4", 0]));
        assert_eq!(value["8"]["inputs"]["mask"], json!(["1", 1]));
        assert_eq!(value["10"]["inputs"]["blending"], json!(0.37));
        assert_eq!(value["10"]["inputs"]["tiled"], json!("true"));
        assert_eq!(value["13"]["inputs"]["image_to_paste"], json!(["10", 0]));
        assert_eq!(value["7"]["inputs"]["images"], json!(["13", 0]));
        assert_eq!(
            value["1"]["properties"]["Node name for S&R"],
            json!("LayerMask: SegmentAnythingUltra V3")
        );
        Ok(())
    }

    #[test]
    fn preview_runs_after_everything_it_depends_on() -> anyhow::Result<()> {
        let (source, texture) = handles();
        let graph = inpaint_graph(&source, &texture, &RegionLabel::from("floor"))?;
        let order = graph.topological_order()?;
        let position = |id: &str| order.iter().position(|node| *node == id);
        assert!(position("2") < position("1"));
        assert!(position("1") < position("8"));
        assert!(position("10") < position("13"));
        assert_eq!(order.last().copied(), Some(PREVIEW_NODE));
        Ok(())
    }

    #[test]
    fn region_lists_use_first_entry_or_default() {
        let choices = RegionLabel::from(vec!["Countertop".to_string(), "Wall".to_string()]);
        assert_eq!(choices.prompt(), "countertop");
        assert_eq!(RegionLabel::Choices(Vec::new()).prompt(), "default");
        assert_eq!(RegionLabel::from("  ").prompt(), "default");
    }

    #[test]
    fn workflow_request_carries_generated_id() -> anyhow::Result<()> {
        let (source, texture) = handles();
        let request = compile_inpaint_graph(&source, &texture, &RegionLabel::from("Wall"))?;
        assert!(request.request_id().starts_with("workflow_"));
        let body = request.to_json()?;
        assert_eq!(body["runningNotifyUrl"], json!(""));
        assert!(request.graph().is_some());
        Ok(())
    }

    #[test]
    fn diffusion_job_uses_fixed_model_settings() -> anyhow::Result<()> {
        let request = compile_diffusion_job(
            "modern kitchen, featuring C1012 quartz marble",
            Resolution { width: 1024, height: 768 },
        );
        let JobRequest::Pipeline(job) = &request else {
            anyhow::bail!("expected a pipeline job");
        };
        assert_eq!(job.prompt(), Some("modern kitchen, featuring C1012 quartz marble"));
        let diffusion = job.diffusion().expect("diffusion stage");
        assert_eq!((diffusion.width, diffusion.height), (1024, 768));
        assert_eq!(diffusion.sd_model, DIFFUSION_MODEL);
        assert_eq!(diffusion.steps, 30);
        assert_eq!(job.request_id.len(), 32);
        Ok(())
    }
}
