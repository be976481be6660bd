use std::cell::Cell;
use std::path::PathBuf;
use std::sync::Arc;

use quartzviz_contracts::catalog::{ProductCatalog, ProductSelection};
use quartzviz_contracts::events::{FlowKind, FlowStage, ProgressEvent, ProgressSink};
use quartzviz_contracts::jobs::JobKind;
use tracing::{debug, error, info, warn};

use crate::client::ServiceClient;
use crate::clock::{CancelToken, Clock, SystemClock};
use crate::compiler::{compile_diffusion_job, compile_inpaint_graph, RegionLabel};
use crate::config::{EngineSettings, ServiceConfig};
use crate::error::{EngineError, ErrorKind};
use crate::materializer::{prompt_stem, GeneratedImage, Materializer, OutputFormat};
use crate::rewrite::{FeatureSuffixRewriter, PromptRewriter};
use crate::runner::{JobRunner, PollTick};
use crate::size::SizeChoice;
use crate::transport::ReqwestTransport;
use crate::uploader::ResourceUploader;

const INPAINT_STEM: &str = "inpaint";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextToImageRequest {
    pub prompt: String,
    pub size: SizeChoice,
    pub products: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToImageRequest {
    pub source_image: PathBuf,
    pub region: RegionLabel,
    pub size: SizeChoice,
    pub products: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFailure {
    /// State the run was in when it failed.
    pub stage: FlowStage,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Completed(GeneratedImage),
    Failed(FlowFailure),
}

impl FlowOutcome {
    pub fn into_result(self) -> Result<GeneratedImage, FlowFailure> {
        match self {
            Self::Completed(image) => Ok(image),
            Self::Failed(failure) => Err(failure),
        }
    }
}

/// Drives one text-to-image or image-to-image run from input validation to a saved file.
pub struct Orchestrator {
    catalog: Arc<ProductCatalog>,
    uploader: ResourceUploader,
    runner: JobRunner,
    materializer: Materializer,
    rewriter: Arc<dyn PromptRewriter>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<ServiceClient>,
        clock: Arc<dyn Clock>,
        catalog: Arc<ProductCatalog>,
        materializer: Materializer,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            uploader: ResourceUploader::new(
                client.clone(),
                clock.clone(),
                settings.propagation_delay,
            ),
            runner: JobRunner::new(client, clock)
                .with_policies(settings.workflow_poll, settings.pipeline_poll),
            materializer,
            rewriter: Arc::new(FeatureSuffixRewriter),
        }
    }

    /// Wires the real network and clock, and creates the output directory.
    pub fn from_config(
        config: &ServiceConfig,
        catalog: Arc<ProductCatalog>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        let client = Arc::new(ServiceClient::new(
            &config.api_base,
            config.api_token.clone(),
            Arc::new(ReqwestTransport::new()),
            settings.timeouts,
        ));
        let materializer = Materializer::new(config.output_dir.clone());
        materializer.ensure_output_dir()?;
        Ok(Self::new(
            client,
            Arc::new(SystemClock),
            catalog,
            materializer,
            settings,
        ))
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn PromptRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn text_to_image(
        &self,
        request: &TextToImageRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> FlowOutcome {
        let reporter = Reporter::new(progress, FlowKind::TextToImage);
        match self.run_text_to_image(request, &reporter, cancel) {
            Ok(image) => FlowOutcome::Completed(image),
            Err(err) => FlowOutcome::Failed(reporter.fail(&err)),
        }
    }

    pub fn image_to_image(
        &self,
        request: &ImageToImageRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> FlowOutcome {
        let reporter = Reporter::new(progress, FlowKind::ImageToImage);
        match self.run_image_to_image(request, &reporter, cancel) {
            Ok(image) => FlowOutcome::Completed(image),
            Err(err) => FlowOutcome::Failed(reporter.fail(&err)),
        }
    }

    fn run_text_to_image(
        &self,
        request: &TextToImageRequest,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> Result<GeneratedImage, EngineError> {
        reporter.advance(FlowStage::Start, 0, "Starting text-to-image run");
        cancel.check()?;

        reporter.advance(FlowStage::ValidatingInput, 5, "Validating input");
        let resolution = request.size.resolve()?;
        let selections = self.resolve_products(&request.products)?;
        let codes: Vec<String> = selections
            .iter()
            .map(|selection| selection.short_code.clone())
            .collect();
        let prompt = self.rewriter.rewrite(&request.prompt, &codes)?;
        info!(%resolution, %prompt, "text-to-image prompt prepared");

        cancel.check()?;
        reporter.advance(FlowStage::Submitting, 30, "Submitting diffusion job");
        let job = compile_diffusion_job(&prompt, resolution);
        let handle = self.runner.submit(&job)?;

        reporter.advance(FlowStage::Polling, 40, format!("Waiting for job {handle}"));
        let remote = self.runner.fetch_result(
            &handle,
            JobKind::Pipeline,
            "text2img",
            cancel,
            &mut |tick| reporter.poll_tick(tick, 40, 90),
        )?;

        reporter.advance(FlowStage::Materializing, 95, "Saving result image");
        let generated =
            self.materializer
                .materialize(&remote.bytes, &prompt_stem(&prompt), OutputFormat::Png)?;
        reporter.advance(
            FlowStage::Done,
            100,
            format!("Saved {}", generated.path.display()),
        );
        Ok(generated)
    }

    fn run_image_to_image(
        &self,
        request: &ImageToImageRequest,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> Result<GeneratedImage, EngineError> {
        reporter.advance(FlowStage::Start, 0, "Starting image-to-image run");
        cancel.check()?;

        reporter.advance(FlowStage::ValidatingInput, 5, "Validating input");
        let resolution = request.size.resolve()?;
        // The inpaint graph keeps its own load sizes; the requested size is only recorded.
        debug!(%resolution, "requested resolution is not applied to the inpaint graph");
        if !request.source_image.is_file() {
            return Err(EngineError::Validation(
                "Please provide a source image.".to_string(),
            ));
        }
        let selections = self.resolve_products(&request.products)?;
        if selections.len() > 1 {
            warn!(
                selected = selections.len(),
                "image-to-image applies only the first selected product"
            );
        }
        let Some(product) = selections.first() else {
            return Err(EngineError::Validation(
                "Please select at least one product code.".to_string(),
            ));
        };
        let texture_path = product
            .texture_path
            .clone()
            .filter(|path| path.is_file())
            .ok_or_else(|| EngineError::Asset {
                code: product.code.clone(),
                path: product.texture_path.clone(),
            })?;

        cancel.check()?;
        reporter.advance(FlowStage::Uploading, 15, "Preparing source image");
        let staged = self.materializer.stage_for_upload(&request.source_image)?;
        reporter.advance(FlowStage::Uploading, 20, "Uploading source image");
        let source = self.uploader.upload(&staged)?;
        cancel.check()?;
        reporter.advance(
            FlowStage::Uploading,
            30,
            format!("Uploading texture for {}", product.short_code),
        );
        let texture = self.uploader.upload(&texture_path)?;

        cancel.check()?;
        reporter.advance(FlowStage::Compiling, 40, "Building inpaint workflow");
        let job = compile_inpaint_graph(&source, &texture, &request.region)?;

        reporter.advance(FlowStage::Submitting, 50, "Submitting inpaint workflow");
        let handle = self.runner.submit(&job)?;

        reporter.advance(FlowStage::Polling, 60, format!("Waiting for job {handle}"));
        let remote = self.runner.fetch_result(
            &handle,
            JobKind::Workflow,
            INPAINT_STEM,
            cancel,
            &mut |tick| reporter.poll_tick(tick, 60, 90),
        )?;

        reporter.advance(FlowStage::Materializing, 95, "Saving result image");
        let generated =
            self.materializer
                .materialize(&remote.bytes, INPAINT_STEM, OutputFormat::Jpeg)?;
        reporter.advance(
            FlowStage::Done,
            100,
            format!("Saved {}", generated.path.display()),
        );
        Ok(generated)
    }

    /// Known, released products in caller order; at least one is required.
    fn resolve_products(&self, names: &[String]) -> Result<Vec<ProductSelection>, EngineError> {
        let names: Vec<&str> = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(EngineError::Validation(
                "Please select at least one product code.".to_string(),
            ));
        }
        names
            .into_iter()
            .map(|name| {
                let product = self.catalog.get(name).ok_or_else(|| {
                    EngineError::Validation(format!("Unknown product code: {name}"))
                })?;
                if !product.is_available() {
                    return Err(EngineError::Validation(format!(
                        "Product {} is not available yet.",
                        product.short_code()
                    )));
                }
                self.catalog.select(name).ok_or_else(|| {
                    EngineError::Validation(format!("Unknown product code: {name}"))
                })
            })
            .collect()
    }
}

/// Emits progress events with non-decreasing percentages and remembers the current stage.
struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    flow: FlowKind,
    stage: Cell<FlowStage>,
    percent: Cell<u8>,
}

impl<'a> Reporter<'a> {
    fn new(sink: &'a dyn ProgressSink, flow: FlowKind) -> Self {
        Self {
            sink,
            flow,
            stage: Cell::new(FlowStage::Start),
            percent: Cell::new(0),
        }
    }

    fn advance(&self, stage: FlowStage, percent: u8, message: impl Into<String>) {
        let percent = percent.max(self.percent.get()).min(100);
        self.stage.set(stage);
        self.percent.set(percent);
        let message = message.into();
        debug!(flow = ?self.flow, ?stage, percent, "{message}");
        self.sink.emit(ProgressEvent {
            flow: self.flow,
            stage,
            percent,
            message,
        });
    }

    fn poll_tick(&self, tick: &PollTick, from: u8, to: u8) {
        let span = u32::from(to.saturating_sub(from));
        let done = tick.attempt.min(tick.expected);
        let percent = from as u32 + span * done / tick.expected.max(1);
        self.advance(
            FlowStage::Polling,
            percent as u8,
            format!("Job status {} (poll {})", tick.status.label(), tick.attempt),
        );
    }

    fn fail(&self, err: &EngineError) -> FlowFailure {
        let stage = self.stage.get();
        let message = err.user_message();
        error!(flow = ?self.flow, ?stage, kind = ?err.kind(), error = %err, "run failed");
        self.sink.emit(ProgressEvent {
            flow: self.flow,
            stage: FlowStage::Failed,
            percent: self.percent.get(),
            message: message.clone(),
        });
        FlowFailure {
            stage,
            kind: err.kind(),
            message,
        }
    }
}
