use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use quartzviz_contracts::catalog::ProductCatalog;
use quartzviz_contracts::events::{EventWriter, ProgressEvent};
use quartzviz_contracts::jobs::ResourceHandle;
use quartzviz_engine::compiler::compile_inpaint_graph;
use quartzviz_engine::{
    CancelToken, EngineSettings, FlowOutcome, ImageToImageRequest, Orchestrator, RegionLabel,
    ServiceConfig, SizeChoice, TextToImageRequest,
};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quartzviz", version, about = "Quartz surface visualization CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a scene from a text prompt featuring the selected products.
    #[command(name = "text2img")]
    TextToImage(TextToImageArgs),
    /// Paste a product texture into a region of an existing photo.
    #[command(name = "img2img")]
    ImageToImage(ImageToImageArgs),
    /// List product groups and availability.
    Catalog(CatalogArgs),
    /// Print the compiled inpaint workflow for two resource handles.
    Graph(GraphArgs),
}

#[derive(Debug, Args)]
struct SizeArgs {
    /// A preset such as 1024x1024, or "Custom size" together with --custom-size.
    #[arg(long, default_value = "1024x1024")]
    size: String,
    #[arg(long)]
    custom_size: Option<String>,
}

impl SizeArgs {
    fn choice(&self) -> SizeChoice {
        SizeChoice::from_form(&self.size, self.custom_size.as_deref())
    }
}

#[derive(Debug, Parser)]
struct TextToImageArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    size: SizeArgs,
    /// Full product name, e.g. "C1012 Glacier White". Repeatable.
    #[arg(long = "product")]
    products: Vec<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ImageToImageArgs {
    #[arg(long)]
    image: PathBuf,
    /// Region to segment. Repeatable; the first one is used.
    #[arg(long = "region")]
    regions: Vec<String>,
    #[command(flatten)]
    size: SizeArgs,
    #[arg(long = "product")]
    products: Vec<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct CatalogArgs {
    /// JSON catalog file; the built-in catalog when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    asset_root: PathBuf,
}

#[derive(Debug, Parser)]
struct GraphArgs {
    #[arg(long)]
    source_handle: String,
    #[arg(long)]
    texture_handle: String,
    #[arg(long, default_value = "wall")]
    region: String,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("quartzviz error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::TextToImage(args) => run_text_to_image(args),
        Command::ImageToImage(args) => run_image_to_image(args),
        Command::Catalog(args) => {
            run_catalog(args)?;
            Ok(0)
        }
        Command::Graph(args) => {
            run_graph(args)?;
            Ok(0)
        }
    }
}

fn run_text_to_image(args: TextToImageArgs) -> Result<i32> {
    let request = TextToImageRequest {
        prompt: args.prompt,
        size: args.size.choice(),
        products: args.products,
    };
    run_flow(args.events, move |orchestrator, progress, cancel| {
        orchestrator.text_to_image(&request, progress, cancel)
    })
}

fn run_image_to_image(args: ImageToImageArgs) -> Result<i32> {
    let region = match args.regions.as_slice() {
        [single] => RegionLabel::from(single.as_str()),
        _ => RegionLabel::from(args.regions.clone()),
    };
    let request = ImageToImageRequest {
        source_image: args.image,
        region,
        size: args.size.choice(),
        products: args.products,
    };
    run_flow(args.events, move |orchestrator, progress, cancel| {
        orchestrator.image_to_image(&request, progress, cancel)
    })
}

/// Runs one flow on a worker thread and renders its progress on this one.
fn run_flow<F>(events: Option<PathBuf>, flow: F) -> Result<i32>
where
    F: FnOnce(&Orchestrator, &mpsc::Sender<ProgressEvent>, &CancelToken) -> FlowOutcome
        + Send
        + 'static,
{
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    let catalog = config
        .load_catalog()
        .context("failed to load product catalog")?;
    let orchestrator =
        Orchestrator::from_config(&config, Arc::new(catalog), EngineSettings::default())
            .context("failed to prepare output directory")?;

    let run_id = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
    let writer = events.map(|path| EventWriter::new(path, run_id.clone()));
    info!(%run_id, output_dir = %config.output_dir.display(), "run started");

    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let worker = thread::spawn(move || flow(&orchestrator, &tx, &worker_cancel));

    let mut log_error = None;
    for event in rx {
        print_event(&event);
        if let Some(writer) = &writer {
            if let Err(err) = writer.record(&event) {
                // Stop the run at its next checkpoint; keep draining so the worker can finish.
                cancel.cancel();
                log_error.get_or_insert(err);
            }
        }
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow!("run worker panicked"))?;
    if let Some(err) = log_error {
        return Err(err.context("failed writing events file"));
    }
    match outcome {
        FlowOutcome::Completed(generated) => {
            println!("saved {}", generated.path.display());
            Ok(0)
        }
        FlowOutcome::Failed(failure) => {
            eprintln!("{}", failure.message);
            Ok(1)
        }
    }
}

fn print_event(event: &ProgressEvent) {
    let stage = serde_json::to_value(event.stage)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    println!("[{:>3}%] {stage:<15} {}", event.percent, event.message);
}

fn run_catalog(args: CatalogArgs) -> Result<()> {
    let catalog = match &args.catalog {
        Some(path) => ProductCatalog::from_json_file(path, args.asset_root.clone())
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => ProductCatalog::builtin(args.asset_root.clone()),
    };
    for group in catalog.groups() {
        println!("{} ({})", group.name, group.color);
        for product in group.products.values() {
            let status = if !product.is_available() {
                "coming soon"
            } else if catalog
                .select(&product.name)
                .and_then(|selection| selection.texture_path)
                .is_some_and(|path| path.is_file())
            {
                "available"
            } else {
                "available (texture missing)"
            };
            println!("  {:<28} {status}", product.name);
        }
    }
    Ok(())
}

fn run_graph(args: GraphArgs) -> Result<()> {
    let job = compile_inpaint_graph(
        &ResourceHandle::new(args.source_handle),
        &ResourceHandle::new(args.texture_handle),
        &RegionLabel::from(args.region.as_str()),
    )?;
    let body = job.to_json()?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
