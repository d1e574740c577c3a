#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use pixeldock::jobs::{JobManager, JobRequest, JobSubmitter, MemoryJobStore, OwnerId};
use pixeldock::{ObjectController, RuntimeConfig, StoredObject};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(name = "pixeldock", version, about = "Image storage and processing job dispatch.")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// The path to the YAML config file.
    #[clap(short, long, env = "PIXELDOCK_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Writes a template config file for the given storage backend.
    Init {
        /// One of `local`, `s3` or `azure`.
        #[clap(short, long)]
        backend: String,

        #[clap(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Validates the config and constructs the storage backend.
    Check {
        #[clap(flatten)]
        cfg: ConfigArgs,
    },

    /// Uploads a file to the configured storage backend.
    Upload {
        #[clap(flatten)]
        cfg: ConfigArgs,

        file: PathBuf,

        /// The name to store the file as, defaults to the file's name.
        #[clap(long)]
        name: Option<String>,
    },

    /// Downloads an object into a local file.
    Download {
        #[clap(flatten)]
        cfg: ConfigArgs,

        name: String,

        output: PathBuf,
    },

    /// Deletes an object from the configured storage backend.
    Delete {
        #[clap(flatten)]
        cfg: ConfigArgs,

        name: String,
    },

    /// Submits a processing job for a stored object to the worker.
    Submit {
        #[clap(flatten)]
        cfg: ConfigArgs,

        /// The stored name of the image to transform.
        source: String,

        #[clap(long)]
        width: u32,

        #[clap(long)]
        height: u32,

        /// The target format, e.g. `png` or `webp`.
        #[clap(long)]
        format: String,

        #[clap(long, default_value = "cli")]
        job_name: String,

        #[clap(long, env = "PIXELDOCK_OWNER", default_value = "cli")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pixeldock=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Cli = Cli::parse();
    match args.command {
        Command::Init { backend, output } => run_init(&backend, output).await,
        Command::Check { cfg } => run_check(cfg).await,
        Command::Upload { cfg, file, name } => run_upload(cfg, file, name).await,
        Command::Download { cfg, name, output } => run_download(cfg, &name, output).await,
        Command::Delete { cfg, name } => run_delete(cfg, &name).await,
        Command::Submit {
            cfg,
            source,
            width,
            height,
            format,
            job_name,
            owner,
        } => {
            let request = |object: StoredObject| JobRequest {
                job_name,
                source: object,
                width,
                height,
                format,
            };
            run_submit(cfg, source, request, OwnerId(owner)).await
        },
    }
}

async fn run_init(backend: &str, output: PathBuf) -> Result<()> {
    let template = RuntimeConfig::template(backend)?;
    let out = serde_yaml::to_string(&template)?;
    tokio::fs::write(&output, out).await?;

    info!("Wrote {} config template to {:?}", backend, &output);
    Ok(())
}

async fn controller(cfg: &ConfigArgs) -> Result<(RuntimeConfig, ObjectController)> {
    let config = RuntimeConfig::from_file(&cfg.config)?;
    let storage = config.storage.connect().await?;
    Ok((config, ObjectController::new(storage)))
}

async fn run_check(cfg: ConfigArgs) -> Result<()> {
    let (config, controller) = controller(&cfg).await?;
    println!(
        "storage backend {} ok, worker endpoint {}",
        controller.backend(),
        config.worker.endpoint(),
    );
    Ok(())
}

async fn run_upload(cfg: ConfigArgs, file: PathBuf, name: Option<String>) -> Result<()> {
    let (_, controller) = controller(&cfg).await?;

    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("{:?} has no file name", &file))?,
    };

    let data = tokio::fs::read(&file).await?;
    let info = controller.upload(&name, Bytes::from(data)).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_download(cfg: ConfigArgs, name: &str, output: PathBuf) -> Result<()> {
    let (_, controller) = controller(&cfg).await?;

    let data = controller.download(name).await?;
    tokio::fs::write(&output, &data).await?;

    info!("Wrote {} bytes to {:?}", data.len(), &output);
    Ok(())
}

async fn run_delete(cfg: ConfigArgs, name: &str) -> Result<()> {
    let (_, controller) = controller(&cfg).await?;
    controller.delete(name).await?;

    info!("Deleted {}", name);
    Ok(())
}

async fn run_submit(
    cfg: ConfigArgs,
    source: String,
    request: impl FnOnce(StoredObject) -> JobRequest,
    owner: OwnerId,
) -> Result<()> {
    let (config, controller) = controller(&cfg).await?;
    let submitter = JobSubmitter::connect(&config.worker).await;

    let manager = JobManager::new(
        controller.storage(),
        Arc::new(submitter),
        Arc::new(MemoryJobStore::new()),
    );

    let source = StoredObject::new(source, controller.backend());
    let record = manager.submit_job(owner, request(source)).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
