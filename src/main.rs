use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;
use rebuildr::constants::{DEFAULT_DOCKER_BINARY, STATE_DIR_ENV};
use rebuildr::engine::{BuildInput, DockerCliEngine};
use rebuildr::{logging, BuildTaskConfig, ExecutionContext, ImageTask, Verdict};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "rebuildr",
    version,
    about = "Rebuild container images only when their build context changed"
)]
struct Cli {
    /// Suppress engine build output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "REBUILDR_JSON_LOGS")]
    json_logs: bool,

    /// Engine client binary
    #[arg(long, global = true, env = "REBUILDR_DOCKER", default_value = DEFAULT_DOCKER_BINARY)]
    docker: PathBuf,

    /// Where build records are kept
    #[arg(long, global = true, env = STATE_DIR_ENV)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the image if it is stale
    Build {
        #[command(flatten)]
        task: TaskArgs,

        /// Skip the staleness check and always build
        #[arg(long)]
        force: bool,
    },
    /// Report whether the image is stale
    Status {
        #[command(flatten)]
        task: TaskArgs,
    },
    /// Write the build context archive for inline steps to a file
    Pack {
        #[command(flatten)]
        task: TaskArgs,

        #[arg(short, long)]
        output: PathBuf,

        /// Gzip the archive
        #[arg(long)]
        gzip: bool,
    },
    /// List the files that would be sent as build context
    Files {
        #[command(flatten)]
        task: TaskArgs,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Task file (JSON); flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    image: Option<String>,

    #[arg(long)]
    tag: Option<String>,

    #[arg(long)]
    context: Option<PathBuf>,

    #[arg(long, conflicts_with_all = ["steps", "steps_file"])]
    dockerfile: Option<PathBuf>,

    /// Inline Dockerfile text
    #[arg(long, conflicts_with = "steps_file")]
    steps: Option<String>,

    /// Read inline Dockerfile text from a file
    #[arg(long)]
    steps_file: Option<PathBuf>,

    /// KEY=VALUE, repeatable
    #[arg(long = "build-arg", value_parser = parse_key_val)]
    build_args: Vec<(String, String)>,

    /// Pull the base image on build
    #[arg(long)]
    pull: bool,

    /// Ignore-pattern file, repeatable
    #[arg(long = "ignore-file")]
    ignore_files: Vec<PathBuf>,
}

impl TaskArgs {
    fn into_config(self) -> Result<BuildTaskConfig> {
        let mut config = match &self.config {
            Some(path) => BuildTaskConfig::from_file(path)?,
            None => BuildTaskConfig {
                context: PathBuf::from("."),
                ..Default::default()
            },
        };
        if let Some(image) = self.image {
            config.image = image;
        }
        if self.tag.is_some() {
            config.tag = self.tag;
        }
        if let Some(context) = self.context {
            config.context = context;
        }
        if let Some(dockerfile) = self.dockerfile {
            config.dockerfile = Some(dockerfile);
            config.steps = None;
        }
        if let Some(steps) = self.steps {
            config.steps = Some(steps);
            config.dockerfile = None;
        }
        if let Some(path) = self.steps_file {
            let steps = fs::read_to_string(&path)
                .with_context(|| format!("reading steps from {}", path.display()))?;
            config.steps = Some(steps);
            config.dockerfile = None;
        }
        config.args.extend(self.build_args);
        config.pull_base_image_on_build |= self.pull;
        if !self.ignore_files.is_empty() {
            config.ignore_files = self.ignore_files;
        }
        Ok(config)
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs, cli.verbose)
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let working_dir = std::env::current_dir()?;
    let engine = Arc::new(DockerCliEngine::with_binary(&cli.docker));
    let mut ctx = ExecutionContext::new(working_dir, engine)
        .with_quiet(cli.quiet)
        .with_cancel(cancel);
    if let Some(dir) = cli.state_dir {
        ctx = ctx.with_state_dir(dir);
    }

    match cli.command {
        Command::Build { task, force } => {
            let task = ImageTask::new(task.into_config()?);
            let mut sink = std::io::stdout();
            let built = task.run(&ctx, force, &mut sink).await?;
            if !built {
                println!("{} is up to date", ctx.image_name(task.config()));
            }
        }
        Command::Status { task } => {
            let task = ImageTask::new(task.into_config()?);
            let image = ctx.image_name(task.config());
            match task.staleness(&ctx).await? {
                Verdict::Fresh => println!("{image}: fresh"),
                Verdict::Stale(reason) => println!("{image}: stale ({reason})"),
            }
        }
        Command::Pack {
            task,
            output,
            gzip,
        } => {
            let config = task.into_config()?;
            if config.steps.is_none() {
                bail!("pack needs inline steps (--steps or --steps-file)");
            }
            let task = ImageTask::new(config);
            let BuildInput::Archive(archive) = task.build_input(&ctx).await? else {
                bail!("task did not produce an archive");
            };
            let file = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            if gzip {
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&archive)?;
                encoder.finish()?;
            } else {
                let mut file = file;
                file.write_all(&archive)?;
            }
            println!("Wrote {} bytes of build context to {}", archive.len(), output.display());
        }
        Command::Files { task } => {
            let task = ImageTask::new(task.into_config()?);
            for path in task.context_files(&ctx).await? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
