use super::{BuildEngine, BuildInput, BuildOptions, ImageMetadata};
use crate::constants::DEFAULT_DOCKER_BINARY;
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Drives builds through the `docker` command line client.
///
/// Registry credentials come from the client's own configuration; the
/// `auth_configs` of [`BuildOptions`] are not forwarded on the command line.
#[derive(Debug, Clone)]
pub struct DockerCliEngine {
    binary: PathBuf,
}

impl Default for DockerCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCliEngine {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_DOCKER_BINARY)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command_name(&self, subcommand: &str) -> String {
        format!("{} {}", self.binary.display(), subcommand)
    }
}

#[derive(Deserialize)]
struct InspectedImage {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Created")]
    created: DateTime<Utc>,
}

/// Parse the JSON array printed by `docker image inspect`.
pub fn parse_inspect(stdout: &[u8]) -> Result<ImageMetadata, EngineError> {
    let images: Vec<InspectedImage> = serde_json::from_slice(stdout)
        .map_err(|err| EngineError::InvalidResponse(err.to_string()))?;
    images
        .into_iter()
        .next()
        .map(|image| ImageMetadata {
            id: image.id,
            created: image.created,
        })
        .ok_or_else(|| EngineError::InvalidResponse("empty inspect output".to_string()))
}

pub fn is_no_such_image(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such image") || stderr.contains("no such object")
}

/// Arguments for `docker build`. A Dockerfile path is taken relative to the
/// context directory.
pub fn build_command_args(options: &BuildOptions) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--rm".to_string(),
        "--tag".to_string(),
        options.name.clone(),
    ];
    for arg in &options.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", arg.name, arg.value));
    }
    if options.pull {
        args.push("--pull".to_string());
    }
    if options.quiet {
        args.push("--quiet".to_string());
    }
    match &options.input {
        BuildInput::Dockerfile {
            dockerfile,
            context_dir,
        } => {
            args.push("--file".to_string());
            args.push(context_dir.join(dockerfile).to_string_lossy().to_string());
            args.push(context_dir.to_string_lossy().to_string());
        }
        BuildInput::Archive(_) => args.push("-".to_string()),
    }
    args
}

#[async_trait]
impl BuildEngine for DockerCliEngine {
    async fn lookup_image(&self, name: &str) -> Result<ImageMetadata, EngineError> {
        let output = Command::new(&self.binary)
            .args(["image", "inspect", name])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_no_such_image(&stderr) {
                return Err(EngineError::NoSuchImage(name.to_string()));
            }
            return Err(EngineError::CommandFailed {
                command: self.command_name("image inspect"),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        parse_inspect(&output.stdout)
    }

    async fn build_image(
        &self,
        options: BuildOptions,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), EngineError> {
        let args = build_command_args(&options);
        tracing::debug!(command = %self.command_name(&args.join(" ")), "Starting engine build");
        if !options.auth_configs.is_empty() {
            tracing::debug!(
                registries = options.auth_configs.len(),
                "Registry auth configs are left to the docker client's credential store"
            );
        }

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let archive = match options.input {
            BuildInput::Archive(bytes) => {
                command.stdin(Stdio::piped());
                Some(bytes)
            }
            BuildInput::Dockerfile { .. } => {
                command.stdin(Stdio::null());
                None
            }
        };

        let mut child = command.spawn()?;

        let feeder = match (archive, child.stdin.take()) {
            (Some(bytes), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                stderr.read_to_string(&mut buf).await.map(|_| buf)
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                writeln!(sink, "{line}")?;
            }
        }
        sink.flush()?;

        let status = child.wait().await?;
        let fed = match feeder {
            Some(handle) => handle.await.unwrap_or_else(|err| Err(err.into())),
            None => Ok(()),
        };

        if !status.success() {
            let stderr = match stderr_reader {
                Some(handle) => handle.await.ok().and_then(Result::ok).unwrap_or_default(),
                None => String::new(),
            };
            return Err(EngineError::CommandFailed {
                command: self.command_name("build"),
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        fed?;
        Ok(())
    }
}
