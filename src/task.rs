use crate::config::{BuildTaskConfig, ExecutionContext};
use crate::context;
use crate::engine::{build_args, BuildInput, BuildOptions};
use crate::error::{BuildError, Result};
use crate::record::{write_record, BuildRecord};
use crate::staleness::{self, Verdict};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Builds one image when its context has moved on since the last build.
#[derive(Debug, Clone)]
pub struct ImageTask {
    config: BuildTaskConfig,
}

impl ImageTask {
    pub fn new(config: BuildTaskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildTaskConfig {
        &self.config
    }

    /// Ask the staleness oracle about this task's image.
    pub async fn staleness(&self, ctx: &ExecutionContext) -> Result<Verdict> {
        staleness::check(
            ctx.engine.as_ref(),
            &ctx.image_name(&self.config),
            &ctx.context_dir(&self.config),
            &ctx.record_path(&self.config),
            &ctx.cancel,
        )
        .await
    }

    /// Build the image if it is stale, or unconditionally when a dependency
    /// changed. Returns whether an image was built.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        has_modified_deps: bool,
        sink: &mut (dyn Write + Send),
    ) -> Result<bool> {
        self.config.validate()?;
        let image = ctx.image_name(&self.config);

        if !has_modified_deps {
            match self.staleness(ctx).await? {
                Verdict::Fresh => {
                    info!(image = %image, "is fresh");
                    return Ok(false);
                }
                Verdict::Stale(reason) => debug!(image = %image, %reason, "is stale"),
            }
        }

        let options = BuildOptions {
            name: image.clone(),
            build_args: build_args(&self.config.args),
            pull: self.config.pull_base_image_on_build,
            quiet: ctx.quiet,
            auth_configs: ctx.auth_configs.clone(),
            input: self.build_input(ctx).await?,
        };
        ctx.engine
            .build_image(options, sink)
            .await
            .map_err(BuildError::BuildEngine)?;

        let built = ctx
            .engine
            .lookup_image(&image)
            .await
            .map_err(|source| BuildError::EngineLookup {
                image: image.clone(),
                source,
            })?;

        if let Err(err) = write_record(&ctx.record_path(&self.config), &BuildRecord::new(built.id)) {
            BuildError::RecordWrite(err).downgrade("Failed to update image record")?;
        }
        info!(image = %image, "Created");
        Ok(true)
    }

    /// The archive for inline steps, or the Dockerfile and context directory.
    pub async fn build_input(&self, ctx: &ExecutionContext) -> Result<BuildInput> {
        let context_dir = ctx.context_dir(&self.config);
        match (self.config.steps(), &self.config.dockerfile) {
            (Some(steps), _) => {
                let archive = context::pack_context(
                    &context_dir,
                    steps,
                    ctx.ignore_sources(&self.config),
                    &ctx.cancel,
                )
                .await?;
                debug!(bytes = archive.len(), "Packed build context");
                Ok(BuildInput::Archive(archive))
            }
            (None, Some(dockerfile)) => Ok(BuildInput::Dockerfile {
                dockerfile: dockerfile.clone(),
                context_dir,
            }),
            (None, None) => Err(BuildError::InvalidConfig(
                "one of dockerfile or steps is required".to_string(),
            )),
        }
    }

    /// Files that would go into the context archive, in traversal order.
    pub async fn context_files(&self, ctx: &ExecutionContext) -> Result<Vec<PathBuf>> {
        context::assemble(
            &ctx.context_dir(&self.config),
            ctx.ignore_sources(&self.config),
            &ctx.cancel,
        )
        .await
    }
}
