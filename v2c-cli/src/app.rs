use crate::config::Configuration;
use crate::opts::{BuildOpts, Command, DetectiveCmd, ImageCmd, Opts, ProvisionerCmd};
use crate::table::Table;

use v2c_core::build;
use v2c_core::cancel::CancelToken;
use v2c_core::component::{split_ref, Product, PRODUCT_LABEL, PRODUCT_ORIGINAL_LABEL, UNTAGGED};
use v2c_core::registry;
use v2c_core::runtime::{ContainerRuntime, DockerRuntime};
use v2c_core::{ErrContext, Result};

use chrono::DateTime;
use futures::StreamExt;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, trace, warn};

fn set_ctrlc_handler(cancel: CancelToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("got ctrl-c");
        cancel.cancel();
    }) {
        error!(reason = %e, "failed to set ctrl-c handler");
    }
}

fn init_runtime(opts: &Opts, config: &Configuration) -> Result<DockerRuntime> {
    match opts.runtime_uri.as_ref().or(config.runtime_uri.as_ref()) {
        Some(uri) => {
            trace!(uri = %uri, "using engine uri");
            DockerRuntime::connect_uri(uri)
        }
        None => {
            trace!("using default engine socket");
            DockerRuntime::connect()
        }
    }
}

/// Validates a `REPOSITORY[:TAG]` argument; a missing tag defaults to
/// `latest`.
fn parse_tag(tag: Option<&str>) -> Result<Option<(String, String)>> {
    let Some(tag) = tag else {
        return Ok(None);
    };

    match split_ref(tag) {
        Some((repository, version)) => Ok(Some((repository.to_string(), version.to_string()))),
        None if !tag.is_empty() && !tag.contains(':') => {
            Ok(Some((tag.to_string(), "latest".to_string())))
        }
        _ => err!("malformed tag `{}`, expected REPOSITORY[:TAG]", tag),
    }
}

fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    if id.len() > 12 {
        &id[..12]
    } else {
        id
    }
}

fn dir_is_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(entries.next().is_none())
}

pub struct Application {
    config: Configuration,
    runtime: Arc<DockerRuntime>,
    cancel: CancelToken,
}

impl Application {
    pub fn new(config: Configuration, opts: &Opts) -> Result<Self> {
        let runtime = init_runtime(opts, &config)?;
        let app = Application {
            config,
            runtime: Arc::new(runtime),
            cancel: CancelToken::new(),
        };
        set_ctrlc_handler(app.cancel.clone());
        Ok(app)
    }

    pub async fn process_opts(&mut self, opts: Opts) -> Result<()> {
        match opts.command {
            Command::Build(build_opts) => self.build(build_opts).await,
            Command::Image { object } => match object {
                ImageCmd::List => self.list_products().await,
                ImageCmd::Rm {
                    force,
                    no_prune,
                    ids,
                } => self.remove_images(ids, force, no_prune).await,
                ImageCmd::Export { output, id } => self.export_image(&id, output).await,
            },
            Command::Detective { object } => match object {
                DetectiveCmd::List => self.list_detectives().await,
                DetectiveCmd::Install { name } => self.install_component(&name).await,
            },
            Command::Provisioner { object } => match object {
                ProvisionerCmd::List => self.list_provisioners().await,
                ProvisionerCmd::Install { name } => self.install_component(&name).await,
            },
        }
    }

    async fn build(&self, opts: BuildOpts) -> Result<()> {
        let tag = parse_tag(opts.tag.as_deref())?;
        let source_image = opts.path.canonicalize().with_context(|| {
            format!("guest disk image `{}` is not accessible", opts.path.display())
        })?;
        let output_dir = env::current_dir().context("failed to resolve working directory")?;

        if !dir_is_empty(&output_dir)? {
            warn!("working directory is not empty, existing build materials may be overwritten");
        }

        let mut ctx = build::Context::new(self.runtime.clone(), &source_image, &output_dir)
            .cancel_token(self.cancel.clone())
            .no_cleanup(opts.no_cleanup);
        if let Some(volume) = &self.config.transport_volume {
            ctx = ctx.transport_volume(volume.clone());
        }
        if let Some(categories) = &self.config.categories {
            ctx = ctx.categories(categories.clone());
        }

        let recipe = build::run(&ctx).await?;
        info!(recipe = %recipe.display(), "build context assembled");

        // The assembled context is handed to the regular builder.
        match tag {
            Some((repository, version)) => info!(
                "run `docker build -t {}:{} {}` to produce the image",
                repository,
                version,
                output_dir.display()
            ),
            None => info!(
                "run `docker build {}` to produce the image",
                output_dir.display()
            ),
        }
        Ok(())
    }

    async fn list_products(&self) -> Result<()> {
        let images = self.runtime.list_images_by_label(PRODUCT_LABEL).await?;

        let mut products = Vec::new();
        for image in images {
            let original = image
                .labels
                .get(PRODUCT_ORIGINAL_LABEL)
                .cloned()
                .unwrap_or_default();
            let repo_tags = if image.repo_tags.is_empty() {
                vec![format!("{}:{}", UNTAGGED, UNTAGGED)]
            } else {
                image.repo_tags.clone()
            };
            for repo_tag in repo_tags {
                let (repository, version) = split_ref(&repo_tag)
                    .with_context(|| format!("image {} carries a malformed tag", image.id))?;
                products.push(Product {
                    image_id: image.id.clone(),
                    repository: repository.to_string(),
                    tag: version.to_string(),
                    original: original.clone(),
                    created: image.created,
                });
            }
        }

        let mut table = Table::new(["ID", "REPOSITORY", "TAG", "ORIGINAL", "CREATED"]);
        for product in products {
            let created = DateTime::from_timestamp(product.created, 0)
                .map(|created| created.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            table.push_row([
                short_id(&product.image_id).to_string(),
                product.repository,
                product.tag,
                product.original,
                created,
            ]);
        }
        print!("{}", table.render());
        Ok(())
    }

    async fn list_detectives(&self) -> Result<()> {
        let components = registry::detect_components(self.runtime.as_ref()).await?;

        let mut table = Table::new(["REPOSITORY", "TAG", "CATEGORY", "DESCRIPTION", "RELATED"]);
        for detective in components.detectives {
            table.push_row([
                detective.repository,
                detective.tag,
                detective.category,
                detective.description,
                detective.related,
            ]);
        }
        print!("{}", table.render());
        Ok(())
    }

    async fn list_provisioners(&self) -> Result<()> {
        let components = registry::detect_components(self.runtime.as_ref()).await?;

        let mut table = Table::new(["REPOSITORY", "TAG", "CATEGORY", "DESCRIPTION"]);
        for provisioner in components.provisioners {
            table.push_row([
                provisioner.repository,
                provisioner.tag,
                provisioner.category,
                provisioner.description,
            ]);
        }
        print!("{}", table.render());
        Ok(())
    }

    async fn install_component(&self, name: &str) -> Result<()> {
        info!(component = %name, "installing");
        self.runtime.pull_image(name).await?;
        info!(component = %name, "installed");
        Ok(())
    }

    async fn remove_images(&self, ids: Vec<String>, force: bool, no_prune: bool) -> Result<()> {
        for id in ids {
            self.runtime.remove_image(&id, force, no_prune).await?;
            info!(image = %id, "removed");
        }
        Ok(())
    }

    async fn export_image(&self, id: &str, output: Option<PathBuf>) -> Result<()> {
        let mut export = self.runtime.export_image(id).await?;

        let mut writer: Box<dyn Write> = match &output {
            Some(path) => Box::new(
                fs::File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?,
            ),
            None => Box::new(std::io::stdout()),
        };

        while let Some(chunk) = export.next().await {
            writer
                .write_all(&chunk?)
                .context("failed to write exported image")?;
        }
        writer.flush().context("failed to flush exported image")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_tag_arguments() {
        assert_eq!(parse_tag(None).unwrap(), None);
        assert_eq!(
            parse_tag(Some("app")).unwrap(),
            Some(("app".to_string(), "latest".to_string()))
        );
        assert_eq!(
            parse_tag(Some("registry:5000/app:v1")).unwrap(),
            Some(("registry:5000/app".to_string(), "v1".to_string()))
        );
        assert!(parse_tag(Some("app:")).is_err());
        assert!(parse_tag(Some(":v1")).is_err());
        assert!(parse_tag(Some("")).is_err());
    }

    #[test]
    fn shortens_image_ids() {
        assert_eq!(
            short_id("sha256:0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
        assert_eq!(short_id("abc"), "abc");
    }
}
