#[macro_use]
extern crate v2c_core;

use std::path::PathBuf;
use std::process;

use tracing::error;

use app::Application;
use config::Configuration;
use opts::Opts;
use v2c_core::Result;

mod app;
mod config;
mod fmt;
mod opts;
mod table;

static DEFAULT_CONFIG_FILE: &str = ".v2c.yml";

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::from_args();
    fmt::setup_tracing(&opts);

    let config_path = opts.config.clone().unwrap_or_else(|| {
        match dirs_next::config_dir() {
            Some(config_dir) => config_dir.join(DEFAULT_CONFIG_FILE),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    });
    let config = match Configuration::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("`{}` - {:?}", config_path.display(), e);
            process::exit(1);
        }
    };

    let mut app = match Application::new(config, &opts) {
        Ok(app) => app,
        Err(error) => {
            error!(reason = %format!("{:?}", error), "failed to initialize v2c");
            process::exit(1);
        }
    };

    if let Err(error) = app.process_opts(opts).await {
        error!(reason = %format!("{:?}", error), "execution failed");
        process::exit(1);
    }
    Ok(())
}
