//! Application context tying settings files to running bots.
//!
//! ```no_run
//! use hourly_bot_core::app::App;
//! use hourly_bot_core::runner::RunnerOptions;
//!
//! let app = App::new(RunnerOptions::default());
//! app.run(&["conf/cats.json", "conf/dogs.json"]).unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Builder as RuntimeBuilder;

use crate::{
    config::ConfigRegistry,
    error::Result,
    runner::{BotRegistry, BotRunner, RunnerOptions},
};

/// Owns the settings and bot registries of the process.
#[derive(Debug, Default)]
pub struct App {
    configs: ConfigRegistry,
    bots: BotRegistry,
}

impl App {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            configs: ConfigRegistry::new(),
            bots: BotRegistry::new(options),
        }
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn bots(&self) -> &BotRegistry {
        &self.bots
    }

    /// Loads the settings at `path` and starts the bot bound to them.
    pub fn start_bot<P>(&self, path: P) -> Result<Arc<BotRunner>>
    where
        P: AsRef<Path>,
    {
        let settings = self.configs.get_or_create(path)?;
        self.bots.get_or_create(&settings)
    }

    /// Starts a bot for every path. Either all of them start or, on the first
    /// failure, the ones already started are stopped again.
    pub fn start_all<P>(&self, paths: &[P]) -> Result<Vec<Arc<BotRunner>>>
    where
        P: AsRef<Path>,
    {
        let mut runners = Vec::with_capacity(paths.len());
        for path in paths {
            match self.start_bot(path) {
                Ok(runner) => runners.push(runner),
                Err(err) => {
                    for runner in &runners {
                        runner.stop();
                    }
                    return Err(err);
                }
            }
        }
        Ok(runners)
    }

    pub fn stop_all(&self) {
        self.bots.stop_all();
    }

    /// Starts the bots and keeps them running until Ctrl-C is received.
    pub fn run<P>(&self, paths: &[P]) -> Result<()>
    where
        P: AsRef<Path>,
    {
        debug!("Starting {} bot(s)...", paths.len());
        self.start_all(paths)?;
        info!("All bots are started, press Ctrl-C to stop");

        let signal = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(tokio::signal::ctrl_c());

        info!("Shutting down...");
        self.stop_all();
        signal?;
        Ok(())
    }
}
