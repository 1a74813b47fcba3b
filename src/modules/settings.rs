use std::sync::Arc;

use anyhow::Error;
use teloxide::prelude::*;

use crate::{config::Settings, module_mgr::Module};

/// Makes the bot's [`Settings`] available to every handler.
pub(crate) struct SettingsModule {
    settings: Arc<Settings>,
}

impl SettingsModule {
    pub(crate) fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Module for SettingsModule {
    async fn register_dependency(&mut self, dep_map: &mut DependencyMap) -> Result<(), Error> {
        dep_map.insert(Arc::clone(&self.settings));
        Ok(())
    }
}
