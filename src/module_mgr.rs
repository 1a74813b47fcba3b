#![doc(hidden)]

use anyhow::Error;
use teloxide::prelude::*;

use crate::types::TeloxideHandler;

/// A unit of bot behavior: the dependencies it provides and the updates it
/// handles.
#[async_trait]
pub(crate) trait Module: Send {
    async fn register_dependency(&mut self, _dep_map: &mut DependencyMap) -> Result<(), Error> {
        Ok(())
    }

    fn handler_chain(&self) -> TeloxideHandler {
        dptree::entry()
    }
}

pub(crate) struct ModuleManager {
    modules: Vec<Box<dyn Module + 'static>>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self { modules: vec![] }
    }

    pub fn register_module<C>(&mut self, module: C)
    where
        C: Module + 'static,
    {
        self.modules.push(Box::new(module));
    }

    pub fn with_all_modules<F>(&self, mut f: F)
    where
        F: FnMut(&dyn Module),
    {
        for module in self.modules.iter() {
            f(module.as_ref());
        }
    }

    pub async fn register_dependencies(&mut self, dep_map: &mut DependencyMap) -> Result<(), Error> {
        for module in self.modules.iter_mut() {
            module.register_dependency(dep_map).await?;
        }
        Ok(())
    }
}
