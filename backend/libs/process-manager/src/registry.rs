//! Process-type registry with single-init semantics (spec.md §3): a
//! process type can be registered exactly once for the life of the
//! process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::config::ProcessConfiguration;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("process type already registered: {0}")]
    DuplicateProcessType(String),

    #[error("unknown process type: {0}")]
    UnknownProcessType(String),
}

#[derive(Default)]
pub struct ProcessRegistry {
    configs: RwLock<HashMap<String, Arc<ProcessConfiguration>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: ProcessConfiguration) -> Result<(), RegistryError> {
        let mut configs = self.configs.write().expect("process registry lock poisoned");
        if configs.contains_key(&config.process_type) {
            return Err(RegistryError::DuplicateProcessType(config.process_type));
        }
        configs.insert(config.process_type.clone(), Arc::new(config));
        Ok(())
    }

    pub fn get(&self, process_type: &str) -> Result<Arc<ProcessConfiguration>, RegistryError> {
        self.configs
            .read()
            .expect("process registry lock poisoned")
            .get(process_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProcessType(process_type.to_string()))
    }
}
