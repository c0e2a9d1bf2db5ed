//! Handler registry (part of C9).
//!
//! Replaces a reflective handler registry (annotation-scanned at
//! startup) with a plain `name -> Arc<dyn CommandHandler>` map built
//! once and handed to the executor. Re-registering a name fails loudly
//! at build time instead of silently overwriting.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use messaging_core::CommandReply;
use uuid::Uuid;

use crate::error::HandlerError;

/// The envelope a handler receives: everything it needs to do its work
/// plus the identity to stamp onto the reply it produces.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub command_id: Uuid,
    pub message_id: String,
    pub name: String,
    pub business_key: String,
    pub payload: String,
    pub reply_spec: serde_json::Value,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, envelope: &CommandEnvelope) -> Result<CommandReply, HandlerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler already registered for command: {0}")]
    DuplicateRegistration(String),
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }
}

pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistryBuilder {
    fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateRegistration(name));
        }
        self.handlers.insert(name, handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

impl Default for HandlerRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
