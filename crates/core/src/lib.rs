//! Research Knowledge-Graph Construction & Progression Engine — core crate.
//!
//! This crate hosts the three tightly coupled subsystems described in the
//! design: the paper-acquisition layer (`acquisition`, `importer`), the
//! extraction + matching pipeline (`extraction`, `matching`), and the
//! research workflow engine (`agents`, `workflow`, `sandbox`, `events`).
//! The property-graph store, the LLM provider, and the embedding provider
//! are specified only as traits (`graph::Repository`, `agents::llm::LlmClient`,
//! `extraction::embeddings::EmbeddingProvider`).

pub mod acquisition;
pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod extraction;
pub mod graph;
pub mod importer;
pub mod matching;
pub mod sandbox;
pub mod telemetry;
pub mod workflow;

pub use config::RuntimeConfig;
pub use error::AgenticKgError;

use std::sync::Arc;

use crate::acquisition::aggregator::Aggregator;
use crate::events::EventBus;
use crate::graph::repository::Repository;
use crate::importer::Importer;

/// Top-level facade wiring the acquisition layer, the graph repository,
/// and the process-wide event bus together, the way `runtime/src/lib.rs`'s
/// `AgentRuntime` wires its scheduler/lifecycle/resource/communication
/// components.
#[derive(Clone)]
pub struct AgenticKg {
    pub repository: Arc<dyn Repository>,
    pub aggregator: Arc<Aggregator>,
    pub importer: Arc<Importer>,
    pub events: Arc<EventBus>,
    config: Arc<RuntimeConfig>,
}

impl AgenticKg {
    /// Assemble the facade from a repository implementation, a
    /// pre-built source aggregator, and a configuration snapshot.
    pub fn new(repository: Arc<dyn Repository>, aggregator: Arc<Aggregator>, config: RuntimeConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let importer = Arc::new(Importer::new(repository.clone()));
        Self {
            repository,
            aggregator,
            importer,
            events,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}
