//! Assemble a [`KnowledgeGraph`] from [`Settings`].

use std::sync::Arc;

use kgraph_core::config::{BackendSettings, IdStrategy, LedgerSettings};
use kgraph_core::Settings;
use kgraph_ledger::{IdGenerator, IdentifierRegistry, KindCounter, RandomToken};
use kgraph_ontology::Ontology;
use kgraph_store::bolt::{BoltClient, BoltConfig};
use kgraph_store::terminus::TerminusClient;
use kgraph_store::{DocumentAdapter, GraphBackend, PropertyGraphAdapter};

use crate::schema::terminus_classes;
use crate::{KnowledgeGraph, Result};

/// Load the ontology, open the identifier ledger and connect the configured
/// backend. A document backend gets the ontology installed as its schema.
pub async fn connect(settings: &Settings) -> Result<KnowledgeGraph> {
    let ontology = Arc::new(Ontology::load(
        &settings.ontology.hierarchy_path,
        &settings.ontology.data_model_path,
    )?);
    let registry = Arc::new(open_registry(&settings.ledger)?);
    let backend = connect_backend(&settings.backend, &ontology).await?;

    tracing::info!(
        backend = backend.name(),
        kinds = ontology.hierarchy().len(),
        issued = registry.issued_count(),
        "Knowledge graph ready"
    );
    Ok(KnowledgeGraph::new(ontology, registry, backend).with_page_size(settings.search.page_size))
}

pub fn open_registry(settings: &LedgerSettings) -> Result<IdentifierRegistry> {
    let generator: Box<dyn IdGenerator> = match settings.strategy {
        IdStrategy::Random => Box::new(RandomToken),
        IdStrategy::Counter => Box::new(KindCounter::new()),
    };
    Ok(IdentifierRegistry::with_generator(
        settings.path.clone(),
        generator,
        settings.max_attempts,
    )?)
}

pub async fn connect_backend(
    settings: &BackendSettings,
    ontology: &Ontology,
) -> Result<Arc<dyn GraphBackend>> {
    match settings {
        BackendSettings::Neo4j(neo4j) => {
            let client = BoltClient::connect(&BoltConfig::from(neo4j)).await?;
            Ok(Arc::new(PropertyGraphAdapter::new(client)))
        }
        BackendSettings::Terminusdb(terminus) => {
            let client = TerminusClient::connect(terminus).await?;
            client.replace_schema(&terminus_classes(ontology)).await?;
            Ok(Arc::new(DocumentAdapter::new(client)))
        }
    }
}
