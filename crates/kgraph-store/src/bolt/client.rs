//! Neo4j connection management and shared Bolt client.

use kgraph_core::config::Neo4jSettings;
use neo4rs::{query, ConfigBuilder, Graph, Query};

use crate::{Result, StoreError};

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct BoltConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for BoltConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "kgraph-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl From<&Neo4jSettings> for BoltConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Thread-safe Neo4j client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct BoltClient {
    graph: Graph,
}

impl BoltClient {
    /// Connect to Neo4j and make sure entity ids are unique.
    pub async fn connect(config: &BoltConfig) -> Result<Self> {
        let unavailable = |e: neo4rs::Error| StoreError::Unavailable {
            backend: "neo4j",
            message: e.to_string(),
        };

        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(unavailable)?;

        let graph = Graph::connect(neo_config).await.map_err(unavailable)?;
        let client = Self { graph };
        client.ensure_constraints().await?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(client)
    }

    async fn ensure_constraints(&self) -> Result<()> {
        self.run(query(
            "CREATE CONSTRAINT kgraph_entity_id IF NOT EXISTS
             FOR (n:Entity) REQUIRE n.id IS UNIQUE",
        ))
        .await
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Execute a write-only query.
    pub async fn run(&self, query: Query) -> Result<()> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Execute a query ending in `RETURN count(..) AS cnt`.
    pub async fn query_count(&self, query: Query) -> Result<i64> {
        match self.query_one(query).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}
