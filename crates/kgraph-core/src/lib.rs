//! kgraph-core: Shared types, configuration, and error handling for kgraph.
//!
//! This crate provides the foundational types used across all kgraph components:
//! - Entity, relationship, and typed property values stored in the graph
//! - Entity filters and relationship queries understood by every backend
//! - Configuration management
//! - Configuration and validation error types

pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::Settings;
pub use error::{ConfigurationError, ValidationError, ValidationRule};
pub use filter::{Condition, EntityFilter, FilterOp};
pub use types::{
    property_map, DeleteOutcome, Entity, PropertyMap, PropertyValue, RelationQuery, Relationship,
};
