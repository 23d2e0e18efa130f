//! Configuration for the table sink.
//!
//! ## StoreConfig
//!
//! Connection settings handed to the storage client when the table is opened.
//! Resolved once at startup from three layers, highest precedence first:
//!
//! 1. the pipeline-wide `root.location` override,
//! 2. caller-supplied properties,
//! 3. built-in defaults.
//!
//! | Key                   | Description                          | Default                       |
//! |-----------------------|--------------------------------------|-------------------------------|
//! | `cluster.distributed` | Whether the store runs as a cluster  | `true`                        |
//! | `root.location`       | Root directory of the store          | `hdfs://localhost:8020/hbase` |
//! | `coordinator.quorum`  | Coordination service hosts           | `localhost`                   |
//!
//! Unknown keys are ignored.
//!
//! ## AdapterOptions
//!
//! Everything fixed for the lifetime of one adapter: table name, mapper,
//! properties and durability. Built with [`AdapterOptions::builder`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SinkError};
use crate::mapper::RecordMapper;
use crate::mutation::Durability;

pub const CLUSTER_DISTRIBUTED: &str = "cluster.distributed";
pub const ROOT_LOCATION: &str = "root.location";
pub const COORDINATOR_QUORUM: &str = "coordinator.quorum";

/// Pipeline-wide configuration, as handed to `prepare`.
pub type PipelineConfig = HashMap<String, String>;

fn default_cluster_distributed() -> bool {
    true
}

fn default_root_location() -> String {
    "hdfs://localhost:8020/hbase".to_string()
}

fn default_coordinator_quorum() -> String {
    "localhost".to_string()
}

/// Resolved store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_cluster_distributed")]
    pub cluster_distributed: bool,

    #[serde(default = "default_root_location")]
    pub root_location: String,

    #[serde(default = "default_coordinator_quorum")]
    pub coordinator_quorum: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cluster_distributed: default_cluster_distributed(),
            root_location: default_root_location(),
            coordinator_quorum: default_coordinator_quorum(),
        }
    }
}

impl StoreConfig {
    /// Parse properties on top of the defaults.
    pub fn from_config_map(config: &HashMap<String, String>) -> Result<Self> {
        let mut resolved = Self::default();

        if let Some(raw) = config.get(CLUSTER_DISTRIBUTED) {
            resolved.cluster_distributed = parse_bool(CLUSTER_DISTRIBUTED, raw)?;
        }
        if let Some(root) = config.get(ROOT_LOCATION) {
            resolved.root_location = root.trim().to_string();
        }
        if let Some(quorum) = config.get(COORDINATOR_QUORUM) {
            resolved.coordinator_quorum = quorum.trim().to_string();
        }

        resolved.validate()?;
        Ok(resolved)
    }

    /// Resolve all three layers.
    ///
    /// A blank pipeline `root.location` counts as unset.
    pub fn resolve(
        properties: Option<&HashMap<String, String>>,
        pipeline: &PipelineConfig,
    ) -> Result<Self> {
        let mut resolved = match properties {
            Some(props) => Self::from_config_map(props)?,
            None => Self::default(),
        };

        if let Some(root) = pipeline
            .get(ROOT_LOCATION)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            tracing::info!(root_location = %root, "using pipeline root location override");
            resolved.root_location = root.to_string();
        }

        Ok(resolved)
    }

    /// Flatten back into property form, keyed like the input properties.
    pub fn to_config_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                CLUSTER_DISTRIBUTED.to_string(),
                self.cluster_distributed.to_string(),
            ),
            (ROOT_LOCATION.to_string(), self.root_location.clone()),
            (COORDINATOR_QUORUM.to_string(), self.coordinator_quorum.clone()),
        ])
    }

    fn validate(&self) -> Result<()> {
        if self.root_location.is_empty() {
            return Err(SinkError::Config(format!("'{}' must not be empty", ROOT_LOCATION)));
        }
        if self.coordinator_quorum.is_empty() {
            return Err(SinkError::Config(format!(
                "'{}' must not be empty",
                COORDINATOR_QUORUM
            )));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(SinkError::Config(format!(
            "invalid {}: '{}' (expected true or false)",
            key, other
        ))),
    }
}

/// Settings fixed for the lifetime of one adapter.
#[derive(Clone)]
pub struct AdapterOptions {
    table_name: String,
    mapper: Arc<dyn RecordMapper>,
    properties: Option<HashMap<String, String>>,
    durability: Durability,
}

impl AdapterOptions {
    /// Start building options for `table_name`, mapped with `mapper`.
    pub fn builder(
        table_name: impl Into<String>,
        mapper: impl RecordMapper + 'static,
    ) -> AdapterOptionsBuilder {
        AdapterOptionsBuilder::new(table_name, Arc::new(mapper))
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn mapper(&self) -> &Arc<dyn RecordMapper> {
        &self.mapper
    }

    pub fn properties(&self) -> Option<&HashMap<String, String>> {
        self.properties.as_ref()
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }
}

impl fmt::Debug for AdapterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterOptions")
            .field("table_name", &self.table_name)
            .field("properties", &self.properties)
            .field("durability", &self.durability)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AdapterOptions`].
pub struct AdapterOptionsBuilder {
    table_name: String,
    mapper: Arc<dyn RecordMapper>,
    properties: Option<HashMap<String, String>>,
    durability: Durability,
}

impl AdapterOptionsBuilder {
    /// Start from an already shared mapper.
    pub fn new(table_name: impl Into<String>, mapper: Arc<dyn RecordMapper>) -> Self {
        Self {
            table_name: table_name.into(),
            mapper,
            properties: None,
            durability: Durability::default(),
        }
    }

    /// Replace the whole properties bag.
    pub fn properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set a single property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn write_to_wal(self, write_to_wal: bool) -> Self {
        self.durability(Durability::from_wal_flag(write_to_wal))
    }

    pub fn build(self) -> Result<AdapterOptions> {
        if self.table_name.trim().is_empty() {
            return Err(SinkError::Config("table name must not be empty".to_string()));
        }
        Ok(AdapterOptions {
            table_name: self.table_name,
            mapper: self.mapper,
            properties: self.properties,
            durability: self.durability,
        })
    }
}
