//! Bulk loading of newline-delimited JSON records.
//!
//! Used by the `tablesink-load` binary. A [`LoadConfig`] (usually read from
//! TOML) describes the table, the [`FieldMapper`] and the store properties;
//! [`load_lines`] feeds every non-blank line through a [`WriteAdapter`] as
//! one record whose delivery id is its 1-based line number.
//!
//! ```toml
//! table = "page_views"
//! durability = "skip_wal"
//!
//! [mapper]
//! row_key_field = "user"
//! column_family = "cf"
//! column_fields = ["page", "referrer"]
//! counter_fields = ["views"]
//!
//! [properties]
//! "coordinator.quorum" = "zk1,zk2,zk3"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::adapter::WriteAdapter;
use crate::collector::Outcome;
use crate::config::AdapterOptions;
use crate::error::{Result, SinkError};
use crate::mapper::FieldMapper;
use crate::mutation::Durability;
use crate::record::Record;
use crate::store::Table;

/// Load job description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub table: String,
    pub mapper: FieldMapper,
    #[serde(default)]
    pub durability: Durability,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl LoadConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LoadConfig = toml::from_str(contents)
            .map_err(|e| SinkError::Config(format!("invalid load config: {}", e)))?;
        config.mapper.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Turn the description into adapter options.
    pub fn into_options(self) -> Result<AdapterOptions> {
        let mut builder = AdapterOptions::builder(self.table, self.mapper).durability(self.durability);
        if !self.properties.is_empty() {
            builder = builder.properties(self.properties);
        }
        builder.build()
    }
}

/// Totals of one load run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Lines turned into records and processed.
    pub records: u64,
    pub acked: u64,
    pub failed: u64,
    /// Lines that were not JSON objects and never reached the adapter.
    pub rejected: u64,
}

/// Process every non-blank line of `reader` as one record.
pub async fn load_lines<T, R>(adapter: &WriteAdapter<T>, reader: R) -> Result<LoadSummary>
where
    T: Table + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut summary = LoadSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record = match Record::from_json(line_no, &line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed line");
                summary.rejected += 1;
                continue;
            }
        };

        summary.records += 1;
        match adapter.process(&record).await {
            Outcome::Acked => summary.acked += 1,
            Outcome::Failed => summary.failed += 1,
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MemoryCollector;
    use crate::config::PipelineConfig;
    use crate::memory::MemoryTableClient;
    use std::io::Write;

    const CONFIG: &str = r#"
table = "page_views"
durability = "skip_wal"

[mapper]
row_key_field = "user"
column_family = "cf"
column_fields = ["page"]
counter_fields = ["views"]

[properties]
"coordinator.quorum" = "zk1"
"#;

    // ---------------------------------------------------------------
    // LoadConfig
    // ---------------------------------------------------------------

    #[test]
    fn test_parse_toml() {
        let config = LoadConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.table, "page_views");
        assert_eq!(config.durability, Durability::SkipWal);
        assert_eq!(config.mapper.row_key_field(), "user");
        assert_eq!(config.properties.get("coordinator.quorum").unwrap(), "zk1");
    }

    #[test]
    fn test_parse_defaults() {
        let config = LoadConfig::from_toml_str(
            r#"
table = "t"
[mapper]
row_key_field = "id"
column_family = "d"
"#,
        )
        .unwrap();
        assert_eq!(config.durability, Durability::Wal);
        assert!(config.properties.is_empty());
        let options = config.into_options().unwrap();
        assert!(options.properties().is_none());
    }

    #[test]
    fn test_parse_rejects_blank_family() {
        let result = LoadConfig::from_toml_str(
            r#"
table = "t"
[mapper]
row_key_field = "id"
column_family = ""
"#,
        );
        assert!(matches!(result, Err(SinkError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = LoadConfig::from_file(file.path()).unwrap();
        assert_eq!(config.table, "page_views");
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LoadConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(SinkError::Io(_))));
    }

    // ---------------------------------------------------------------
    // load_lines
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_load_lines_summary() {
        let client = MemoryTableClient::with_tables(["page_views"]);
        let collector = MemoryCollector::new();
        let options = LoadConfig::from_toml_str(CONFIG)
            .unwrap()
            .into_options()
            .unwrap();
        let adapter = WriteAdapter::prepare(options, &PipelineConfig::new(), &client, collector.clone())
            .await
            .unwrap();

        let input = [
            r#"{"user":"alice","page":"/","views":1}"#,
            "",
            r#"{"user":"bob","views":2}"#,
            "not json",
            r#"{"page":"/orphan"}"#,
            r#"{"user":"alice","views":3}"#,
        ]
        .join("\n");

        let summary = load_lines(&adapter, input.as_bytes()).await.unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                records: 4,
                acked: 3,
                failed: 1,
                rejected: 1,
            }
        );
        assert_eq!(client.counter("page_views", b"alice", b"cf", b"views"), Some(4));
        assert_eq!(client.counter("page_views", b"bob", b"cf", b"views"), Some(2));
        assert_eq!(collector.signals().len(), 4);
        assert_eq!(client.put_log()[0].durability, Durability::SkipWal);

        let failed: Vec<_> = collector
            .signals()
            .into_iter()
            .filter(|(_, outcome)| *outcome == Outcome::Failed)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(failed, vec![crate::record::DeliveryId(5)]);
    }

    #[tokio::test]
    async fn test_load_lines_from_file() {
        let client = MemoryTableClient::with_tables(["page_views"]);
        let options = LoadConfig::from_toml_str(CONFIG)
            .unwrap()
            .into_options()
            .unwrap();
        let adapter = WriteAdapter::prepare(
            options,
            &PipelineConfig::new(),
            &client,
            MemoryCollector::new(),
        )
        .await
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user":"carol","page":"/a","views":1}}"#).unwrap();
        writeln!(file, r#"{{"user":"carol","page":"/b","views":1}}"#).unwrap();

        let reader = tokio::io::BufReader::new(tokio::fs::File::open(file.path()).await.unwrap());
        let summary = load_lines(&adapter, reader).await.unwrap();
        assert_eq!(summary.acked, 2);
        assert_eq!(client.counter("page_views", b"carol", b"cf", b"views"), Some(2));
        assert_eq!(
            client.cell("page_views", b"carol", b"cf", b"page"),
            Some(bytes::Bytes::from("/b"))
        );
    }
}
