use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Requirement, SieveResult, parse_selector};

/// An owner row together with the labels attached to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecordsInput {
    pub namespace: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

impl ListRecordsInput {
    pub fn with_selector(selector: &str) -> SieveResult<Self> {
        Ok(Self {
            requirements: parse_selector(selector)?,
            ..Self::default()
        })
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelKeys {
    pub items: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValues {
    pub items: Vec<String>,
}

#[async_trait]
pub trait ArchiveWriteApi {
    /// Inserts or replaces the record and its full label set.
    async fn archive_record(&self, record: ArchivedRecord) -> SieveResult<()>;
    async fn delete_record(&self, uid: &str) -> SieveResult<()>;
}

#[async_trait]
pub trait ArchiveReadApi {
    async fn get_record(&self, uid: &str) -> SieveResult<Option<ArchivedRecord>>;
    async fn list_records(&self, input: ListRecordsInput) -> SieveResult<Vec<ArchivedRecord>>;
    async fn count_records(&self, input: ListRecordsInput) -> SieveResult<u64>;
}

#[async_trait]
pub trait LabelDiscoveryApi {
    async fn list_label_keys(&self) -> SieveResult<LabelKeys>;
    async fn list_label_values(&self, key: &str) -> SieveResult<LabelValues>;
}
