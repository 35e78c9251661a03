// src/ingest/types.rs
use crate::errors::MonitorResult;

/// One filing as exposed by the feed. `identifier` is the dedup key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FilingRecord {
    pub identifier: String,  // accession number, or the document URL
    pub entity_name: String, // e.g. "NVIDIA CORP"
    pub entity_id: String,   // CIK, zero-padded to 10 digits
    pub filing_type: String, // e.g. "8-K"
    pub filing_date: String, // YYYY-MM-DD when known
    pub document_url: String,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn poll(&self) -> MonitorResult<Vec<FilingRecord>>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> MonitorResult<Vec<u8>>;
}
