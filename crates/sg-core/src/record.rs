use crate::typed::Typed;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fetch-time metadata attached to every extracted [`Record`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordMeta {
    /// URL the record was extracted from.
    pub url: String,
    /// Tier that produced this record.
    pub engine: crate::run::Tier,
    /// When the underlying fetch completed.
    pub fetched_at: DateTime<Utc>,
    /// HTTP status of the fetch, if applicable (absent for provider
    /// responses that don't surface one).
    pub http_status: Option<u16>,
}

/// One extracted item. Multiple per run when `crawl_mode = list`.
///
/// Invariant: every key in `data` is a declared job field, and `evidence`
/// mirrors `data`'s key set exactly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning run.
    pub run_id: Uuid,
    /// Field name -> normalized value (or null).
    pub data: BTreeMap<String, Option<serde_json::Value>>,
    /// Field name -> typing evidence, same key set as `data`.
    pub evidence: BTreeMap<String, Typed>,
    /// Fetch-time metadata.
    pub meta: RecordMeta,
}

impl Record {
    /// Builds a record from per-field [`Typed`] results, deriving `data`
    /// from each `Typed::value` and keeping the keys of `data` and
    /// `evidence` identical by construction.
    pub fn from_typed(
        id: Uuid,
        run_id: Uuid,
        fields: BTreeMap<String, Typed>,
        meta: RecordMeta,
    ) -> Self {
        let mut data = BTreeMap::new();
        let mut evidence = BTreeMap::new();
        for (name, typed) in fields {
            data.insert(name.clone(), typed.value.clone());
            evidence.insert(name, typed);
        }
        Self {
            id,
            run_id,
            data,
            evidence,
            meta,
        }
    }

    /// Whether every key in `data` also appears in `evidence` and
    /// vice versa, per the data-model invariant.
    pub fn data_evidence_keys_match(&self) -> bool {
        self.data.len() == self.evidence.len()
            && self.data.keys().all(|k| self.evidence.contains_key(k))
    }
}
