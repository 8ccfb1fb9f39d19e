//! File-backed [`VisitSink`]: the visit store is a single JSON document that is
//! replaced atomically on every batch.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visit_engine::{FailedOccurrence, SinkError, VisitDraft, VisitSink};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredVisit {
    pub visit_id: String,
    #[serde(flatten)]
    pub draft: VisitDraft,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VisitStore {
    #[serde(default)]
    pub visits: Vec<StoredVisit>,
}

/// Visit ids are `<client>-<occurrence key>`, so committing the same
/// occurrence twice is detected as a duplicate rather than stored again.
pub fn visit_id(draft: &VisitDraft) -> String {
    format!("{}-{}", draft.client_id, draft.key)
}

pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<VisitStore, SinkError> {
        if !self.path.exists() {
            return Ok(VisitStore::default());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| SinkError::Unavailable(format!("cannot read {}: {e}", self.path.display())))?;
        if raw.trim().is_empty() {
            return Ok(VisitStore::default());
        }
        serde_json::from_str(&raw)
            .map_err(|e| SinkError::Unavailable(format!("corrupt visit store {}: {e}", self.path.display())))
    }

    fn save(&self, store: &VisitStore) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(store).map_err(|e| SinkError::Unavailable(e.to_string()))?;
        write_atomically(&self.path, json.as_bytes())
            .map_err(|e| SinkError::Unavailable(format!("cannot write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl VisitSink for JsonFileSink {
    async fn create_batch(&self, drafts: &[VisitDraft]) -> Result<Vec<String>, SinkError> {
        let mut store = self.load()?;
        let existing: HashSet<String> = store.visits.iter().map(|v| v.visit_id.clone()).collect();
        let ids: Vec<String> = drafts.iter().map(visit_id).collect();

        // The store is only rewritten when every draft is new.
        let duplicates: Vec<&str> = ids.iter().filter(|id| existing.contains(*id)).map(String::as_str).collect();
        if let Some(first) = duplicates.first() {
            debug!(path = %self.path.display(), duplicates = duplicates.len(), "rejected visit batch");
            let failed = drafts
                .iter()
                .zip(&ids)
                .map(|(draft, id)| FailedOccurrence {
                    key: draft.key,
                    reason: if existing.contains(id) {
                        format!("visit {id} already exists")
                    } else {
                        format!("batch rejected: visit {first} already exists")
                    },
                })
                .collect();
            return Err(SinkError::Partial {
                created: Vec::new(),
                failed,
            });
        }

        store
            .visits
            .extend(drafts.iter().zip(&ids).map(|(draft, id)| StoredVisit {
                visit_id: id.clone(),
                draft: draft.clone(),
            }));
        self.save(&store)?;
        debug!(path = %self.path.display(), created = ids.len(), "wrote visit store");
        Ok(ids)
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
