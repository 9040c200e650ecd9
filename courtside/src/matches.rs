//! Read-only access to match context owned by the match CRUD service.
//!
//! Map workers need the court corners the user marked and the player colour
//! choices. Those live with the match record; this module only reads them.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::fs::io_error;
use crate::Result;

/// The parts of a match record that analysis workers consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchContext {
    /// Court corner points as marked on the 1280x720 reference frame.
    pub court_bounds: serde_json::Value,
    /// Player metadata (names, shirt colours) forwarded verbatim.
    #[serde(default)]
    pub players: serde_json::Value,
}

/// Lookup of match context by id.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// `Ok(None)` when no such match exists.
    async fn get_context(&self, match_id: &str) -> Result<Option<MatchContext>>;
}

/// Reads `{root}/{match_id}.json` documents exported by the CRUD layer.
#[derive(Debug, Clone)]
pub struct FileMatchRepository {
    root: PathBuf,
}

impl FileMatchRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MatchRepository for FileMatchRepository {
    async fn get_context(&self, match_id: &str) -> Result<Option<MatchContext>> {
        let path = self.root.join(format!("{match_id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(match_id, "No match record");
                return Ok(None);
            }
            Err(e) => return Err(io_error("reading match record", &path, e)),
        };
        let context = serde_json::from_slice(&bytes)?;
        Ok(Some(context))
    }
}
