use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One viewing session in a viewer's history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub watched_at: OffsetDateTime,
}
