use serde::{Deserialize, Serialize};

use crate::api::RawKeyword;

/// One keyword row of the final result.
///
/// `query` is part of the record's identity: the same keyword surfaced by
/// two different queries yields two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRecord {
    pub query: String,
    pub keyword: String,
    pub search_volume: u64,
    pub ranking_difficulty: i64,
    pub cpc: f64,
}

impl KeywordRecord {
    /// Normalize an upstream keyword, defaulting whatever is missing
    pub fn from_raw(query: &str, raw: &RawKeyword) -> Self {
        Self {
            query: query.trim().to_string(),
            keyword: raw.keyword_text(),
            search_volume: raw.search_volume(),
            ranking_difficulty: raw.ranking_difficulty(),
            cpc: raw.cpc(),
        }
    }
}
