use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::sweep::space::{SweepCell, VolumeBand};

/// One page of one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: String,
    pub difficulty: i64,
    pub volume_min: u64,
    pub volume_max: Option<u64>,
    /// 1-based offset of the first row
    pub starting_row: u64,
    pub page_size: u32,
}

impl PageRequest {
    /// Request for the zero-based `page_index` of a cell
    pub fn for_page(cell: &SweepCell, band: VolumeBand, page_index: u32, page_size: u32) -> Self {
        Self {
            query: cell.query.clone(),
            difficulty: cell.difficulty,
            volume_min: band.min,
            volume_max: band.max,
            starting_row: 1 + u64::from(page_index) * u64::from(page_size),
            page_size,
        }
    }
}

/// Body of the phrase-matched keywords endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub facets: Facets,
    pub page_size: u32,
    pub query: &'a str,
    pub sort_order: &'static str,
    pub starting_row: u64,
    pub groups: Vec<Value>,
    pub adult_filter: bool,
    pub is_overview: bool,
    pub country_code: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Facets {
    pub ranges: Vec<RangeFacet>,
    pub terms: Vec<Value>,
}

/// Numeric range filter; bounds are sent exactly as configured
#[derive(Debug, Clone, Serialize)]
pub struct RangeFacet {
    pub field: &'static str,
    pub min: Number,
    pub max: Option<Number>,
}

impl<'a> SearchRequest<'a> {
    pub fn new(request: &'a PageRequest, country_code: &'a str, adult_filter: bool) -> Self {
        // Difficulty is a single-value range
        let difficulty = Number::from(request.difficulty);
        Self {
            facets: Facets {
                ranges: vec![
                    RangeFacet {
                        field: "rankingDifficulty",
                        min: difficulty.clone(),
                        max: Some(difficulty),
                    },
                    RangeFacet {
                        field: "searchVolume",
                        min: Number::from(request.volume_min),
                        max: request.volume_max.map(Number::from),
                    },
                ],
                terms: vec![],
            },
            page_size: request.page_size,
            query: &request.query,
            sort_order: "descending",
            starting_row: request.starting_row,
            groups: vec![],
            adult_filter,
            is_overview: false,
            country_code,
        }
    }
}

/// Keyword object as returned upstream. Every field may be absent, null,
/// a number or a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawKeyword {
    pub keyword: Option<Value>,
    pub search_volume: Option<Value>,
    pub ranking_difficulty: Option<Value>,
    pub cpc: Option<Value>,
}

impl RawKeyword {
    pub fn keyword_text(&self) -> String {
        match &self.keyword {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn search_volume(&self) -> u64 {
        number(self.search_volume.as_ref())
            .map(|v| if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 })
            .unwrap_or(0)
    }

    pub fn ranking_difficulty(&self) -> i64 {
        number(self.ranking_difficulty.as_ref())
            .filter(|v| v.is_finite())
            .map(|v| v.round() as i64)
            .unwrap_or(0)
    }

    pub fn cpc(&self) -> f64 {
        number(self.cpc.as_ref())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(0.0)
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
