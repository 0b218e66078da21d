//! Normalization of retrieval context into the fixed client-facing shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::table::{Columns, Table};

/// One row of context data, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Context data as handed back by a retrieval engine: category name → table.
pub type RawContext = HashMap<String, Table>;

/// The five categories every normalized context carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextCategory {
    Reports,
    Entities,
    Relationships,
    Claims,
    Sources,
}

impl ContextCategory {
    pub const ALL: [ContextCategory; 5] = [
        ContextCategory::Reports,
        ContextCategory::Entities,
        ContextCategory::Relationships,
        ContextCategory::Claims,
        ContextCategory::Sources,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContextCategory::Reports => "reports",
            ContextCategory::Entities => "entities",
            ContextCategory::Relationships => "relationships",
            ContextCategory::Claims => "claims",
            ContextCategory::Sources => "sources",
        }
    }
}

impl fmt::Display for ContextCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ContextCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown context category '{s}'")))
    }
}

/// Context data with a stable schema: all five categories are always
/// present, as lists of records, whichever engine produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContext {
    pub reports: Vec<Record>,
    pub entities: Vec<Record>,
    pub relationships: Vec<Record>,
    pub claims: Vec<Record>,
    pub sources: Vec<Record>,
}

impl NormalizedContext {
    pub fn get(&self, category: ContextCategory) -> &[Record] {
        match category {
            ContextCategory::Reports => &self.reports,
            ContextCategory::Entities => &self.entities,
            ContextCategory::Relationships => &self.relationships,
            ContextCategory::Claims => &self.claims,
            ContextCategory::Sources => &self.sources,
        }
    }

    fn slot(&mut self, category: ContextCategory) -> &mut Vec<Record> {
        match category {
            ContextCategory::Reports => &mut self.reports,
            ContextCategory::Entities => &mut self.entities,
            ContextCategory::Relationships => &mut self.relationships,
            ContextCategory::Claims => &mut self.claims,
            ContextCategory::Sources => &mut self.sources,
        }
    }
}

/// Converts a table to one record per row, preserving column order.
pub fn table_to_records(category: &str, table: &Table) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for batch in table {
        let columns = Columns::new(category, batch).all();
        for row in 0..batch.num_rows() {
            let mut record = Record::new();
            for column in &columns {
                record.insert(column.name().to_string(), column.value(row)?);
            }
            records.push(record);
        }
    }
    Ok(records)
}

/// Starts from five empty lists and fills in every category the raw context
/// carries a non-empty table for. Keys outside the five categories are dropped.
pub fn normalize(raw: &RawContext) -> Result<NormalizedContext> {
    let mut normalized = NormalizedContext::default();
    for (key, table) in raw {
        let Ok(category) = key.parse::<ContextCategory>() else {
            debug!(key = %key, "ignoring context key outside the normalized categories");
            continue;
        };
        let records = table_to_records(key, table)?;
        if records.is_empty() {
            continue;
        }
        *normalized.slot(category) = records;
    }
    Ok(normalized)
}
