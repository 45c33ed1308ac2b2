//! Cleaned wide table: one row per entity, one value per period.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One entity (ZIP, city, …) after cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRow {
    pub entity_id: String,
    /// Non-period columns (names, hierarchy columns, size rank), trimmed.
    pub meta: BTreeMap<String, String>,
    /// Numeric observations; missing periods are simply absent.
    pub values: BTreeMap<NaiveDate, f64>,
}

impl CleanRow {
    /// Case-insensitive metadata lookup. Empty cells read as `None`.
    pub fn meta(&self, column: &str) -> Option<&str> {
        if let Some(v) = self.meta.get(column) {
            return Some(v.as_str()).filter(|v| !v.is_empty());
        }
        self.meta
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Display name: `RegionName` when present, the entity id otherwise.
    pub fn display_name(&self) -> &str {
        self.meta("RegionName").unwrap_or(&self.entity_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanTable {
    /// Identifier columns used to derive `entity_id`.
    pub id_columns: Vec<String>,
    /// Ascending, de-duplicated period axis.
    pub periods: Vec<NaiveDate>,
    pub rows: Vec<CleanRow>,
}

impl CleanTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, entity_id: &str) -> Option<&CleanRow> {
        self.rows.iter().find(|r| r.entity_id == entity_id)
    }

    /// Number of non-missing cells across all rows.
    pub fn observation_count(&self) -> usize {
        self.rows.iter().map(|r| r.values.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_lookup_ignores_case_and_blank_cells() {
        let row = CleanRow {
            entity_id: "91001".to_string(),
            meta: BTreeMap::from([
                ("StateName".to_string(), "CA".to_string()),
                ("City".to_string(), String::new()),
            ]),
            values: BTreeMap::new(),
        };
        assert_eq!(row.meta("statename"), Some("CA"));
        assert_eq!(row.meta("City"), None);
        assert_eq!(row.display_name(), "91001");
    }
}
