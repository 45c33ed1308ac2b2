//! Geographic hierarchy: which node a ZIP row belongs to at each level.
//!
//! City and county membership come from row metadata (column names are
//! overridable per source). States are normalized to USPS abbreviations and
//! mapped onto the census-style state regions and regions below.

use crate::data::SourceDescriptor;
use crate::domain::{CleanRow, GeoLevel};

/// State region → member states.
pub const STATE_REGIONS: &[(&str, &[&str])] = &[
    ("New England", &["CT", "ME", "MA", "NH", "RI", "VT"]),
    ("Mid-Atlantic", &["DE", "MD", "NJ", "NY", "PA"]),
    ("South Atlantic", &["DC", "FL", "GA", "NC", "SC", "VA", "WV"]),
    ("East South Central", &["AL", "KY", "MS", "TN"]),
    ("West South Central", &["AR", "LA", "OK", "TX"]),
    ("East North Central", &["IL", "IN", "MI", "OH", "WI"]),
    ("West North Central", &["IA", "KS", "MN", "MO", "NE", "ND", "SD"]),
    ("Mountain", &["AZ", "CO", "ID", "MT", "NV", "NM", "UT", "WY"]),
    ("Pacific", &["AK", "CA", "HI", "OR", "WA"]),
];

/// Region → member state regions.
pub const REGIONS: &[(&str, &[&str])] = &[
    ("Northeast", &["New England", "Mid-Atlantic"]),
    ("Southeast", &["South Atlantic", "East South Central"]),
    ("Midwest", &["East North Central", "West North Central"]),
    ("Southwest", &["West South Central"]),
    ("West", &["Mountain", "Pacific"]),
];

const STATE_NAMES: &[(&str, &str)] = &[
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("District of Columbia", "DC"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
];

/// USPS abbreviation for a state given as abbreviation or full name.
pub fn state_abbreviation(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    STATE_NAMES
        .iter()
        .find(|(name, abbr)| abbr.eq_ignore_ascii_case(raw) || name.eq_ignore_ascii_case(raw))
        .map(|(_, abbr)| *abbr)
}

pub fn state_region_of(abbr: &str) -> Option<&'static str> {
    STATE_REGIONS
        .iter()
        .find(|(_, states)| states.contains(&abbr))
        .map(|(region, _)| *region)
}

pub fn region_of(state_region: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(_, members)| members.contains(&state_region))
        .map(|(region, _)| *region)
}

/// A node a row maps to at some level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub id: String,
    pub name: String,
}

/// Column names used to place rows into cities, counties and states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyMap {
    city: Vec<String>,
    county: Vec<String>,
    state: Vec<String>,
}

impl Default for HierarchyMap {
    fn default() -> Self {
        Self {
            city: vec!["City".into(), "CityName".into()],
            county: vec!["CountyName".into()],
            state: vec!["StateName".into(), "State".into()],
        }
    }
}

impl HierarchyMap {
    /// Defaults, with any relation the descriptor declares taking precedence.
    pub fn from_descriptor<D: SourceDescriptor + ?Sized>(descriptor: &D) -> Self {
        let mut map = Self::default();
        for (level, columns) in [
            (GeoLevel::City, &mut map.city),
            (GeoLevel::County, &mut map.county),
            (GeoLevel::State, &mut map.state),
        ] {
            if let Some(column) = descriptor.child_relation(level) {
                columns.insert(0, column);
            }
        }
        map
    }

    fn first<'r>(row: &'r CleanRow, columns: &[String]) -> Option<&'r str> {
        columns.iter().find_map(|c| row.meta(c))
    }

    pub fn state(&self, row: &CleanRow) -> Option<&'static str> {
        Self::first(row, &self.state).and_then(state_abbreviation)
    }

    /// Node of `row` at `level`; `None` if the row cannot be placed there.
    pub fn node(&self, row: &CleanRow, level: GeoLevel) -> Option<NodeRef> {
        match level {
            GeoLevel::Zip => Some(NodeRef {
                id: row.entity_id.clone(),
                name: row.display_name().to_string(),
            }),
            GeoLevel::City => self.qualified(row, Self::first(row, &self.city)?),
            GeoLevel::County => self.qualified(row, Self::first(row, &self.county)?),
            GeoLevel::State => {
                let abbr = self.state(row)?;
                Some(NodeRef {
                    id: abbr.to_string(),
                    name: abbr.to_string(),
                })
            }
            GeoLevel::StateRegion => {
                let region = state_region_of(self.state(row)?)?;
                Some(NodeRef {
                    id: region.to_string(),
                    name: region.to_string(),
                })
            }
            GeoLevel::Region => {
                let region = region_of(state_region_of(self.state(row)?)?)?;
                Some(NodeRef {
                    id: region.to_string(),
                    name: region.to_string(),
                })
            }
        }
    }

    /// City/county names repeat across states, so ids carry the state: `CA/Los Angeles`.
    fn qualified(&self, row: &CleanRow, name: &str) -> Option<NodeRef> {
        let id = match self.state(row) {
            Some(abbr) => format!("{abbr}/{name}"),
            None => name.to_string(),
        };
        Some(NodeRef {
            id,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StaticDescriptor;
    use crate::io::RawSnapshot;
    use std::collections::BTreeMap;

    fn row(meta: &[(&str, &str)]) -> CleanRow {
        CleanRow {
            entity_id: "90001".into(),
            meta: meta.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            values: BTreeMap::new(),
        }
    }

    #[test]
    fn every_state_region_belongs_to_a_region() {
        for (state_region, states) in STATE_REGIONS {
            assert!(region_of(state_region).is_some(), "{state_region}");
            for s in *states {
                assert_eq!(state_region_of(s), Some(*state_region));
            }
        }
        assert_eq!(STATE_REGIONS.iter().map(|(_, s)| s.len()).sum::<usize>(), 51);
    }

    #[test]
    fn places_row_at_every_level() {
        let map = HierarchyMap::default();
        let r = row(&[
            ("RegionName", "90001"),
            ("City", "Los Angeles"),
            ("CountyName", "Los Angeles County"),
            ("StateName", "California"),
        ]);
        assert_eq!(map.node(&r, GeoLevel::Zip).unwrap().id, "90001");
        assert_eq!(map.node(&r, GeoLevel::City).unwrap().id, "CA/Los Angeles");
        assert_eq!(map.node(&r, GeoLevel::County).unwrap().name, "Los Angeles County");
        assert_eq!(map.node(&r, GeoLevel::State).unwrap().id, "CA");
        assert_eq!(map.node(&r, GeoLevel::StateRegion).unwrap().id, "Pacific");
        assert_eq!(map.node(&r, GeoLevel::Region).unwrap().id, "West");
    }

    #[test]
    fn unknown_state_is_unmapped_above_county() {
        let map = HierarchyMap::default();
        let r = row(&[("City", "San Juan"), ("State", "PR")]);
        assert_eq!(map.node(&r, GeoLevel::City).unwrap().id, "San Juan");
        assert_eq!(map.node(&r, GeoLevel::State), None);
        assert_eq!(map.node(&r, GeoLevel::Region), None);
    }

    #[test]
    fn descriptor_relation_takes_precedence() {
        let desc = StaticDescriptor::new(RawSnapshot::default()).with_child_relation(GeoLevel::County, "County");
        let map = HierarchyMap::from_descriptor(&desc);
        let r = row(&[("County", "Kings"), ("CountyName", "Other"), ("StateName", "NY")]);
        assert_eq!(map.node(&r, GeoLevel::County).unwrap().id, "NY/Kings");
    }
}
