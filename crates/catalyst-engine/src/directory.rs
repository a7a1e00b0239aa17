//! Site hierarchy directory.
//!
//! Most resources reference sites by name hierarchy (`Global/USA/SJC`) while
//! the controller wants site ids. The directory is loaded once per run and
//! refreshed after the site hierarchy changes.

use std::collections::HashMap;

use catalyst_core::Record;

use crate::reverse::Lookups;

/// One site of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEntry {
    /// Site id.
    pub id: String,
    /// Full name hierarchy.
    pub name_hierarchy: String,
    /// `global`, `area`, `building` or `floor`.
    pub site_type: String,
    /// Parent site id.
    pub parent_id: Option<String>,
}

impl SiteEntry {
    /// Build an entry from a controller site record.
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            id: record.get_str("id")?.to_string(),
            name_hierarchy: record.get_str("nameHierarchy")?.to_string(),
            site_type: record.get_str("type").unwrap_or("area").to_string(),
            parent_id: record.get_str("parentId").map(str::to_string),
        })
    }

    /// Depth in the hierarchy; `Global` is 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.name_hierarchy.matches('/').count()
    }
}

/// Bidirectional index of the site hierarchy.
#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    by_id: HashMap<String, SiteEntry>,
    by_name: HashMap<String, String>,
}

impl SiteDirectory {
    /// Index controller site records.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut directory = Self::default();
        for entry in records.iter().filter_map(SiteEntry::from_record) {
            directory
                .by_name
                .insert(entry.name_hierarchy.clone(), entry.id.clone());
            directory.by_id.insert(entry.id.clone(), entry);
        }
        directory
    }

    /// Site id for a name hierarchy.
    #[must_use]
    pub fn id_of(&self, name_hierarchy: &str) -> Option<&str> {
        self.by_name
            .get(name_hierarchy.trim_end_matches('/'))
            .map(String::as_str)
    }

    /// Entry for a site id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SiteEntry> {
        self.by_id.get(id)
    }

    /// Name hierarchy for a site id.
    #[must_use]
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(|e| e.name_hierarchy.as_str())
    }

    /// Every site, shallowest first, then by name.
    #[must_use]
    pub fn entries(&self) -> Vec<&SiteEntry> {
        let mut entries: Vec<&SiteEntry> = self.by_id.values().collect();
        entries.sort_by(|a, b| {
            a.depth()
                .cmp(&b.depth())
                .then_with(|| a.name_hierarchy.cmp(&b.name_hierarchy))
        });
        entries
    }

    /// Number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if no sites are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Transform lookups backed by this directory.
    #[must_use]
    pub fn lookups(&self) -> Lookups {
        Lookups {
            site_names: self
                .by_id
                .iter()
                .map(|(id, entry)| (id.clone(), entry.name_hierarchy.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::into_records;
    use serde_json::json;

    fn directory() -> SiteDirectory {
        SiteDirectory::from_records(&into_records(vec![
            json!({"id": "G", "nameHierarchy": "Global", "type": "global"}),
            json!({"id": "S2", "nameHierarchy": "Global/USA/SJC", "type": "building", "parentId": "S1"}),
            json!({"id": "S1", "nameHierarchy": "Global/USA", "type": "area", "parentId": "G"}),
            json!({"nameHierarchy": "Global/Broken"}),
        ]))
    }

    #[test]
    fn resolves_both_ways() {
        let dir = directory();
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.id_of("Global/USA"), Some("S1"));
        assert_eq!(dir.id_of("Global/USA/"), Some("S1"));
        assert_eq!(dir.name_of("S2"), Some("Global/USA/SJC"));
        assert_eq!(dir.get("S2").unwrap().parent_id.as_deref(), Some("S1"));
        assert!(dir.id_of("Global/Broken").is_none());
    }

    #[test]
    fn entries_are_shallowest_first() {
        let dir = directory();
        let names: Vec<&str> = dir.entries().iter().map(|e| e.name_hierarchy.as_str()).collect();
        assert_eq!(names, ["Global", "Global/USA", "Global/USA/SJC"]);
        assert_eq!(dir.lookups().site_name("S1"), Some("Global/USA"));
    }
}
