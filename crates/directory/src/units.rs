//! Units/residents directory.
//!
//! Seeded from a JSON file (`directory.json`) at startup. Read-mostly:
//! the concierge only ever looks units and residents up; administration
//! of the directory happens out of band.

use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use porter_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resident {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    /// Human identifier as painted on the door: "303", "Casa 15", "A-1234".
    pub identifier: String,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub residents: Vec<Resident>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    units: Vec<Unit>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Directory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory units/residents directory.
pub struct UnitDirectory {
    units: RwLock<Vec<Unit>>,
}

impl UnitDirectory {
    /// Load the directory from a seeded JSON file. A missing file yields
    /// an empty directory with a warning; lookups will simply fail.
    pub fn load(path: &Path) -> Result<Self> {
        let units = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let file: DirectoryFile = serde_json::from_str(&raw)?;
            file.units
        } else {
            tracing::warn!(path = %path.display(), "directory file not found, starting empty");
            Vec::new()
        };

        tracing::info!(units = units.len(), "unit directory loaded");
        Ok(Self {
            units: RwLock::new(units),
        })
    }

    pub fn from_units(units: Vec<Unit>) -> Self {
        Self {
            units: RwLock::new(units),
        }
    }

    /// Look a unit up by its identifier. Matching is flexible: "15",
    /// "Casa 15", "depto a-1234" all resolve to the same unit.
    pub fn find_by_identifier(&self, query: &str) -> Option<Unit> {
        let needle = normalize_identifier(query);
        if needle.is_empty() {
            return None;
        }
        self.units
            .read()
            .iter()
            .find(|u| normalize_identifier(&u.identifier) == needle)
            .cloned()
    }

    /// Find a resident anywhere in the directory, returning the unit
    /// they belong to alongside the record.
    pub fn find_resident(&self, resident_id: &str) -> Option<(Unit, Resident)> {
        let units = self.units.read();
        for unit in units.iter() {
            if let Some(r) = unit.residents.iter().find(|r| r.id == resident_id) {
                return Some((unit.clone(), r.clone()));
            }
        }
        None
    }

    /// Whether `resident_id` lives in the unit matching `identifier`.
    pub fn resident_in_unit(&self, identifier: &str, resident_id: &str) -> bool {
        self.find_by_identifier(identifier)
            .map(|u| u.residents.iter().any(|r| r.id == resident_id))
            .unwrap_or(false)
    }

    pub fn list(&self) -> Vec<Unit> {
        self.units.read().clone()
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

/// Normalize a unit identifier for matching: lowercase, strip the common
/// "casa"/"depto"/"departamento"/"unidad" prefixes, drop everything that
/// is not alphanumeric.
fn normalize_identifier(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = ["departamento", "depto", "casa", "unidad"]
        .iter()
        .find_map(|p| lowered.strip_prefix(p))
        .unwrap_or(&lowered);
    stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UnitDirectory {
        UnitDirectory::from_units(vec![
            Unit {
                id: "u-303".into(),
                identifier: "303".into(),
                family_name: Some("Pérez".into()),
                residents: vec![
                    Resident {
                        id: "R1".into(),
                        name: "María Pérez".into(),
                        phone: Some("+56911111111".into()),
                    },
                    Resident {
                        id: "R2".into(),
                        name: "Jorge Pérez".into(),
                        phone: None,
                    },
                ],
            },
            Unit {
                id: "u-a1234".into(),
                identifier: "A-1234".into(),
                family_name: None,
                residents: vec![Resident {
                    id: "R9".into(),
                    name: "Carla Soto".into(),
                    phone: None,
                }],
            },
        ])
    }

    #[test]
    fn flexible_identifier_matching() {
        let dir = sample();
        assert!(dir.find_by_identifier("303").is_some());
        assert!(dir.find_by_identifier("Casa 303").is_some());
        assert!(dir.find_by_identifier("  depto 303 ").is_some());
        assert!(dir.find_by_identifier("A-1234").is_some());
        assert!(dir.find_by_identifier("depto a1234").is_some());
        assert!(dir.find_by_identifier("304").is_none());
        assert!(dir.find_by_identifier("").is_none());
    }

    #[test]
    fn resident_lookup_and_membership() {
        let dir = sample();
        let (unit, resident) = dir.find_resident("R2").unwrap();
        assert_eq!(unit.identifier, "303");
        assert_eq!(resident.name, "Jorge Pérez");

        assert!(dir.resident_in_unit("casa 303", "R1"));
        assert!(!dir.resident_in_unit("A-1234", "R1"));
        assert!(!dir.resident_in_unit("303", "unknown"));
    }

    #[test]
    fn load_missing_file_starts_empty() {
        let dir = UnitDirectory::load(Path::new("/nonexistent/directory.json")).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn load_seed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("directory.json");
        std::fs::write(
            &path,
            r#"{"units":[{"id":"u1","identifier":"15","residents":[{"id":"r1","name":"Ana"}]}]}"#,
        )
        .unwrap();
        let dir = UnitDirectory::load(&path).unwrap();
        assert_eq!(dir.len(), 1);
        assert!(dir.find_by_identifier("casa 15").is_some());
    }
}
