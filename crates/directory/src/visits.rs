//! Visit records.
//!
//! A visit is created in `Pending` state when the concierge collects
//! enough visitor data (or a resident pre-authorizes one), becomes
//! `Active` on check-in, and is closed as `Denied`, `Expired`, or
//! `Completed`. Persisted as a JSON map under the state path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use porter_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitStatus {
    Pending,
    Active,
    Denied,
    Expired,
    Completed,
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitKind {
    Pedestrian,
    Vehicular,
}

impl std::fmt::Display for VisitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pedestrian => f.write_str("pedestrian"),
            Self::Vehicular => f.write_str("vehicular"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub visitor_name: String,
    #[serde(default)]
    pub visitor_rut: Option<String>,
    #[serde(default)]
    pub visitor_phone: Option<String>,
    #[serde(default)]
    pub vehicle_plate: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub kind: VisitKind,
    pub status: VisitStatus,
    pub unit_identifier: String,
    /// Resident hosting the visit. Assigned definitively when a resident
    /// approves; until then it may hold a placeholder.
    #[serde(default)]
    pub host_id: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: u32,
    pub used_count: u32,
    /// Fallback access code (vehicular visits use it when plate
    /// recognition fails; pedestrian visits use it at the gate).
    pub qr_code: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a visit.
#[derive(Debug, Clone, Default)]
pub struct NewVisit {
    pub visitor_name: String,
    pub visitor_rut: Option<String>,
    pub visitor_phone: Option<String>,
    pub vehicle_plate: Option<String>,
    pub reason: Option<String>,
    pub unit_identifier: String,
    pub host_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DEFAULT_VALIDITY_HOURS: i64 = 24;

/// Visit store backed by a JSON file (`visits.json`).
pub struct VisitStore {
    visits_path: PathBuf,
    visits: RwLock<HashMap<Uuid, Visit>>,
}

impl VisitStore {
    /// Load or create the store at `state_path/visits.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let visits_path = state_path.join("visits.json");
        let visits = if visits_path.exists() {
            let raw = std::fs::read_to_string(&visits_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            visits = visits.len(),
            path = %visits_path.display(),
            "visit store loaded"
        );

        Ok(Self {
            visits_path,
            visits: RwLock::new(visits),
        })
    }

    /// Create a new pending visit. Vehicular iff a plate was provided.
    pub fn create(&self, new: NewVisit) -> Visit {
        let now = Utc::now();
        let kind = if new.vehicle_plate.is_some() {
            VisitKind::Vehicular
        } else {
            VisitKind::Pedestrian
        };
        let visit = Visit {
            id: Uuid::new_v4(),
            visitor_name: new.visitor_name,
            visitor_rut: new.visitor_rut,
            visitor_phone: new.visitor_phone,
            vehicle_plate: new.vehicle_plate,
            reason: new.reason,
            kind,
            status: VisitStatus::Pending,
            unit_identifier: new.unit_identifier,
            host_id: new.host_id,
            valid_from: now,
            valid_until: now + Duration::hours(DEFAULT_VALIDITY_HOURS),
            max_uses: 1,
            used_count: 0,
            qr_code: Uuid::new_v4().simple().to_string(),
            created_at: now,
        };

        let mut visits = self.visits.write();
        visits.insert(visit.id, visit.clone());
        self.persist(&visits);

        tracing::info!(visit_id = %visit.id, unit = %visit.unit_identifier, "visit created");
        visit
    }

    pub fn get(&self, id: &Uuid) -> Option<Visit> {
        self.visits.read().get(id).cloned()
    }

    /// List visits, most recent first, optionally filtered by status.
    pub fn list(&self, status: Option<VisitStatus>, limit: usize) -> Vec<Visit> {
        let visits = self.visits.read();
        let mut out: Vec<Visit> = visits
            .values()
            .filter(|v| status.map(|s| v.status == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        out
    }

    /// The most recent visits to a given unit (for the house-context
    /// primer), most recent first.
    pub fn recent_for_unit(&self, unit_identifier: &str, limit: usize) -> Vec<Visit> {
        let visits = self.visits.read();
        let mut out: Vec<Visit> = visits
            .values()
            .filter(|v| v.unit_identifier == unit_identifier)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        out
    }

    /// Register an entry: moves the visit to `Active` and consumes one
    /// use. Rejects closed visits and exhausted use counters.
    pub fn check_in(&self, id: &Uuid) -> Result<Visit> {
        let mut visits = self.visits.write();
        let visit = visits
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("visit {id}")))?;

        match visit.status {
            VisitStatus::Pending | VisitStatus::Active => {}
            other => {
                return Err(Error::Validation(format!(
                    "visit {id} cannot check in (status: {other:?})"
                )));
            }
        }
        if visit.used_count >= visit.max_uses {
            return Err(Error::Validation(format!(
                "visit {id} has no remaining uses"
            )));
        }

        visit.status = VisitStatus::Active;
        visit.used_count += 1;
        let updated = visit.clone();
        self.persist(&visits);

        tracing::info!(visit_id = %id, used = updated.used_count, "visit checked in");
        Ok(updated)
    }

    /// Record a status change (denial, expiry, completion).
    pub fn update_status(&self, id: &Uuid, status: VisitStatus) -> Result<Visit> {
        let mut visits = self.visits.write();
        let visit = visits
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("visit {id}")))?;
        visit.status = status;
        let updated = visit.clone();
        self.persist(&visits);
        Ok(updated)
    }

    /// Reassign the hosting resident (set when a resident approves).
    pub fn set_host(&self, id: &Uuid, host_id: &str) -> Result<Visit> {
        let mut visits = self.visits.write();
        let visit = visits
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("visit {id}")))?;
        visit.host_id = Some(host_id.to_owned());
        let updated = visit.clone();
        self.persist(&visits);
        Ok(updated)
    }

    pub fn len(&self) -> usize {
        self.visits.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.read().is_empty()
    }

    /// Persist the current state to disk (also called on shutdown).
    pub fn flush(&self) -> Result<()> {
        let visits = self.visits.read();
        self.persist(&visits);
        Ok(())
    }

    fn persist(&self, visits: &HashMap<Uuid, Visit>) {
        match serde_json::to_string_pretty(visits) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.visits_path, json) {
                    tracing::warn!(error = %e, "visit store persist failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "visit store serialize failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, VisitStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VisitStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn pedestrian(name: &str, unit: &str) -> NewVisit {
        NewVisit {
            visitor_name: name.into(),
            unit_identifier: unit.into(),
            ..Default::default()
        }
    }

    #[test]
    fn create_infers_kind_from_plate() {
        let (_dir, store) = store();
        let walk = store.create(pedestrian("Ana", "303"));
        assert_eq!(walk.kind, VisitKind::Pedestrian);

        let drive = store.create(NewVisit {
            visitor_name: "Luis".into(),
            unit_identifier: "303".into(),
            vehicle_plate: Some("ABCD12".into()),
            ..Default::default()
        });
        assert_eq!(drive.kind, VisitKind::Vehicular);
        assert!(!drive.qr_code.is_empty());
    }

    #[test]
    fn check_in_activates_and_counts() {
        let (_dir, store) = store();
        let visit = store.create(pedestrian("Ana", "303"));
        assert_eq!(visit.status, VisitStatus::Pending);

        let checked = store.check_in(&visit.id).unwrap();
        assert_eq!(checked.status, VisitStatus::Active);
        assert_eq!(checked.used_count, 1);

        // Single-use visit: a second entry is rejected.
        assert!(matches!(
            store.check_in(&visit.id),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn check_in_rejects_denied_visit() {
        let (_dir, store) = store();
        let visit = store.create(pedestrian("Ana", "303"));
        store.update_status(&visit.id, VisitStatus::Denied).unwrap();
        assert!(matches!(
            store.check_in(&visit.id),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn unknown_visit_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.check_in(&Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn recent_for_unit_filters_and_orders() {
        let (_dir, store) = store();
        store.create(pedestrian("First", "303"));
        store.create(pedestrian("Other", "15"));
        store.create(pedestrian("Second", "303"));

        let recent = store.recent_for_unit("303", 10);
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|v| v.unit_identifier == "303"));
    }

    #[test]
    fn persistence_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = VisitStore::new(dir.path()).unwrap();
            let v = store.create(pedestrian("Ana", "303"));
            store.set_host(&v.id, "R1").unwrap();
            v.id
        };
        let store = VisitStore::new(dir.path()).unwrap();
        let v = store.get(&id).unwrap();
        assert_eq!(v.host_id.as_deref(), Some("R1"));
    }
}
