//! House-context primer.
//!
//! Before the first tool call the kiosk fetches a short plain-text
//! summary of the destination unit (registered residents plus recent
//! visit history) and feeds it to the assistant as conversation
//! context. Read-only, no session required.

use porter_directory::{UnitDirectory, VisitStore};
use porter_domain::error::{Error, Result};

pub fn build_house_context(
    directory: &UnitDirectory,
    visits: &VisitStore,
    house_number: &str,
    visit_limit: usize,
) -> Result<String> {
    let unit = directory
        .find_by_identifier(house_number)
        .ok_or_else(|| Error::NotFound(format!("unit {house_number}")))?;

    let mut out = String::new();
    match &unit.family_name {
        Some(family) => out.push_str(&format!("Unit {} ({} family).", unit.identifier, family)),
        None => out.push_str(&format!("Unit {}.", unit.identifier)),
    }

    if unit.residents.is_empty() {
        out.push_str(" No residents registered.");
    } else {
        let names: Vec<&str> = unit.residents.iter().map(|r| r.name.as_str()).collect();
        out.push_str(&format!(" Registered residents: {}.", names.join(", ")));
    }

    let recent = visits.recent_for_unit(&unit.identifier, visit_limit);
    if recent.is_empty() {
        out.push_str("\nNo prior visits on record.");
    } else {
        out.push_str("\nRecent visits:");
        for visit in &recent {
            out.push_str(&format!(
                "\n- {} {} ({}, {})",
                visit.created_at.format("%Y-%m-%d %H:%M"),
                visit.visitor_name,
                visit.kind,
                visit.status,
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_directory::{NewVisit, Resident, Unit};

    fn fixtures() -> (tempfile::TempDir, UnitDirectory, VisitStore) {
        let tmp = tempfile::tempdir().unwrap();
        let visits = VisitStore::new(tmp.path()).unwrap();
        let directory = UnitDirectory::from_units(vec![Unit {
            id: "u-303".into(),
            identifier: "303".into(),
            family_name: Some("Pérez".into()),
            residents: vec![Resident {
                id: "R1".into(),
                name: "María Pérez".into(),
                phone: None,
            }],
        }]);
        (tmp, directory, visits)
    }

    #[test]
    fn context_for_unknown_unit_is_not_found() {
        let (_tmp, directory, visits) = fixtures();
        assert!(matches!(
            build_house_context(&directory, &visits, "999", 5),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn context_without_history_says_so() {
        let (_tmp, directory, visits) = fixtures();
        let ctx = build_house_context(&directory, &visits, "casa 303", 5).unwrap();
        assert!(ctx.contains("Unit 303"));
        assert!(ctx.contains("María Pérez"));
        assert!(ctx.contains("No prior visits"));
    }

    #[test]
    fn context_lists_recent_visits() {
        let (_tmp, directory, visits) = fixtures();
        visits.create(NewVisit {
            visitor_name: "Ana Soto".into(),
            unit_identifier: "303".into(),
            ..Default::default()
        });
        let ctx = build_house_context(&directory, &visits, "303", 5).unwrap();
        assert!(ctx.contains("Recent visits:"));
        assert!(ctx.contains("Ana Soto"));
    }
}
