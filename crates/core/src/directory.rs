//! Favourite values offered when filling in a requisition.
//!
//! The directory never prompts. `is_novel` answers whether a value is new so
//! the caller can decide to ask before calling `remember`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::requisition::{RequisitionDraft, NO_PROJECT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    Unit,
    Applicant,
    Project,
    Vendor,
}

impl DirectoryKind {
    pub const ALL: [DirectoryKind; 4] = [
        DirectoryKind::Unit,
        DirectoryKind::Applicant,
        DirectoryKind::Project,
        DirectoryKind::Vendor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DirectoryKind::Unit => "unit",
            DirectoryKind::Applicant => "applicant",
            DirectoryKind::Project => "project",
            DirectoryKind::Vendor => "vendor",
        }
    }
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only lists of known units, applicants, projects and vendors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub applicants: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub vendors: Vec<String>,
}

impl Directory {
    pub fn entries(&self, kind: DirectoryKind) -> &[String] {
        match kind {
            DirectoryKind::Unit => &self.units,
            DirectoryKind::Applicant => &self.applicants,
            DirectoryKind::Project => &self.projects,
            DirectoryKind::Vendor => &self.vendors,
        }
    }

    fn entries_mut(&mut self, kind: DirectoryKind) -> &mut Vec<String> {
        match kind {
            DirectoryKind::Unit => &mut self.units,
            DirectoryKind::Applicant => &mut self.applicants,
            DirectoryKind::Project => &mut self.projects,
            DirectoryKind::Vendor => &mut self.vendors,
        }
    }

    /// True when `value` is non-blank and not yet listed. The general-fund
    /// sentinel is never novel.
    pub fn is_novel(&self, kind: DirectoryKind, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || (kind == DirectoryKind::Project && value == NO_PROJECT) {
            return false;
        }
        !self.entries(kind).iter().any(|e| e == value)
    }

    /// Header values of `draft` not yet listed, trimmed, in the order unit,
    /// applicant, project, vendor. The project is the draft's subsidy.
    pub fn novel_in(&self, draft: &RequisitionDraft) -> Vec<(DirectoryKind, String)> {
        let candidates = [
            (DirectoryKind::Unit, Some(draft.unit.as_str())),
            (DirectoryKind::Applicant, Some(draft.applicant.as_str())),
            (DirectoryKind::Project, draft.subsidy.as_deref()),
            (DirectoryKind::Vendor, draft.vendor.as_deref()),
        ];
        candidates
            .into_iter()
            .filter_map(|(kind, value)| value.map(|v| (kind, v)))
            .filter(|(kind, value)| self.is_novel(*kind, value))
            .map(|(kind, value)| (kind, value.trim().to_string()))
            .collect()
    }

    /// Append the trimmed value if novel. Returns whether it was added.
    pub fn remember(&mut self, kind: DirectoryKind, value: &str) -> bool {
        if !self.is_novel(kind, value) {
            return false;
        }
        self.entries_mut(kind).push(value.trim().to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_trims_and_deduplicates() {
        let mut dir = Directory::default();
        assert!(dir.is_novel(DirectoryKind::Vendor, " Paper Co "));
        assert!(dir.remember(DirectoryKind::Vendor, " Paper Co "));
        assert!(!dir.remember(DirectoryKind::Vendor, "Paper Co"));
        assert_eq!(dir.entries(DirectoryKind::Vendor), ["Paper Co".to_string()]);
        assert!(dir.entries(DirectoryKind::Unit).is_empty());
    }

    #[test]
    fn blank_and_sentinel_values_are_never_novel() {
        let mut dir = Directory::default();
        assert!(!dir.is_novel(DirectoryKind::Unit, "   "));
        assert!(!dir.remember(DirectoryKind::Project, NO_PROJECT));
        assert!(dir.is_novel(DirectoryKind::Unit, NO_PROJECT));
    }

    #[test]
    fn novel_in_reports_unlisted_header_values() {
        let mut dir = Directory::default();
        dir.remember(DirectoryKind::Unit, "Library");
        let draft = RequisitionDraft {
            unit: "Library".into(),
            applicant: " Chen ".into(),
            subsidy: Some(NO_PROJECT.into()),
            vendor: Some("Acme".into()),
            ..Default::default()
        };

        assert_eq!(
            dir.novel_in(&draft),
            vec![
                (DirectoryKind::Applicant, "Chen".to_string()),
                (DirectoryKind::Vendor, "Acme".to_string()),
            ]
        );
    }

    #[test]
    fn lists_are_independent_per_kind() {
        let mut dir = Directory::default();
        dir.remember(DirectoryKind::Applicant, "Lin");
        assert!(dir.is_novel(DirectoryKind::Unit, "Lin"));
        assert!(!dir.is_novel(DirectoryKind::Applicant, "Lin"));
    }
}
