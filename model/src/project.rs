use crate::tree::VulnerabilityTree;
use crate::vulnerability::Vulnerability;
use chrono::{DateTime, Utc};
use pentest_common::error::Error;
use pentest_common::time;
use std::collections::{BTreeMap, BTreeSet};

/// `spec.md` §3: a named collection of targets and their findings.
#[derive(Debug)]
pub struct Project {
    name: String,
    description: String,
    targets: BTreeSet<String>,
    tree: VulnerabilityTree,
    metadata: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Project, Error> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::EmptyField("name"));
        }
        let now = time::now();
        Ok(Project {
            name,
            description: description.into(),
            targets: BTreeSet::new(),
            tree: VulnerabilityTree::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.touch();
    }

    /// Only `ProjectManager::rename` may change a project's name, since
    /// the manager also owns the map key and the `current` pointer that
    /// must stay in sync with it.
    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.touch();
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn tree(&self) -> &VulnerabilityTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut VulnerabilityTree {
        &mut self.tree
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
        self.touch();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Adds `target` to the project's target set. A no-op (but still
    /// `Ok`) if the target is already present.
    pub fn add_target(&mut self, target: impl Into<String>) -> Result<(), Error> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(Error::EmptyField("target"));
        }
        self.targets.insert(target);
        self.touch();
        Ok(())
    }

    /// Removes `target` and cascades to every vulnerability rooted at it
    /// (`spec.md` §3: "removing a target removes all its
    /// vulnerabilities").
    pub fn remove_target(&mut self, target: &str) -> Vec<Vulnerability> {
        self.targets.remove(target);
        let removed = self.tree.remove_target(target);
        self.touch();
        removed
    }

    /// Inserts `v` into the tree, first adding its target to the
    /// project's target set if needed (`spec.md` §4.5 invariant: every
    /// tree target is a member of `targets`).
    pub fn add_vulnerability(&mut self, v: Vulnerability) -> Result<(), Error> {
        if !self.targets.contains(v.target()) {
            self.targets.insert(v.target().to_string());
        }
        self.tree.add(v)?;
        self.touch();
        Ok(())
    }

    pub fn remove_vulnerability(&mut self, id: &str) -> Option<Vulnerability> {
        let removed = self.tree.remove(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.updated_at = time::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentest_common::severity::Severity;

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            Project::new("  ", "desc").unwrap_err(),
            Error::EmptyField("name")
        ));
    }

    #[test]
    fn adding_vulnerability_adds_its_target() {
        let mut p = Project::new("Audit", "").unwrap();
        let v = Vulnerability::with_cve_convention("Issue", "desc", Severity::Low, "10.0.0.1", None)
            .unwrap();
        p.add_vulnerability(v).unwrap();
        assert!(p.targets().contains("10.0.0.1"));
    }

    #[test]
    fn removing_target_cascades_vulnerabilities() {
        let mut p = Project::new("Audit", "").unwrap();
        p.add_target("10.0.0.1").unwrap();
        let v = Vulnerability::with_cve_convention("Issue", "desc", Severity::Low, "10.0.0.1", None)
            .unwrap();
        p.add_vulnerability(v).unwrap();

        let removed = p.remove_target("10.0.0.1");
        assert_eq!(removed.len(), 1);
        assert!(!p.targets().contains("10.0.0.1"));
        assert!(p.tree().find_by_target("10.0.0.1").is_empty());
    }

    #[test]
    fn updated_at_advances_on_mutation() {
        let mut p = Project::new("Audit", "").unwrap();
        let before = p.updated_at();
        p.add_target("10.0.0.1").unwrap();
        assert!(p.updated_at() > before);
    }
}
