use crate::service_map::service_of;
use crate::vulnerability::Vulnerability;
use pentest_common::cve::CveId;
use pentest_common::error::Error;
use pentest_common::severity::Severity;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// A three-level (target -> service -> location) store plus three
/// secondary indices, matching `spec.md` §4.4.
///
/// Grounded on the teacher's `ScoreCreator`/`StatusCreator` pattern of
/// maintaining denormalized lookup structures alongside a canonical
/// store and keeping them in lock-step on every mutation (property P1,
/// `spec.md` §8 invariant 1).
#[derive(Debug)]
pub struct VulnerabilityTree {
    leaves: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Vulnerability>>>>,
    by_target: HashMap<String, BTreeSet<String>>,
    by_severity: HashMap<Severity, BTreeSet<String>>,
    by_cve: HashMap<String, BTreeSet<String>>,
    /// id -> (target, service, location) so `remove` can find a leaf
    /// without a linear scan.
    location_of: HashMap<String, (String, String, String)>,
    stats_cache: Mutex<Option<Stats>>,
}

/// `spec.md` §4.4 `stats()` result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_target: BTreeMap<String, usize>,
    pub distinct_cves: usize,
}

impl Default for VulnerabilityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VulnerabilityTree {
    pub fn new() -> Self {
        VulnerabilityTree {
            leaves: BTreeMap::new(),
            by_target: HashMap::new(),
            by_severity: HashMap::new(),
            by_cve: HashMap::new(),
            location_of: HashMap::new(),
            stats_cache: Mutex::new(None),
        }
    }

    /// Inserts `v` at its leaf and updates all three indices atomically.
    /// Fails with `DuplicateId` if a vulnerability with the same id is
    /// already present (`spec.md` §4.4).
    pub fn add(&mut self, v: Vulnerability) -> Result<(), Error> {
        if self.location_of.contains_key(v.id()) {
            return Err(Error::DuplicateId(v.id().to_string()));
        }

        let target = v.target().to_string();
        let service = service_of(v.location());
        let location = v.location().unwrap_or("_unknown_").to_string();
        let id = v.id().to_string();
        let severity = v.severity();
        let cve = v.cve_id().cloned();

        self.leaves
            .entry(target.clone())
            .or_default()
            .entry(service.clone())
            .or_default()
            .entry(location.clone())
            .or_default()
            .push(v);

        self.by_target.entry(target.clone()).or_default().insert(id.clone());
        self.by_severity.entry(severity).or_default().insert(id.clone());
        if let Some(cve) = &cve {
            self.by_cve
                .entry(cve.to_string())
                .or_default()
                .insert(id.clone());
        }
        self.location_of.insert(id, (target, service, location));

        self.invalidate_stats();
        self.debug_check_invariant();
        Ok(())
    }

    /// Removes the vulnerability with the given id from its leaf and all
    /// indices, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<Vulnerability> {
        let (target, service, location) = self.location_of.remove(id)?;

        let leaf = self
            .leaves
            .get_mut(&target)
            .and_then(|s| s.get_mut(&service))
            .and_then(|l| l.get_mut(&location))?;
        let index = leaf.iter().position(|v| v.id() == id)?;
        let removed = leaf.remove(index);

        if leaf.is_empty() {
            if let Some(services) = self.leaves.get_mut(&target) {
                services.remove(&service);
                if services.is_empty() {
                    self.leaves.remove(&target);
                }
            }
        }

        if let Some(ids) = self.by_target.get_mut(&target) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_target.remove(&target);
            }
        }
        if let Some(ids) = self.by_severity.get_mut(&removed.severity()) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_severity.remove(&removed.severity());
            }
        }
        if let Some(cve) = removed.cve_id() {
            if let Some(ids) = self.by_cve.get_mut(cve.as_str()) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_cve.remove(cve.as_str());
                }
            }
        }

        self.invalidate_stats();
        self.debug_check_invariant();
        Some(removed)
    }

    /// Removes every vulnerability belonging to `target`, used when a
    /// target is removed from its project (`spec.md` §4.5 cascade).
    pub fn remove_target(&mut self, target: &str) -> Vec<Vulnerability> {
        let ids: Vec<String> = self
            .by_target
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.remove(&id)).collect()
    }

    pub fn find_by_target(&self, target: &str) -> Vec<&Vulnerability> {
        self.by_target
            .get(target)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn find_by_severity(&self, severity: Severity) -> Vec<&Vulnerability> {
        self.by_severity
            .get(&severity)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// The CVE index is multi-valued because the same CVE may apply to
    /// multiple targets (`spec.md` §4.4). Results are ordered target
    /// ascending, matching `snapshot()`'s ordering.
    pub fn find_by_cve(&self, cve: &CveId) -> Vec<&Vulnerability> {
        let mut results: Vec<&Vulnerability> = self
            .by_cve
            .get(cve.as_str())
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .collect();
        results.sort_by(|a, b| a.target().cmp(b.target()).then(a.id().cmp(b.id())));
        results
    }

    /// O(n) linear scan over descriptions, per `spec.md` §4.4.
    pub fn search_description(&self, substr: &str, case_insensitive: bool) -> Vec<&Vulnerability> {
        let needle = if case_insensitive {
            substr.to_ascii_lowercase()
        } else {
            substr.to_string()
        };
        self.iter_all()
            .filter(|v| {
                if case_insensitive {
                    v.description().to_ascii_lowercase().contains(&needle)
                } else {
                    v.description().contains(&needle)
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Vulnerability> {
        let (target, service, location) = self.location_of.get(id)?;
        self.leaves
            .get(target)?
            .get(service)?
            .get(location)?
            .iter()
            .find(|v| v.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Vulnerability> {
        let (target, service, location) = self.location_of.get(id)?.clone();
        self.invalidate_stats();
        self.leaves
            .get_mut(&target)?
            .get_mut(&service)?
            .get_mut(&location)?
            .iter_mut()
            .find(|v| v.id() == id)
    }

    /// Stable ordering: target ascending, then severity descending, then
    /// discovered_at ascending (`spec.md` §4.4).
    pub fn snapshot(&self) -> Vec<&Vulnerability> {
        let mut all: Vec<&Vulnerability> = self.iter_all().collect();
        all.sort_by(|a, b| {
            a.target()
                .cmp(b.target())
                .then(b.severity().cmp(&a.severity()))
                .then(a.discovered_at().cmp(&b.discovered_at()))
        });
        all
    }

    fn iter_all(&self) -> impl Iterator<Item = &Vulnerability> {
        self.leaves
            .values()
            .flat_map(|services| services.values())
            .flat_map(|locations| locations.values())
            .flat_map(|bucket| bucket.iter())
    }

    pub fn len(&self) -> usize {
        self.location_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.location_of.is_empty()
    }

    /// Recomputed from the tree on first access after any mutation, then
    /// cached until the next mutation invalidates it (`spec.md` §4.4).
    pub fn stats(&self) -> Stats {
        let mut cache = self.stats_cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stats) = cache.as_ref() {
            return stats.clone();
        }
        let mut by_severity = BTreeMap::new();
        for s in Severity::ALL {
            by_severity.insert(s, self.by_severity.get(&s).map(|set| set.len()).unwrap_or(0));
        }
        let by_target = self
            .by_target
            .iter()
            .map(|(t, ids)| (t.clone(), ids.len()))
            .collect();
        let stats = Stats {
            total: self.len(),
            by_severity,
            by_target,
            distinct_cves: self.by_cve.len(),
        };
        *cache = Some(stats.clone());
        stats
    }

    fn invalidate_stats(&mut self) {
        *self.stats_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Validates property P1 (index/leaf agreement). Only run in debug
    /// builds, per `spec.md` §4.4.
    #[cfg(debug_assertions)]
    fn debug_check_invariant(&self) {
        let leaf_ids: BTreeSet<&str> = self.iter_all().map(Vulnerability::id).collect();
        let indexed_ids: BTreeSet<&str> = self.location_of.keys().map(String::as_str).collect();
        debug_assert_eq!(leaf_ids, indexed_ids, "tree leaves and location index disagree");

        let target_indexed: BTreeSet<&str> = self
            .by_target
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        debug_assert_eq!(leaf_ids, target_indexed, "target index disagrees with leaves");
    }

    #[cfg(not(debug_assertions))]
    fn debug_check_invariant(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentest_common::severity::Severity;

    fn vuln(target: &str, name: &str, severity: Severity) -> Vulnerability {
        Vulnerability::with_cve_convention(name, "desc", severity, target, None).unwrap()
    }

    #[test]
    fn add_then_find_by_target() {
        let mut tree = VulnerabilityTree::new();
        tree.add(vuln("a.example", "XSS", Severity::Medium)).unwrap();
        assert_eq!(tree.find_by_target("a.example").len(), 1);
        assert_eq!(tree.find_by_target("b.example").len(), 0);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut tree = VulnerabilityTree::new();
        let v = vuln("a.example", "XSS", Severity::Medium);
        let clone = v.clone();
        tree.add(v).unwrap();
        let err = tree.add(clone).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
    }

    #[test]
    fn remove_clears_all_indices() {
        let mut tree = VulnerabilityTree::new();
        let v = vuln("a.example", "CVE-2021-44228", Severity::Critical);
        let id = v.id().to_string();
        tree.add(v).unwrap();
        let removed = tree.remove(&id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(tree.find_by_target("a.example").is_empty());
        assert!(tree.find_by_severity(Severity::Critical).is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn cve_index_is_multi_valued_and_deterministically_ordered() {
        let mut tree = VulnerabilityTree::new();
        tree.add(vuln("b.example", "CVE-2023-0001", Severity::High)).unwrap();
        tree.add(vuln("a.example", "CVE-2023-0001", Severity::High)).unwrap();

        let cve = CveId::parse("CVE-2023-0001").unwrap();
        let results = tree.find_by_cve(&cve);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target(), "a.example");
        assert_eq!(results[1].target(), "b.example");
    }

    #[test]
    fn snapshot_orders_target_then_severity_desc_then_discovered_asc() {
        let mut tree = VulnerabilityTree::new();
        tree.add(vuln("a.example", "Low issue", Severity::Low)).unwrap();
        tree.add(vuln("a.example", "Critical issue", Severity::Critical)).unwrap();
        tree.add(vuln("b.example", "Medium issue", Severity::Medium)).unwrap();

        let snapshot = tree.snapshot();
        assert_eq!(snapshot[0].target(), "a.example");
        assert_eq!(snapshot[0].severity(), Severity::Critical);
        assert_eq!(snapshot[1].target(), "a.example");
        assert_eq!(snapshot[1].severity(), Severity::Low);
        assert_eq!(snapshot[2].target(), "b.example");
    }

    #[test]
    fn stats_recomputes_after_mutation() {
        let mut tree = VulnerabilityTree::new();
        tree.add(vuln("a.example", "Issue 1", Severity::High)).unwrap();
        let stats = tree.stats();
        assert_eq!(stats.total, 1);

        tree.add(vuln("a.example", "Issue 2", Severity::Low)).unwrap();
        let stats = tree.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_severity[&Severity::High], 1);
        assert_eq!(stats.by_severity[&Severity::Low], 1);
    }

    #[test]
    fn search_description_is_case_insensitive_when_requested() {
        let mut tree = VulnerabilityTree::new();
        let mut v = vuln("a.example", "Issue", Severity::Low);
        v.set_description("Contains SECRET token");
        tree.add(v).unwrap();

        assert_eq!(tree.search_description("secret", true).len(), 1);
        assert_eq!(tree.search_description("secret", false).len(), 0);
    }

    #[test]
    fn remove_target_cascades() {
        let mut tree = VulnerabilityTree::new();
        tree.add(vuln("a.example", "Issue 1", Severity::High)).unwrap();
        tree.add(vuln("a.example", "Issue 2", Severity::Low)).unwrap();
        tree.add(vuln("b.example", "Issue 3", Severity::Low)).unwrap();

        let removed = tree.remove_target("a.example");
        assert_eq!(removed.len(), 2);
        assert!(tree.find_by_target("a.example").is_empty());
        assert_eq!(tree.find_by_target("b.example").len(), 1);
    }
}
