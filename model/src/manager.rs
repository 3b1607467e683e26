use crate::project::Project;
use crate::vulnerability::Vulnerability;
use parking_lot::{Mutex, RwLock};
use pentest_common::error::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The single concurrency boundary for project mutations (`spec.md`
/// §4.5, §5).
///
/// Grounded on the teacher's "`ProjectManager` is the single concurrency
/// boundary" design note (`spec.md` §9: "shared mutable singletons ...
/// pass explicit context handles; `current project` is a field on
/// `ProjectManager`, not process-global"). Each project gets its own
/// `RwLock` so mutations on one project never block reads or writes on
/// another; the outer map lock is only held for the instant it takes to
/// look up or insert an `Arc`.
pub struct ProjectManager {
    projects: RwLock<BTreeMap<String, Arc<RwLock<Project>>>>,
    current: Mutex<Option<String>>,
}

impl Default for ProjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectManager {
    pub fn new() -> Self {
        ProjectManager {
            projects: RwLock::new(BTreeMap::new()),
            current: Mutex::new(None),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn create(&self, name: &str, description: Option<&str>) -> Result<(), Error> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyField("name"));
        }
        let mut projects = self.projects.write();
        if projects.contains_key(trimmed) {
            return Err(Error::NameTaken(trimmed.to_string()));
        }
        let project = Project::new(trimmed, description.unwrap_or(""))?;
        projects.insert(trimmed.to_string(), Arc::new(RwLock::new(project)));
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Result<(), Error> {
        let mut projects = self.projects.write();
        if projects.remove(name).is_none() {
            return Err(Error::NameNotFound(name.to_string()));
        }
        let mut current = self.current.lock();
        if current.as_deref() == Some(name) {
            *current = None;
        }
        Ok(())
    }

    /// Atomically renames a project, updating `current` if it pointed at
    /// the old name (`spec.md` §4.5).
    #[tracing::instrument(skip(self))]
    pub fn rename(&self, old: &str, new: &str) -> Result<(), Error> {
        let new_trimmed = new.trim();
        if new_trimmed.is_empty() {
            return Err(Error::EmptyField("name"));
        }
        let mut projects = self.projects.write();
        if projects.contains_key(new_trimmed) {
            return Err(Error::NameTaken(new_trimmed.to_string()));
        }
        let Some(arc) = projects.remove(old) else {
            return Err(Error::NameNotFound(old.to_string()));
        };
        arc.write().set_name(new_trimmed.to_string());
        projects.insert(new_trimmed.to_string(), arc);
        drop(projects);

        let mut current = self.current.lock();
        if current.as_deref() == Some(old) {
            *current = Some(new_trimmed.to_string());
        }
        Ok(())
    }

    pub fn select(&self, name: &str) -> Result<(), Error> {
        if !self.projects.read().contains_key(name) {
            return Err(Error::NameNotFound(name.to_string()));
        }
        *self.current.lock() = Some(name.to_string());
        Ok(())
    }

    pub fn deselect(&self) {
        *self.current.lock() = None;
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.projects.read().keys().cloned().collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.projects.read().contains_key(name)
    }

    fn get(&self, name: &str) -> Result<Arc<RwLock<Project>>, Error> {
        self.projects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }

    /// Runs `f` with a read lock on the named project.
    pub fn with_project<T>(&self, name: &str, f: impl FnOnce(&Project) -> T) -> Result<T, Error> {
        let arc = self.get(name)?;
        let project = arc.read();
        Ok(f(&project))
    }

    /// Runs `f` with a write lock on the named project.
    pub fn with_project_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Project) -> T,
    ) -> Result<T, Error> {
        let arc = self.get(name)?;
        let mut project = arc.write();
        Ok(f(&mut project))
    }

    pub fn add_target(&self, project_name: &str, target: &str) -> Result<(), Error> {
        self.with_project_mut(project_name, |p| p.add_target(target))?
    }

    pub fn remove_target(&self, project_name: &str, target: &str) -> Result<Vec<Vulnerability>, Error> {
        self.with_project_mut(project_name, |p| p.remove_target(target))
    }

    pub fn add_vulnerability(&self, project_name: &str, v: Vulnerability) -> Result<(), Error> {
        self.with_project_mut(project_name, |p| p.add_vulnerability(v))?
    }

    pub fn remove_vulnerability(
        &self,
        project_name: &str,
        id: &str,
    ) -> Result<Option<Vulnerability>, Error> {
        self.with_project_mut(project_name, |p| p.remove_vulnerability(id))
    }

    /// Every project in a stable, name-sorted order — used by
    /// persistence (`spec.md` §6.3) to take a consistent snapshot.
    pub fn all_projects(&self) -> Vec<Arc<RwLock<Project>>> {
        self.projects.read().values().cloned().collect()
    }

    /// Loads `projects` as the manager's entire state, replacing
    /// whatever was there (used by persistence load, `spec.md` §6.3).
    pub fn replace_all(&self, projects: BTreeMap<String, Project>) {
        let mut guard = self.projects.write();
        *guard = projects
            .into_iter()
            .map(|(name, project)| (name, Arc::new(RwLock::new(project))))
            .collect();
        *self.current.lock() = None;
    }
}
