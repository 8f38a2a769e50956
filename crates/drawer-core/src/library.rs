//! In-memory view of every canvas and project, loaded from the entity store.
//!
//! `Canvas::project_id` is the authoritative side of project ownership.
//! [`Library::reconcile_memberships`] rewrites `Project::canvas_ids` to agree
//! with it, and reports what it touched so the caller can persist the repair.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Canvas, CanvasId, Project, ProjectId};

/// Failure to resolve a user-supplied canvas or project reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no {kind} matches '{query}'")]
    NotFound { kind: &'static str, query: String },

    #[error("ambiguous {kind} '{query}'; matches: {}", matches.join(", "))]
    Ambiguous {
        kind: &'static str,
        query: String,
        matches: Vec<String>,
    },
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Projects whose `canvas_ids` were rewritten.
    pub projects: Vec<ProjectId>,
    /// Canvases that pointed at a missing project and were unorganized.
    pub orphaned_canvases: Vec<CanvasId>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.orphaned_canvases.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Library {
    canvases: BTreeMap<CanvasId, Canvas>,
    projects: BTreeMap<ProjectId, Project>,
}

impl Library {
    #[must_use]
    pub fn new(canvases: Vec<Canvas>, projects: Vec<Project>) -> Self {
        Self {
            canvases: canvases.into_iter().map(|c| (c.id.clone(), c)).collect(),
            projects: projects.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Make project membership lists agree with canvas ownership.
    ///
    /// Per project: drop ids of canvases that are missing or owned elsewhere,
    /// drop duplicates (first occurrence wins), then append owned canvases
    /// that were not listed, oldest first. Canvases owned by a missing
    /// project become unorganized.
    pub fn reconcile_memberships(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for canvas in self.canvases.values_mut() {
            if let Some(project_id) = &canvas.project_id
                && !self.projects.contains_key(project_id)
            {
                report.orphaned_canvases.push(canvas.id.clone());
                canvas.project_id = None;
            }
        }

        let mut owned: BTreeMap<&ProjectId, Vec<&Canvas>> = BTreeMap::new();
        for canvas in self.canvases.values() {
            if let Some(project_id) = &canvas.project_id {
                owned.entry(project_id).or_default().push(canvas);
            }
        }
        for members in owned.values_mut() {
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        }

        for project in self.projects.values_mut() {
            let members = owned.get(&project.id).map_or(&[][..], Vec::as_slice);
            let mut seen: HashSet<&CanvasId> = HashSet::with_capacity(members.len());
            let mut repaired: Vec<CanvasId> = Vec::with_capacity(members.len());

            for id in &project.canvas_ids {
                let belongs = self
                    .canvases
                    .get(id)
                    .is_some_and(|c| c.project_id.as_ref() == Some(&project.id));
                if belongs && seen.insert(id) {
                    repaired.push(id.clone());
                }
            }
            for canvas in members {
                if seen.insert(&canvas.id) {
                    repaired.push(canvas.id.clone());
                }
            }

            if repaired != project.canvas_ids {
                project.canvas_ids = repaired;
                report.projects.push(project.id.clone());
            }
        }

        report
    }

    #[must_use]
    pub fn canvas(&self, id: &CanvasId) -> Option<&Canvas> {
        self.canvases.get(id)
    }

    #[must_use]
    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    #[must_use]
    pub fn contains_canvas(&self, id: &CanvasId) -> bool {
        self.canvases.contains_key(id)
    }

    /// All canvases, most recently updated first.
    #[must_use]
    pub fn canvases(&self) -> Vec<&Canvas> {
        let mut all: Vec<&Canvas> = self.canvases.values().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Canvases owned by `project`, or unorganized canvases for `None`.
    #[must_use]
    pub fn canvases_in(&self, project: Option<&ProjectId>) -> Vec<&Canvas> {
        self.canvases()
            .into_iter()
            .filter(|c| c.project_id.as_ref() == project)
            .collect()
    }

    /// All projects by case-insensitive name.
    #[must_use]
    pub fn projects(&self) -> Vec<&Project> {
        let mut all: Vec<&Project> = self.projects.values().collect();
        all.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn upsert_canvas(&mut self, canvas: Canvas) {
        self.canvases.insert(canvas.id.clone(), canvas);
    }

    pub fn remove_canvas(&mut self, id: &CanvasId) -> Option<Canvas> {
        self.canvases.remove(id)
    }

    pub fn upsert_project(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    pub fn remove_project(&mut self, id: &ProjectId) -> Option<Project> {
        self.projects.remove(id)
    }

    /// Resolve a canvas by exact id, exact name, or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] when nothing matches or the query is
    /// ambiguous.
    pub fn find_canvas(&self, query: &str) -> Result<&Canvas, LookupError> {
        resolve(
            "canvas",
            query,
            self.canvases.values().map(|c| (c.id.as_str(), c.name.as_str(), c)),
        )
    }

    /// Resolve a project by exact id, exact name, or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] when nothing matches or the query is
    /// ambiguous.
    pub fn find_project(&self, query: &str) -> Result<&Project, LookupError> {
        resolve(
            "project",
            query,
            self.projects.values().map(|p| (p.id.as_str(), p.name.as_str(), p)),
        )
    }
}

fn resolve<'a, T>(
    kind: &'static str,
    query: &str,
    candidates: impl Iterator<Item = (&'a str, &'a str, &'a T)> + Clone,
) -> Result<&'a T, LookupError> {
    if let Some((_, _, item)) = candidates.clone().find(|(id, _, _)| *id == query) {
        return Ok(item);
    }

    let by_name: Vec<_> = candidates.clone().filter(|(_, name, _)| *name == query).collect();
    let by_prefix: Vec<_> = candidates.filter(|(id, _, _)| id.starts_with(query)).collect();

    for matches in [by_name, by_prefix] {
        match matches.as_slice() {
            [] => {}
            [(_, _, item)] => return Ok(*item),
            many => {
                return Err(LookupError::Ambiguous {
                    kind,
                    query: query.to_owned(),
                    matches: many.iter().map(|(id, _, _)| (*id).to_owned()).collect(),
                });
            }
        }
    }

    Err(LookupError::NotFound {
        kind,
        query: query.to_owned(),
    })
}

/// Shared, lock-protected [`Library`].
///
/// Guards are never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct LibraryHandle(Arc<RwLock<Library>>);

impl LibraryHandle {
    #[must_use]
    pub fn new(library: Library) -> Self {
        Self(Arc::new(RwLock::new(library)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Library> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Library> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
