//! Workspace-level tracking of which projects link against which libraries.

use crate::graph::DependencyGraph;
use std::sync::Mutex;

/// A registry of inter-project link dependencies, owned by the embedding
/// tool rather than held in global state.
///
/// An edge from project `app` to project `libutils` means `app` links the
/// library `libutils` produces. When a library rebuilds, the registry
/// answers which projects need relinking. Methods take `&self` so one
/// registry can be shared across build sessions.
pub struct WorkspaceRegistry {
    projects: Mutex<DependencyGraph<String>>,
}

impl WorkspaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            projects: Mutex::new(DependencyGraph::new()),
        }
    }

    /// Records the complete set of library projects `project` links
    /// against, replacing any previous registration.
    pub fn set_project_dependencies(
        &self,
        project: &str,
        deps: impl IntoIterator<Item = String>,
    ) {
        let mut projects = self.projects.lock().unwrap();
        projects.set_dependencies(project.to_string(), deps);
    }

    /// Returns the library projects `project` links against, sorted.
    pub fn dependencies_of(&self, project: &str) -> Vec<String> {
        let projects = self.projects.lock().unwrap();
        projects
            .dependencies_of(&project.to_string())
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every project that transitively links any of `changed`, sorted.
    pub fn dependents_of(&self, changed: &[String]) -> Vec<String> {
        let projects = self.projects.lock().unwrap();
        projects.dependents_of(changed)
    }

    /// Removes a project and its link edges.
    pub fn remove_project(&self, project: &str) {
        let mut projects = self.projects.lock().unwrap();
        projects.remove(&project.to_string());
    }

    /// Returns `true` if no projects are registered.
    pub fn is_empty(&self) -> bool {
        let projects = self.projects.lock().unwrap();
        projects.is_empty()
    }
}

impl Default for WorkspaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry() {
        let registry = WorkspaceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.dependencies_of("app").is_empty());
    }

    #[test]
    fn register_and_query() {
        let registry = WorkspaceRegistry::new();
        registry.set_project_dependencies("app", vec!["libutils".to_string()]);
        assert_eq!(registry.dependencies_of("app"), vec!["libutils"]);
        assert_eq!(
            registry.dependents_of(&["libutils".to_string()]),
            vec!["app"]
        );
    }

    #[test]
    fn reregistration_replaces() {
        let registry = WorkspaceRegistry::new();
        registry.set_project_dependencies("app", vec!["libold".to_string()]);
        registry.set_project_dependencies("app", vec!["libnew".to_string()]);
        assert!(registry.dependents_of(&["libold".to_string()]).is_empty());
        assert_eq!(
            registry.dependents_of(&["libnew".to_string()]),
            vec!["app"]
        );
    }

    #[test]
    fn self_dependency_dropped() {
        let registry = WorkspaceRegistry::new();
        registry.set_project_dependencies("app", vec!["app".to_string()]);
        assert!(registry.dependencies_of("app").is_empty());
    }

    #[test]
    fn transitive_relink() {
        let registry = WorkspaceRegistry::new();
        registry.set_project_dependencies("app", vec!["libgame".to_string()]);
        registry.set_project_dependencies("libgame", vec!["libmath".to_string()]);
        assert_eq!(
            registry.dependents_of(&["libmath".to_string()]),
            vec!["app", "libgame"]
        );
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(WorkspaceRegistry::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                registry.set_project_dependencies(&format!("app{i}"), vec!["lib".to_string()]);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.dependents_of(&["lib".to_string()]).len(), 8);
    }
}
