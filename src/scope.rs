//! Scope resolution for knowledge isolation.
//!
//! Three tiers: global (shared), project (all datasets in a project), and
//! local (one dataset). The scope decides the collection name used by both
//! vector stores and the deterministic project/dataset UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    Global,
    Project,
    Local,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeLevel::Global => "global",
            ScopeLevel::Project => "project",
            ScopeLevel::Local => "local",
        }
    }

    pub fn parse(name: &str) -> Option<ScopeLevel> {
        match name {
            "global" => Some(ScopeLevel::Global),
            "project" => Some(ScopeLevel::Project),
            "local" => Some(ScopeLevel::Local),
            _ => None,
        }
    }
}

pub struct ScopeManager;

impl ScopeManager {
    /// Resolve the effective scope from the available context.
    ///
    /// An explicit "global" request always wins. With project and dataset
    /// both present the result is local unless "project" was requested; a
    /// bare project resolves to project scope; no context means global.
    pub fn resolve_scope(
        project: Option<&str>,
        dataset: Option<&str>,
        requested_scope: Option<&str>,
    ) -> ScopeLevel {
        if requested_scope == Some("global") {
            return ScopeLevel::Global;
        }

        let requested = requested_scope.and_then(ScopeLevel::parse);

        match (project, dataset) {
            (Some(_), Some(_)) => {
                if requested == Some(ScopeLevel::Project) {
                    ScopeLevel::Project
                } else {
                    ScopeLevel::Local
                }
            }
            (Some(_), None) => ScopeLevel::Project,
            _ => ScopeLevel::Global,
        }
    }

    /// Collection name for a resolved scope. Global maps to the singleton
    /// `global_knowledge` collection.
    pub fn collection_name(
        project: Option<&str>,
        dataset: Option<&str>,
        scope: ScopeLevel,
    ) -> String {
        match scope {
            ScopeLevel::Global => "global_knowledge".to_string(),
            ScopeLevel::Project => {
                let project = project.unwrap_or("default");
                format!("project_{}", sanitize_name(project))
            }
            ScopeLevel::Local => {
                let project = project.unwrap_or("default");
                let dataset = dataset.unwrap_or("default");
                format!(
                    "project_{}_dataset_{}",
                    sanitize_name(project),
                    sanitize_name(dataset)
                )
            }
        }
    }

    /// Deterministic project UUID (v5 over the DNS namespace).
    pub fn project_id(project: Option<&str>) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, project.unwrap_or("default").as_bytes())
    }

    /// Deterministic dataset UUID (v5 over the DNS namespace).
    pub fn dataset_id(dataset: Option<&str>) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, dataset.unwrap_or("default").as_bytes())
    }
}

/// Lowercase, collapse non-alphanumeric runs to single underscores, and trim
/// them from the ends.
fn sanitize_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.extend(c.to_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            sanitized.push('_');
            last_was_underscore = true;
        }
    }

    sanitized.trim_matches('_').to_string()
}
