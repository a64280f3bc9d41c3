// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Artifacts handed from one phase to the next.
//!
//! An [`Artifact`] is created once by the agent that produced it and never
//! mutated afterwards; downstream phases receive it behind an `Arc` and may
//! only reference it from new artifacts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AgentKind;

/// The three artifact kinds, one per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RequirementsSpec,
    SourceFileSet,
    TestFileSet,
}

/// A named data entity extracted from the description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

/// Structured requirements: ordered functional requirements plus entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsSpec {
    pub requirements: Vec<String>,
    pub entities: Vec<Entity>,
}

impl RequirementsSpec {
    /// Whether some entity is recognizably `name`.
    ///
    /// Comparison ignores case, separators and a trailing plural `s`, and
    /// accepts compound names such as `ExpenseCategory` for `Category`.
    pub fn covers_entity(&self, name: &str) -> bool {
        let wanted = normalize_entity_name(name);
        if wanted.is_empty() {
            return false;
        }
        self.entities.iter().any(|e| {
            let have = normalize_entity_name(&e.name);
            have == wanted || have.ends_with(&wanted) || have.starts_with(&wanted)
        })
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

fn normalize_entity_name(name: &str) -> String {
    let mut norm: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if norm.ends_with("ies") {
        norm.truncate(norm.len() - 3);
        norm.push('y');
    } else if norm.len() > 3 && norm.ends_with('s') && !norm.ends_with("ss") {
        norm.pop();
    }
    norm
}

/// Source files accepted by the syntax gate, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileSet {
    pub files: Vec<String>,
}

/// One discovered test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub file: String,
    pub name: String,
}

/// Test files and the test cases found in them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFileSet {
    pub files: Vec<String>,
    pub test_cases: Vec<TestCase>,
}

impl TestFileSet {
    pub fn test_case_count(&self) -> usize {
        self.test_cases.len()
    }
}

/// Payload of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactContent {
    RequirementsSpec(RequirementsSpec),
    SourceFileSet(SourceFileSet),
    TestFileSet(TestFileSet),
}

impl ArtifactContent {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::RequirementsSpec(_) => ArtifactKind::RequirementsSpec,
            Self::SourceFileSet(_) => ArtifactKind::SourceFileSet,
            Self::TestFileSet(_) => ArtifactKind::TestFileSet,
        }
    }
}

/// Immutable output of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub producer: AgentKind,
    pub created_at: DateTime<Utc>,
    /// Artifact this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<Uuid>,
    pub content: ArtifactContent,
}

impl Artifact {
    pub fn new(producer: AgentKind, content: ArtifactContent, derived_from: Option<Uuid>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            producer,
            created_at: Utc::now(),
            derived_from,
            content,
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.content.kind()
    }

    pub fn as_requirements(&self) -> Option<&RequirementsSpec> {
        match &self.content {
            ArtifactContent::RequirementsSpec(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_source_files(&self) -> Option<&SourceFileSet> {
        match &self.content {
            ArtifactContent::SourceFileSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_test_files(&self) -> Option<&TestFileSet> {
        match &self.content {
            ArtifactContent::TestFileSet(set) => Some(set),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Entity {
        Entity {
            name: name.to_string(),
            description: String::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn test_covers_entity_is_lenient() {
        let spec = RequirementsSpec {
            requirements: vec!["Add expenses".to_string()],
            entities: vec![entity("Expenses"), entity("expense_category"), entity("Date Range")],
        };

        assert!(spec.covers_entity("Expense"));
        assert!(spec.covers_entity("Category"));
        assert!(spec.covers_entity("DateRange"));
        assert!(spec.covers_entity("date_ranges"));
        assert!(!spec.covers_entity("Budget"));
        assert!(!spec.covers_entity(""));
    }

    #[test]
    fn test_normalize_plurals() {
        assert_eq!(normalize_entity_name("Categories"), "category");
        assert_eq!(normalize_entity_name("Address"), "address");
        assert_eq!(normalize_entity_name("Bus"), "bus");
    }

    #[test]
    fn test_artifact_accessors() {
        let artifact = Artifact::new(
            AgentKind::CodeGenerator,
            ArtifactContent::SourceFileSet(SourceFileSet {
                files: vec!["app/models.py".to_string()],
            }),
            None,
        );

        assert_eq!(artifact.kind(), ArtifactKind::SourceFileSet);
        assert!(artifact.as_source_files().is_some());
        assert!(artifact.as_requirements().is_none());

        let json = serde_json::to_value(&*artifact).unwrap();
        assert_eq!(json["content"]["kind"], "source_file_set");
        assert_eq!(json["producer"], "code_generator");
    }
}
