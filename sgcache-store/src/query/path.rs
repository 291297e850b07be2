//! Dotted return-field / filter path parsing.
//!
//! A path alternates *field* and *type* segments, rooted at the query's
//! entity type: `field`, `field.Type.field`, `field.Type.field.Type.field`,
//! … Parsing attaches the root type implicitly, yielding a sequence of
//! `(type, field)` segments — the first segment's type is always the
//! query's root entity type.

/// One `(type, field)` hop in a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub entity_type: String,
    pub field: String,
}

impl PathSegment {
    pub fn new(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        PathSegment {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity_type, self.field)
    }
}

/// A fully-resolved dotted path: a non-empty sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse `"field"` or `"field.Type.field[.Type.field...]"`, rooted
    /// at `root_type`.
    pub fn parse(input: &str, root_type: &str) -> Self {
        let mut parts: Vec<&str> = input.split('.').collect();
        let mut segments = Vec::new();

        let first_field = parts.remove(0);
        segments.push(PathSegment::new(root_type, first_field));

        while parts.len() >= 2 {
            let type_name = parts.remove(0);
            let field_name = parts.remove(0);
            segments.push(PathSegment::new(type_name, field_name));
        }

        FieldPath { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn tail(&self) -> &PathSegment {
        self.segments.last().expect("path is never empty")
    }

    /// The path up to and including index `i` (exclusive upper bound is
    /// `i + 1`), used for resolving intermediate join tables.
    pub fn prefix(&self, len: usize) -> FieldPath {
        FieldPath {
            segments: self.segments[..len].to_vec(),
        }
    }

    /// A stable string key for this prefix, used as the unaliased
    /// table-name / alias key in the query builder's alias table.
    pub fn stringify(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The portion of `self` that extends beyond `base`'s length —
    /// used to compute the relative path inside a deep-filter subquery.
    pub fn suffix_after(&self, base_len: usize) -> FieldPath {
        FieldPath {
            segments: self.segments[base_len..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_field_path() {
        let path = FieldPath::parse("code", "Shot");
        assert_eq!(path.segments, vec![PathSegment::new("Shot", "code")]);
    }

    #[test]
    fn deep_path_through_entity() {
        let path = FieldPath::parse("entity.Shot.code", "Task");
        assert_eq!(
            path.segments,
            vec![
                PathSegment::new("Task", "entity"),
                PathSegment::new("Shot", "code"),
            ]
        );
    }

    #[test]
    fn deep_path_through_two_hops() {
        let path = FieldPath::parse("entity.Shot.project.Project.name", "Task");
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments[2], PathSegment::new("Project", "name"));
    }

    #[test]
    fn stringify_is_dotted_type_field_pairs() {
        let path = FieldPath::parse("entity.Shot.code", "Task");
        assert_eq!(path.stringify(), "Task.entity.Shot.code");
    }

    #[test]
    fn suffix_after_drops_leading_segments() {
        let path = FieldPath::parse("task_assignees.HumanUser.id", "Task");
        let suffix = path.suffix_after(1);
        assert_eq!(suffix.segments, vec![PathSegment::new("HumanUser", "id")]);
    }
}
