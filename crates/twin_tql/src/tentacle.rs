/// Dependency edges derived from a parsed mapper.
use std::fmt;

/// What a tentacle notifies when its watched items change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TentacleKind {
    /// Recompute properties of the target entity.
    Property,
    /// Re-run a subscription mapper, identified by mapper id.
    Mapper,
}

impl fmt::Display for TentacleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TentacleKind::Property => f.write_str("property"),
            TentacleKind::Mapper => f.write_str("mapper"),
        }
    }
}

/// One edge of the dependency graph: when any of `items` changes on
/// `source_id`, `target_id` must be recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tentacle {
    kind: TentacleKind,
    target_id: String,
    source_id: String,
    items: Vec<String>,
}

impl Tentacle {
    pub fn new(
        kind: TentacleKind,
        target_id: impl Into<String>,
        source_id: impl Into<String>,
        items: Vec<String>,
    ) -> Self {
        Self {
            kind,
            target_id: target_id.into(),
            source_id: source_id.into(),
            items,
        }
    }

    pub fn kind(&self) -> TentacleKind {
        self.kind
    }

    /// Entity id for [`TentacleKind::Property`], mapper id for
    /// [`TentacleKind::Mapper`].
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Distinct property paths watched on the source, in first-reference order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Whether a change to `path` on the source entity triggers this edge.
    /// A change to a parent or child of a watched path counts.
    pub fn watches(&self, path: &str) -> bool {
        self.items.iter().any(|item| {
            item == path
                || is_path_prefix(item, path)
                || is_path_prefix(path, item)
        })
    }
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(twin_value::PATH_SEPARATOR))
}

impl fmt::Display for Tentacle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} <- {} [{}]",
            self.kind,
            self.target_id,
            self.source_id,
            self.items.join(", ")
        )
    }
}
