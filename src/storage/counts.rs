//! Keys of the per-entity-type aggregate counts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{LabelId, TypeId};

/// A counts-store key. `None` components mean "any".
///
/// Relationship keys name at most one of `start`/`end`; the store never keeps
/// counts that constrain both endpoints.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CountsKey {
    /// Nodes, optionally restricted to a label.
    Nodes {
        /// Required label, or all nodes.
        label: Option<LabelId>,
    },
    /// Relationships, optionally restricted by type and one endpoint label.
    Relationships {
        /// Label of the start node.
        start: Option<LabelId>,
        /// Relationship type.
        #[serde(rename = "type")]
        ty: Option<TypeId>,
        /// Label of the end node.
        end: Option<LabelId>,
    },
}

impl CountsKey {
    /// Node count key.
    pub fn nodes(label: Option<LabelId>) -> Self {
        CountsKey::Nodes { label }
    }

    /// Relationship count key.
    pub fn relationships(start: Option<LabelId>, ty: Option<TypeId>, end: Option<LabelId>) -> Self {
        debug_assert!(
            start.is_none() || end.is_none(),
            "counts keys constrain at most one endpoint label"
        );
        CountsKey::Relationships { start, ty, end }
    }
}

impl fmt::Display for CountsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn part<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "*".to_string())
        }
        match self {
            CountsKey::Nodes { label } => write!(f, "(:{})", part(label)),
            CountsKey::Relationships { start, ty, end } => {
                write!(f, "(:{})-[:{}]->(:{})", part(start), part(ty), part(end))
            }
        }
    }
}
