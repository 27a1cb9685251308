use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serializable description of the transform every worker builds for itself.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    /// A transform registered under a stable name.
    Builtin { name: String },
    /// A mapping script loaded from a file, using one of its named entry points.
    Script { path: PathBuf, entry_point: String },
}

impl TransformConfig {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin { name: name.into() }
    }

    pub fn script(path: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self::Script {
            path: path.into(),
            entry_point: entry_point.into(),
        }
    }
}

impl fmt::Display for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformConfig::Builtin { name } => write!(f, "{name}"),
            TransformConfig::Script { path, entry_point } => {
                write!(f, "{}#{entry_point}", path.display())
            }
        }
    }
}
