use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsmId {
    Node(u64),
    Way(u64),
    Relation(u64),
}

impl OsmId {
    pub fn link(&self) -> String {
        format!("https://www.openstreetmap.org/{self}")
    }
}

impl fmt::Display for OsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(x) => write!(f, "node/{x}"),
            Self::Way(x) => write!(f, "way/{x}"),
            Self::Relation(x) => write!(f, "relation/{x}"),
        }
    }
}
