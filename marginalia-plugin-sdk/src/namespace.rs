//! Capability namespaces: the top-level groupings of the host API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Notes,
    Graph,
    Ai,
    Ui,
    Events,
    Settings,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Notes,
        Namespace::Graph,
        Namespace::Ai,
        Namespace::Ui,
        Namespace::Events,
        Namespace::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Graph => "graph",
            Self::Ai => "ai",
            Self::Ui => "ui",
            Self::Events => "events",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| format!("unknown namespace '{s}'"))
    }
}
