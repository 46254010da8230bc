//! Serialized menu (menu.json).
//!
//! JSON shape:
//! {
//!   "name": "csvgen",
//!   "uuid": "6f1c...",
//!   "graphs": [
//!     {
//!       "name": "csvgen",
//!       "nodes": [
//!         { "name": "initial", "parents": [], "algos": ["iorequest"] },
//!         { "name": "parse", "parents": ["initial"], "algos": ["csvparser"] }
//!       ]
//!     }
//!   ]
//! }
//!
//! A compiled menu is written as one flat graph whose node order is the
//! execution order. The same shape, split into several graphs, is accepted
//! as a menu definition to compile.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuMsg {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub graphs: Vec<GraphMsg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMsg {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub nodes: Vec<NodeMsg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMsg {
    #[serde(deserialize_with = "deserialize_name")]
    pub name: String,

    #[serde(default)]
    pub parents: Vec<String>,

    /// Algorithm names, never bodies.
    #[serde(default)]
    pub algos: Vec<String>,
}

impl MenuMsg {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn deserialize_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    // Node names are the keys of the execution plan.
    let s = String::deserialize(deserializer)?;

    if s.trim().is_empty() {
        return Err(serde::de::Error::custom("node name cannot be empty"));
    }
    Ok(s)
}
