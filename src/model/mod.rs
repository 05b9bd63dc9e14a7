pub mod inp;
pub mod mutator;
pub mod store;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::domain::{SeriesError, TimeSeries};
pub use inp::{InpDocument, InpSection};
pub use mutator::TransientModel;
pub use store::ModelStore;

/// Failures while loading the persisted network description.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("cannot read model file {path}: {message}")]
    Io { path: String, message: String },
    #[error("[{section}] line {line}: {message}")]
    Parse {
        section: String,
        line: usize,
        message: String,
    },
    #[error("time series '{name}' is invalid: {source}")]
    InvalidSeries {
        name: String,
        #[source]
        source: SeriesError,
    },
    #[error("unsupported model construct: {0}")]
    Unsupported(String),
    #[error("model defines no junction or storage nodes")]
    NoNodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Junction,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkKind {
    Conduit,
    Orifice,
    Weir,
    Pump,
    Outlet,
}

impl LinkKind {
    pub const SECTIONS: [(&'static str, LinkKind); 5] = [
        ("CONDUITS", LinkKind::Conduit),
        ("ORIFICES", LinkKind::Orifice),
        ("WEIRS", LinkKind::Weir),
        ("PUMPS", LinkKind::Pump),
        ("OUTLETS", LinkKind::Outlet),
    ];
}

/// A forecastable point of the network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub invert_elevation: f64,
    pub max_depth: f64,
    /// Invert plus maximum depth: the level at which the node surcharges onto the surface.
    pub ground_elevation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub id: String,
    pub kind: LinkKind,
    pub from: String,
    pub to: String,
}

/// Immutable snapshot of the network loaded from the model file.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub nodes: BTreeMap<String, Node>,
    pub links: Vec<Link>,
    pub series: BTreeMap<String, TimeSeries>,
    pub start: Option<NaiveDateTime>,
    /// SHA-256 of the source text, part of every forecast fingerprint.
    pub digest: String,
    pub document: InpDocument,
}

impl NetworkModel {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn has_series(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }
}
