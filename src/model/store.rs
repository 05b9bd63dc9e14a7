use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::inp::{self, InpDocument, TIMESERIES};
use super::{Link, LinkKind, ModelError, NetworkModel, Node, NodeKind};
use crate::domain::{Sample, TimeSeries};

/// Owner of the canonical network model. Read-only after construction.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: Option<PathBuf>,
    model: Arc<NetworkModel>,
}

impl ModelStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ModelError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut store = Self::from_text(&text)?;
        store.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            nodes = store.model.nodes.len(),
            links = store.model.links.len(),
            series = store.model.series.len(),
            "network model loaded"
        );
        Ok(store)
    }

    pub fn from_text(text: &str) -> Result<Self, ModelError> {
        let document = InpDocument::parse(text);
        let start = inp::simulation_start(&document);
        let coordinates = read_coordinates(&document)?;
        let nodes = read_nodes(&document, &coordinates)?;
        if nodes.is_empty() {
            return Err(ModelError::NoNodes);
        }
        let links = read_links(&document)?;
        warn_dangling_links(&document, &nodes, &links);
        let series = read_series(&document, start)?;

        let digest = format!("{:x}", Sha256::digest(text.as_bytes()));

        Ok(Self {
            path: None,
            model: Arc::new(NetworkModel {
                nodes,
                links,
                series,
                start,
                digest,
                document,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn model(&self) -> &Arc<NetworkModel> {
        &self.model
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.model.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.model.node(id)
    }

    pub fn series(&self, name: &str) -> Option<&TimeSeries> {
        self.model.series.get(name)
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.model.series.keys().map(String::as_str)
    }
}

fn read_coordinates(doc: &InpDocument) -> Result<HashMap<String, (f64, f64)>, ModelError> {
    let mut coords = HashMap::new();
    for (first, section) in doc.sections_named("COORDINATES") {
        for (line, cols) in section.rows(first) {
            if cols.len() < 3 {
                continue;
            }
            let x = inp::parse_f64(cols[1], "COORDINATES", line)?;
            let y = inp::parse_f64(cols[2], "COORDINATES", line)?;
            coords.insert(cols[0].to_string(), (x, y));
        }
    }
    Ok(coords)
}

fn read_nodes(
    doc: &InpDocument,
    coords: &HashMap<String, (f64, f64)>,
) -> Result<BTreeMap<String, Node>, ModelError> {
    let mut nodes = BTreeMap::new();
    for (name, kind) in [("JUNCTIONS", NodeKind::Junction), ("STORAGE", NodeKind::Storage)] {
        for (first, section) in doc.sections_named(name) {
            for (line, cols) in section.rows(first) {
                if cols.len() < 3 {
                    return Err(ModelError::Parse {
                        section: name.to_string(),
                        line,
                        message: "expected at least name, elevation and max depth".into(),
                    });
                }
                let invert = inp::parse_f64(cols[1], name, line)?;
                let max_depth = inp::parse_f64(cols[2], name, line)?;
                let id = cols[0].to_string();
                if nodes.contains_key(&id) {
                    return Err(ModelError::Parse {
                        section: name.to_string(),
                        line,
                        message: format!("duplicate node '{id}'"),
                    });
                }
                nodes.insert(
                    id.clone(),
                    Node {
                        coordinates: coords.get(&id).copied(),
                        id,
                        kind,
                        invert_elevation: invert,
                        max_depth,
                        ground_elevation: invert + max_depth,
                    },
                );
            }
        }
    }
    Ok(nodes)
}

fn read_links(doc: &InpDocument) -> Result<Vec<Link>, ModelError> {
    let mut links = Vec::new();
    for (name, kind) in LinkKind::SECTIONS {
        for (first, section) in doc.sections_named(name) {
            for (line, cols) in section.rows(first) {
                if cols.len() < 3 {
                    return Err(ModelError::Parse {
                        section: name.to_string(),
                        line,
                        message: "expected name, from node and to node".into(),
                    });
                }
                links.push(Link {
                    id: cols[0].to_string(),
                    kind,
                    from: cols[1].to_string(),
                    to: cols[2].to_string(),
                });
            }
        }
    }
    Ok(links)
}

fn warn_dangling_links(doc: &InpDocument, nodes: &BTreeMap<String, Node>, links: &[Link]) {
    let mut known: HashSet<&str> = nodes.keys().map(String::as_str).collect();
    for name in ["OUTFALLS", "DIVIDERS"] {
        for (first, section) in doc.sections_named(name) {
            for (_, cols) in section.rows(first) {
                if let Some(id) = cols.first() {
                    known.insert(*id);
                }
            }
        }
    }
    for link in links {
        for end in [&link.from, &link.to] {
            if !known.contains(end.as_str()) {
                warn!(link = %link.id, node = %end, "link references an undefined node");
            }
        }
    }
}

enum RawTime {
    Elapsed(f64),
    At(NaiveDateTime),
}

fn read_series(
    doc: &InpDocument,
    start: Option<NaiveDateTime>,
) -> Result<BTreeMap<String, TimeSeries>, ModelError> {
    let mut raw: BTreeMap<String, Vec<(RawTime, f64)>> = BTreeMap::new();
    for (first, section) in doc.sections_named(TIMESERIES) {
        for (line, cols) in section.rows(first) {
            let name = cols[0];
            if cols.get(1).is_some_and(|c| c.eq_ignore_ascii_case("FILE")) {
                return Err(ModelError::Unsupported(format!(
                    "time series '{name}' reads from an external file"
                )));
            }
            let entry = raw.entry(name.to_string()).or_default();
            let mut i = 1;
            while i < cols.len() {
                let bad = |message: String| ModelError::Parse {
                    section: TIMESERIES.into(),
                    line,
                    message,
                };
                let time = if let Some(date) = inp::parse_date(cols[i]) {
                    let clock = cols
                        .get(i + 1)
                        .and_then(|c| inp::parse_clock(c))
                        .ok_or_else(|| bad(format!("missing time after date '{}'", cols[i])))?;
                    i += 2;
                    let at = date.and_time(NaiveTime::MIN)
                        + chrono::Duration::seconds((clock * 60.0).round() as i64);
                    RawTime::At(at)
                } else {
                    let clock = inp::parse_clock(cols[i])
                        .ok_or_else(|| bad(format!("cannot read time '{}'", cols[i])))?;
                    i += 1;
                    RawTime::Elapsed(clock)
                };
                let token = cols
                    .get(i)
                    .ok_or_else(|| bad(format!("series '{name}' has a time without a value")))?;
                let value = inp::parse_f64(token, TIMESERIES, line)?;
                i += 1;
                entry.push((time, value));
            }
        }
    }

    raw.into_iter()
        .map(|(name, points)| {
            let origin = start.or_else(|| {
                points.iter().find_map(|(t, _)| match t {
                    RawTime::At(at) => Some(*at),
                    RawTime::Elapsed(_) => None,
                })
            });
            let samples = points
                .into_iter()
                .map(|(time, value)| {
                    let minute = match (time, origin) {
                        (RawTime::Elapsed(m), _) => m,
                        (RawTime::At(at), Some(origin)) => {
                            (at - origin).num_seconds() as f64 / 60.0
                        }
                        (RawTime::At(_), None) => 0.0,
                    };
                    Sample::new(minute, value)
                })
                .collect();
            TimeSeries::new(samples)
                .map(|series| (name.clone(), series))
                .map_err(|source| ModelError::InvalidSeries { name, source })
        })
        .collect()
}
