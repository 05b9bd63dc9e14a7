//! Minimal reader/writer for the engine's sectioned INP text format.
//!
//! Only the pieces the forecast pipeline needs are interpreted: node elevations,
//! link endpoints, coordinates, simulation start and `[TIMESERIES]` tables. Every other
//! section is carried through verbatim so a transient copy renders back faithfully.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::ModelError;

pub const TIMESERIES: &str = "TIMESERIES";

/// One `[NAME]` block, with its raw lines (comments included).
#[derive(Debug, Clone, PartialEq)]
pub struct InpSection {
    pub name: String,
    pub lines: Vec<String>,
}

impl InpSection {
    /// Data rows: trimmed, comment-stripped, non-empty, with their 1-based file line.
    pub fn rows(&self, first_line: usize) -> impl Iterator<Item = (usize, Vec<&str>)> + '_ {
        self.lines.iter().enumerate().filter_map(move |(i, line)| {
            let data = strip_comment(line).trim();
            if data.is_empty() {
                None
            } else {
                Some((first_line + i + 1, data.split_whitespace().collect()))
            }
        })
    }
}

/// Parsed file: an optional untitled preamble plus ordered sections.
#[derive(Debug, Clone, Default)]
pub struct InpDocument {
    pub preamble: Vec<String>,
    pub sections: Vec<InpSection>,
    /// 1-based line number of each section header, parallel to `sections`.
    pub header_lines: Vec<usize>,
}

impl InpDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = InpDocument::default();
        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(name) = section_header(trimmed) {
                doc.sections.push(InpSection {
                    name: name.to_ascii_uppercase(),
                    lines: Vec::new(),
                });
                doc.header_lines.push(i + 1);
                continue;
            }
            match doc.sections.last_mut() {
                Some(section) => section.lines.push(line.to_string()),
                None => doc.preamble.push(line.to_string()),
            }
        }
        doc
    }

    pub fn section(&self, name: &str) -> Option<(usize, &InpSection)> {
        self.sections
            .iter()
            .zip(&self.header_lines)
            .find(|(s, _)| s.name == name)
            .map(|(s, line)| (*line, s))
    }

    /// All sections with the given name (the format allows repeats).
    pub fn sections_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a InpSection)> + 'a {
        self.sections
            .iter()
            .zip(&self.header_lines)
            .filter(move |(s, _)| s.name == name)
            .map(|(s, line)| (*line, s))
    }
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

pub fn parse_f64(token: &str, section: &str, line: usize) -> Result<f64, ModelError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ModelError::Parse {
            section: section.to_string(),
            line,
            message: format!("expected a number, found '{token}'"),
        })
}

/// `H:MM`, `H:MM:SS` or decimal hours, returned as minutes.
pub fn parse_clock(token: &str) -> Option<f64> {
    if token.contains(':') {
        let mut parts = token.split(':');
        let h: f64 = parts.next()?.parse().ok()?;
        let m: f64 = parts.next()?.parse().ok()?;
        let s: f64 = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0.0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(h * 60.0 + m + s / 60.0)
    } else {
        token.parse::<f64>().ok().map(|h| h * 60.0)
    }
}

pub fn parse_date(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token, "%m/%d/%Y").ok()
}

/// Reads `START_DATE` / `START_TIME` from `[OPTIONS]`.
pub fn simulation_start(doc: &InpDocument) -> Option<NaiveDateTime> {
    let (first, options) = doc.section("OPTIONS")?;
    let mut date = None;
    let mut time = NaiveTime::MIN;
    for (_, cols) in options.rows(first) {
        match (cols.first().map(|c| c.to_ascii_uppercase()), cols.get(1)) {
            (Some(key), Some(value)) if key == "START_DATE" => date = parse_date(value),
            (Some(key), Some(value)) if key == "START_TIME" => {
                if let Some(minutes) = parse_clock(value) {
                    let secs = (minutes * 60.0).round() as u32;
                    time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
                        .unwrap_or(NaiveTime::MIN);
                }
            }
            _ => {}
        }
    }
    date.map(|d| d.and_time(time))
}

/// Formats a minute offset the way `[TIMESERIES]` rows expect it.
pub fn format_clock(minute: f64) -> String {
    if minute.fract() == 0.0 && minute >= 0.0 {
        let total = minute as u64;
        format!("{}:{:02}", total / 60, total % 60)
    } else {
        format!("{:.6}", minute / 60.0)
    }
}

pub fn series_row(name: &str, minute: f64, value: f64) -> String {
    format!("{:<16} {:<12} {}", name, format_clock(minute), value)
}
