//! Spatial reference parsing.
//!
//! Point-cloud headers and engine metadata report their coordinate system as
//! OGC WKT (1 or 2), a PROJ string, or a bare `EPSG:n` code. [`SpatialRef`]
//! keeps the original definition and extracts what the raster codec needs:
//! the EPSG code of the horizontal component, when one is declared.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Textual encoding a spatial reference was given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrsFormat {
    Wkt,
    Proj,
    Epsg,
}

/// A parsed horizontal spatial reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialRef {
    /// Horizontal definition (compound WKT is reduced to its horizontal part).
    pub definition: String,
    pub format: SrsFormat,
    /// EPSG code of the horizontal CRS, if the definition declares one.
    pub epsg: Option<u32>,
}

/// WKT keywords that open a horizontal coordinate system.
const HORIZONTAL_KEYWORDS: &[&str] = &[
    "PROJCS[", "GEOGCS[", "PROJCRS[", "GEOGCRS[", "BASEGEOGCRS[", "GEODCRS[",
];

/// WKT keywords accepted at the top level of a definition.
const WKT_ROOTS: &[&str] = &[
    "PROJCS[",
    "GEOGCS[",
    "GEOCCS[",
    "COMPD_CS[",
    "PROJCRS[",
    "GEOGCRS[",
    "GEODCRS[",
    "COMPOUNDCRS[",
    "BOUNDCRS[",
];

impl SpatialRef {
    /// Parse a WKT, PROJ or `EPSG:n` definition.
    pub fn parse(input: &str) -> Result<Self, CrsParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CrsParseError::Empty);
        }

        let upper = trimmed.to_ascii_uppercase();

        if let Some(code) = upper.strip_prefix("EPSG:") {
            let epsg = code
                .trim()
                .parse::<u32>()
                .map_err(|_| CrsParseError::InvalidEpsg(trimmed.to_string()))?;
            return Ok(Self {
                definition: format!("EPSG:{}", epsg),
                format: SrsFormat::Epsg,
                epsg: Some(epsg),
            });
        }

        if trimmed.starts_with("+proj=") || trimmed.starts_with("+init=") {
            return Ok(Self {
                definition: trimmed.to_string(),
                format: SrsFormat::Proj,
                epsg: proj_init_epsg(trimmed),
            });
        }

        if WKT_ROOTS.iter().any(|root| upper.starts_with(root)) {
            if !brackets_balanced(trimmed) {
                return Err(CrsParseError::MalformedWkt(truncate(trimmed)));
            }
            let horizontal = horizontal_component(trimmed).unwrap_or(trimmed);
            return Ok(Self {
                definition: horizontal.to_string(),
                format: SrsFormat::Wkt,
                epsg: wkt_authority_code(horizontal),
            });
        }

        Err(CrsParseError::Unrecognized(truncate(trimmed)))
    }

    /// Build a reference directly from an EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        Self {
            definition: format!("EPSG:{}", code),
            format: SrsFormat::Epsg,
            epsg: Some(code),
        }
    }

    /// Whether the horizontal CRS is geographic (degrees) rather than projected.
    pub fn is_geographic(&self) -> bool {
        match self.format {
            SrsFormat::Wkt => {
                let upper = self.definition.to_ascii_uppercase();
                upper.starts_with("GEOGCS[") || upper.starts_with("GEOGCRS[")
            }
            SrsFormat::Proj => {
                self.definition.contains("+proj=longlat") || self.definition.contains("+proj=latlong")
            }
            SrsFormat::Epsg => self.epsg.is_some_and(|c| (4000..5000).contains(&c)),
        }
    }

    /// `EPSG:n` when a code is known, otherwise the raw definition.
    pub fn short_name(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => self.definition.clone(),
        }
    }

    /// Same CRS, judged by EPSG code when both carry one.
    pub fn is_equivalent(&self, other: &SpatialRef) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => self.definition == other.definition,
        }
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("empty spatial reference")]
    Empty,

    #[error("invalid EPSG code: {0}")]
    InvalidEpsg(String),

    #[error("malformed WKT: {0}")]
    MalformedWkt(String),

    #[error("unrecognized spatial reference: {0}")]
    Unrecognized(String),
}

fn truncate(s: &str) -> String {
    s.chars().take(60).collect()
}

fn brackets_balanced(s: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' | '(' if !in_quotes => depth += 1,
            ']' | ')' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quotes
}

/// Slice out the horizontal CRS of a compound definition.
///
/// Returns `None` when the definition already is horizontal.
fn horizontal_component(wkt: &str) -> Option<&str> {
    let upper = wkt.to_ascii_uppercase();
    if !(upper.starts_with("COMPD_CS[")
        || upper.starts_with("COMPOUNDCRS[")
        || upper.starts_with("BOUNDCRS["))
    {
        return None;
    }

    let start = HORIZONTAL_KEYWORDS
        .iter()
        .filter_map(|kw| upper.find(kw))
        .min()?;
    let end = matching_bracket(wkt, start)?;
    Some(&wkt[start..=end])
}

/// Index of the bracket closing the object that starts at `start`.
fn matching_bracket(s: &str, start: usize) -> Option<usize> {
    let mut depth = 0i64;
    let mut in_quotes = false;
    for (offset, c) in s[start..].char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' | '(' if !in_quotes => depth += 1,
            ']' | ')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// The outermost authority code of a WKT object.
///
/// WKT1 writes the object's own `AUTHORITY` last, WKT2 its `ID`.
fn wkt_authority_code(wkt: &str) -> Option<u32> {
    let upper = wkt.to_ascii_uppercase();
    let markers = ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","];
    let (pos, marker) = markers
        .iter()
        .filter_map(|m| upper.rfind(m).map(|p| (p, *m)))
        .max_by_key(|(p, _)| *p)?;

    let digits: String = upper[pos + marker.len()..]
        .chars()
        .skip_while(|c| *c == '"' || c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn proj_init_epsg(proj: &str) -> Option<u32> {
    let lower = proj.to_ascii_lowercase();
    let idx = lower.find("+init=epsg:")?;
    let digits: String = lower[idx + "+init=epsg:".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
