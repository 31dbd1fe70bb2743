// used to parse path references and entry URIs with the shared grammar
use pest::Parser;
use pest_derive::Parser;

// used to print out readable forms of a path
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{IdsError, Result};

#[derive(Parser)]
#[grammar = "idstree.pest"]
pub struct IdsParser;

// ------------- Path -------------
/// Index qualifier of a single path part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathIndex {
    /// Zero-based literal element index.
    Literal(usize),
    /// Dummy index variable such as `itime` or `i1`, resolved against the
    /// position of the element the reference is evaluated in.
    Dummy(String),
    /// All elements (`:`).
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPart {
    name: String,
    index: Option<PathIndex>,
}

impl PathPart {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn index(&self) -> Option<&PathIndex> {
        self.index.as_ref()
    }
}

/// A parsed reference into an IDS tree, as used by coordinate definitions in
/// the data dictionary and by callers addressing nodes.
#[derive(Debug, Clone, Eq)]
pub struct IdsPath {
    raw: String,
    parts: Vec<PathPart>,
}

impl IdsPath {
    pub fn parse(raw: &str) -> Result<IdsPath> {
        let mut pairs = IdsParser::parse(Rule::path, raw)
            .map_err(|e| IdsError::Path(format!("invalid path '{}': {}", raw, e)))?;
        let mut parts = Vec::new();
        for part in pairs.next().unwrap().into_inner() {
            if part.as_rule() != Rule::part {
                continue; // skip EOI
            }
            let mut inner = part.into_inner();
            let name = inner.next().unwrap().as_str().to_owned();
            let index = inner.next().map(|index| {
                let qualifier = index.into_inner().next().unwrap();
                match qualifier.as_rule() {
                    Rule::number => PathIndex::Literal(qualifier.as_str().parse().unwrap()),
                    Rule::wildcard => PathIndex::Wildcard,
                    _ => PathIndex::Dummy(qualifier.as_str().to_owned()),
                }
            });
            parts.push(PathPart { name, index });
        }
        Ok(IdsPath {
            raw: raw.to_owned(),
            parts,
        })
    }

    pub fn parts(&self) -> &[PathPart] {
        &self.parts
    }

    /// Slash-joined part names, without index qualifiers.
    pub fn names(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// True for the toplevel `time` quantity, the anchor of homogeneous time.
    pub fn is_time_path(&self) -> bool {
        self.parts.len() == 1 && self.parts[0].name == "time"
    }

    /// True when `other` lies strictly below this path, comparing part names.
    pub fn is_ancestor_of(&self, other: &IdsPath) -> bool {
        self.parts.len() < other.parts.len()
            && self
                .parts
                .iter()
                .zip(other.parts.iter())
                .all(|(a, b)| a.name == b.name)
    }
}

impl PartialEq for IdsPath {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Hash for IdsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}
impl fmt::Display for IdsPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
