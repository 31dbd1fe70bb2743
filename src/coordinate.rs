//! Coordinate references from the data dictionary.
//!
//! A dimension of a leaf node is described by a specifier such as `1...N`
//! (any size), `1...3` (exactly three), `time` (same size as the referred
//! quantity) or `grid/r OR grid/rho_tor_norm` (exclusive alternatives).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::datatype::OtherHasher;
use crate::path::IdsPath;

lazy_static! {
    static ref INDEX_RANGE: Regex = Regex::new(r"^1\.\.\.([0-9]+|N)$").unwrap();
}

#[derive(Debug)]
pub struct Coordinate {
    spec: String,
    size: Option<usize>,
    references: Vec<IdsPath>,
}

impl Coordinate {
    /// Parse a coordinate specifier. Specifiers come straight from schema
    /// files of varying age, so unparseable alternatives are logged and
    /// skipped rather than refused.
    pub fn parse(spec: &str) -> Coordinate {
        let mut size = None;
        let mut references = Vec::new();
        for alternative in spec.split(" OR ") {
            if let Some(captures) = INDEX_RANGE.captures(alternative) {
                let bound = captures.get(1).unwrap().as_str();
                if bound != "N" {
                    size = Some(bound.parse().unwrap());
                }
            } else if !alternative.is_empty() {
                match IdsPath::parse(alternative) {
                    Ok(path) => references.push(path),
                    Err(error) => {
                        debug!(%spec, %error, "ignoring invalid coordinate specifier");
                    }
                }
            }
        }
        Coordinate {
            spec: spec.to_owned(),
            size,
            references,
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }
    /// Exact size of this dimension, e.g. 2 when the specifier is `1...2`.
    pub fn size(&self) -> Option<usize> {
        self.size
    }
    pub fn references(&self) -> &[IdsPath] {
        &self.references
    }
    /// True iff this coordinate specifies a rule that can be checked.
    pub fn has_validation(&self) -> bool {
        self.size.is_some() || !self.references.is_empty()
    }
    /// True iff exclusive alternative coordinates are specified.
    pub fn has_alternatives(&self) -> bool {
        self.references.len() + usize::from(self.size.is_some()) > 1
    }
    /// True iff this coordinate refers to `time`.
    pub fn is_time_coordinate(&self) -> bool {
        self.references.iter().any(|r| r.is_time_path())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.spec)
    }
}

// ------------- CoordinateKeeper -------------
// The same specifier appears on thousands of fields in a full dictionary,
// so parsed coordinates are kept once and shared.
#[derive(Debug)]
pub struct CoordinateKeeper {
    kept: HashMap<String, Arc<Coordinate>, OtherHasher>,
}

impl CoordinateKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
        }
    }
    pub fn keep(&mut self, spec: &str) -> (Arc<Coordinate>, bool) {
        if let Some(kept) = self.kept.get(spec) {
            return (Arc::clone(kept), true);
        }
        let coordinate = Arc::new(Coordinate::parse(spec));
        self.kept.insert(spec.to_owned(), Arc::clone(&coordinate));
        (coordinate, false)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}

impl Default for CoordinateKeeper {
    fn default() -> Self {
        Self::new()
    }
}
