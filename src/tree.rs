//! In-memory IDS trees.
//!
//! Nodes mirror the dictionary metadata they were created from. Children of a
//! structure materialize on first mutable access; reading an absent child
//! answers from the schema defaults, so an untouched tree allocates almost
//! nothing. Leaf assignment is checked against the declared data type and
//! dimensionality at assign time.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::datatype::{
    IDS_TIME_MODE_HETEROGENEOUS, IDS_TIME_MODE_HOMOGENEOUS, IDS_TIME_MODE_INDEPENDENT,
    IDS_TIME_MODE_UNKNOWN, IDS_TIME_MODES, IdsDataType, IdsValue, OtherHasher,
};
use crate::dictionary::{IdsType, Metadata};
use crate::error::{IdsError, Result};
use crate::path::{IdsPath, PathIndex, PathPart};

// ------------- Nodes -------------
#[derive(Debug, Clone)]
pub enum IdsNode {
    Structure(IdsStructure),
    StructArray(IdsStructArray),
    Primitive(IdsPrimitive),
}

impl IdsNode {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        match metadata.data_type() {
            IdsDataType::Structure => IdsNode::Structure(IdsStructure::new(metadata)),
            IdsDataType::StructArray => IdsNode::StructArray(IdsStructArray::new(metadata)),
            _ => IdsNode::Primitive(IdsPrimitive::new(metadata)),
        }
    }
    pub fn metadata(&self) -> &Arc<Metadata> {
        match self {
            IdsNode::Structure(s) => s.metadata(),
            IdsNode::StructArray(a) => a.metadata(),
            IdsNode::Primitive(p) => p.metadata(),
        }
    }
    pub fn is_empty(&self) -> bool {
        match self {
            IdsNode::Structure(s) => s.is_empty(),
            IdsNode::StructArray(a) => a.is_empty(),
            IdsNode::Primitive(p) => p.is_empty(),
        }
    }
    pub fn as_primitive(&self) -> Option<&IdsPrimitive> {
        match self {
            IdsNode::Primitive(p) => Some(p),
            _ => None,
        }
    }
    pub fn as_struct_array(&self) -> Option<&IdsStructArray> {
        match self {
            IdsNode::StructArray(a) => Some(a),
            _ => None,
        }
    }
}

// ------------- Structure -------------
#[derive(Debug, Clone)]
pub struct IdsStructure {
    metadata: Arc<Metadata>,
    children: HashMap<String, IdsNode, OtherHasher>,
}

impl IdsStructure {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self {
            metadata,
            children: HashMap::default(),
        }
    }
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }
    /// The child node, if it has been materialized.
    pub fn child(&self, name: &str) -> Option<&IdsNode> {
        self.children.get(name)
    }
    /// The child node, materializing it from the schema on first access.
    pub fn child_mut(&mut self, name: &str) -> Result<&mut IdsNode> {
        let metadata = self.metadata.child(name).ok_or_else(|| {
            IdsError::Path(format!(
                "'{}' has no field '{}'",
                display_path(&self.metadata),
                name
            ))
        })?;
        let metadata = Arc::clone(metadata);
        Ok(self
            .children
            .entry(name.to_owned())
            .or_insert_with(|| IdsNode::new(metadata)))
    }
    pub fn is_empty(&self) -> bool {
        self.children.values().all(|child| child.is_empty())
    }
}

fn display_path(metadata: &Metadata) -> &str {
    if metadata.path().is_empty() {
        metadata.name()
    } else {
        metadata.path()
    }
}

// ------------- Array of structures -------------
#[derive(Debug, Clone)]
pub struct IdsStructArray {
    metadata: Arc<Metadata>,
    elements: Vec<IdsStructure>,
}

impl IdsStructArray {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self {
            metadata,
            elements: Vec::new(),
        }
    }
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }
    pub fn len(&self) -> usize {
        self.elements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
    pub fn resize(&mut self, len: usize) {
        let metadata = &self.metadata;
        self.elements
            .resize_with(len, || IdsStructure::new(Arc::clone(metadata)));
    }
    pub fn get(&self, index: usize) -> Option<&IdsStructure> {
        self.elements.get(index)
    }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut IdsStructure> {
        self.elements.get_mut(index)
    }
    pub fn iter(&self) -> std::slice::Iter<'_, IdsStructure> {
        self.elements.iter()
    }
}

// ------------- Primitive -------------
#[derive(Debug, Clone)]
pub struct IdsPrimitive {
    metadata: Arc<Metadata>,
    value: Option<IdsValue>,
}

impl IdsPrimitive {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self {
            metadata,
            value: None,
        }
    }
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }
    /// Assign a value, checking data type and dimensionality against the
    /// declaration.
    pub fn set(&mut self, value: IdsValue) -> Result<()> {
        if value.data_type() != self.metadata.data_type() || value.ndim() != self.metadata.ndim() {
            return Err(IdsError::Type {
                path: display_path(&self.metadata).to_owned(),
                declared: format!("{}_{}D", self.metadata.data_type(), self.metadata.ndim()),
                assigned: value.type_token(),
            });
        }
        self.value = Some(value);
        Ok(())
    }
    pub fn clear(&mut self) {
        self.value = None;
    }
    /// The held value, or the declared default when unset.
    pub fn value(&self) -> IdsValue {
        match &self.value {
            Some(value) => value.clone(),
            None => IdsValue::default_for(self.metadata.data_type(), self.metadata.ndim())
                .expect("leaf metadata always has a default"),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(|v| v.is_empty()).unwrap_or(true)
    }
    pub fn shape(&self) -> Vec<usize> {
        match &self.value {
            Some(value) => value.shape(),
            None => vec![0; self.metadata.ndim()],
        }
    }
}

// ------------- Flattened form -------------
/// Size of one materialized array of structures, with the element index
/// trail of its ancestor arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRecord {
    pub path: String,
    pub trail: Vec<usize>,
    pub len: usize,
}

/// One filled leaf with the element index trail of its ancestor arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub path: String,
    pub trail: Vec<usize>,
    pub value: IdsValue,
}

/// Order-stable flat rendering of the filled part of a toplevel. Array
/// records come before any leaf they contain, in schema declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIds {
    pub ids: String,
    pub version: String,
    pub arrays: Vec<ArrayRecord>,
    pub leaves: Vec<LeafRecord>,
}

/// Outcome of a lossy replay, see [`IdsToplevel::apply_lossy`].
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: Vec<String>,
}

// ------------- Toplevel -------------
/// The root of one IDS tree, pinned to the dictionary version it was created
/// from.
#[derive(Debug, Clone)]
pub struct IdsToplevel {
    name: String,
    version: String,
    fingerprint: String,
    root: IdsStructure,
}

impl IdsToplevel {
    pub fn new(metadata: Arc<Metadata>, version: String, fingerprint: String) -> Self {
        Self {
            name: metadata.name().to_owned(),
            version,
            fingerprint,
            root: IdsStructure::new(metadata),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
    pub fn metadata(&self) -> &Arc<Metadata> {
        self.root.metadata()
    }
    pub fn root(&self) -> &IdsStructure {
        &self.root
    }
    pub fn root_mut(&mut self) -> &mut IdsStructure {
        &mut self.root
    }
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    // ---- path addressed access ----

    /// Assign a leaf, creating the nodes along the path. Struct arrays on
    /// the way must carry literal element indices, e.g.
    /// `profiles_1d(0)/time`.
    pub fn set(&mut self, path: &str, value: impl Into<IdsValue>) -> Result<()> {
        let parsed = IdsPath::parse(path)?;
        match create_in(&mut self.root, parsed.parts())? {
            IdsNode::Primitive(primitive) => primitive.set(value.into()),
            _ => Err(IdsError::Path(format!("'{}' is not a leaf", path))),
        }
    }

    /// Resize an array of structures, creating it if needed.
    pub fn resize(&mut self, path: &str, len: usize) -> Result<()> {
        let parsed = IdsPath::parse(path)?;
        match create_in(&mut self.root, parsed.parts())? {
            IdsNode::StructArray(array) => {
                array.resize(len);
                Ok(())
            }
            _ => Err(IdsError::Path(format!(
                "'{}' is not an array of structures",
                path
            ))),
        }
    }

    /// Read a leaf value; unset (or not yet materialized) leaves read as
    /// their declared default. The path must exist in the schema.
    pub fn value(&self, path: &str) -> Result<IdsValue> {
        let parsed = IdsPath::parse(path)?;
        match self.goto(&parsed)? {
            Some(IdsNode::Primitive(primitive)) => Ok(primitive.value()),
            Some(_) => Err(IdsError::Path(format!("'{}' is not a leaf", path))),
            None => {
                let metadata = self
                    .metadata()
                    .descendant(&parsed.names())
                    .ok_or_else(|| IdsError::Path(format!("unknown path '{}'", path)))?;
                IdsValue::default_for(metadata.data_type(), metadata.ndim())
                    .ok_or_else(|| IdsError::Path(format!("'{}' is not a leaf", path)))
            }
        }
    }

    /// Resolve a parsed path against materialized nodes. `Ok(None)` means
    /// the path is valid in the schema but nothing is materialized there.
    pub fn goto(&self, path: &IdsPath) -> Result<Option<&IdsNode>> {
        let mut structure = &self.root;
        let mut parts = path.parts().iter().peekable();
        while let Some(part) = parts.next() {
            if structure.metadata().child(part.name()).is_none() {
                return Err(IdsError::Path(format!(
                    "'{}' has no field '{}'",
                    display_path(structure.metadata()),
                    part.name()
                )));
            }
            let Some(node) = structure.child(part.name()) else {
                return Ok(None);
            };
            let node = match (part.index(), node) {
                (Some(PathIndex::Literal(i)), IdsNode::StructArray(array)) => {
                    match array.get(*i) {
                        Some(element) if parts.peek().is_some() => {
                            structure = element;
                            continue;
                        }
                        Some(_) => {
                            return Err(IdsError::Path(format!(
                                "'{}({})' addresses a structure element, not a node",
                                part.name(),
                                i
                            )));
                        }
                        None => return Ok(None),
                    }
                }
                (Some(_), IdsNode::StructArray(_)) => {
                    return Err(IdsError::Path(format!(
                        "'{}' needs a literal element index",
                        part.name()
                    )));
                }
                (Some(_), _) => {
                    return Err(IdsError::Path(format!(
                        "'{}' is not an array of structures",
                        part.name()
                    )));
                }
                (None, node) => node,
            };
            if parts.peek().is_none() {
                return Ok(Some(node));
            }
            match node {
                IdsNode::Structure(inner) => structure = inner,
                IdsNode::StructArray(_) => {
                    return Err(IdsError::Path(format!(
                        "missing element index for '{}'",
                        part.name()
                    )));
                }
                IdsNode::Primitive(_) => {
                    return Err(IdsError::Path(format!(
                        "cannot descend into leaf '{}'",
                        part.name()
                    )));
                }
            }
        }
        Err(IdsError::Path("empty path".to_owned()))
    }

    // ---- time mode ----

    /// The time mode stored in `ids_properties/homogeneous_time`, or
    /// [`IDS_TIME_MODE_UNKNOWN`] when unset.
    pub fn time_mode(&self) -> i32 {
        match self.value("ids_properties/homogeneous_time") {
            Ok(IdsValue::Int(mode)) => mode,
            _ => IDS_TIME_MODE_UNKNOWN,
        }
    }

    // ---- flattening ----

    /// Flatten the filled part of the tree into order-stable records.
    pub fn flatten(&self) -> FlatIds {
        let mut flat = FlatIds {
            ids: self.name.clone(),
            version: self.version.clone(),
            arrays: Vec::new(),
            leaves: Vec::new(),
        };
        let mut trail = Vec::new();
        flatten_structure(&self.root, &mut trail, &mut flat);
        flat
    }

    /// Replay flattened records into this tree through the validated
    /// assignment API.
    pub fn apply(&mut self, flat: &FlatIds) -> Result<()> {
        for array in &flat.arrays {
            let names: Vec<&str> = array.path.split('/').collect();
            match create_at(&mut self.root, &names, &array.trail)? {
                IdsNode::StructArray(node) => node.resize(array.len),
                _ => {
                    return Err(IdsError::Path(format!(
                        "'{}' is not an array of structures",
                        array.path
                    )));
                }
            }
        }
        for leaf in &flat.leaves {
            let names: Vec<&str> = leaf.path.split('/').collect();
            match create_at(&mut self.root, &names, &leaf.trail)? {
                IdsNode::Primitive(node) => node.set(leaf.value.clone())?,
                _ => {
                    return Err(IdsError::Path(format!("'{}' is not a leaf", leaf.path)));
                }
            }
        }
        Ok(())
    }

    /// Replay flattened records, skipping whatever this tree's dictionary
    /// version cannot hold: unknown paths, changed data types, changed
    /// dimensionality. The report lists the skipped paths.
    pub fn apply_lossy(&mut self, flat: &FlatIds) -> ApplyReport {
        let mut report = ApplyReport {
            applied: 0,
            skipped: Vec::new(),
        };
        for array in &flat.arrays {
            let names: Vec<&str> = array.path.split('/').collect();
            match create_at(&mut self.root, &names, &array.trail) {
                Ok(IdsNode::StructArray(node)) => {
                    node.resize(array.len);
                    report.applied += 1;
                }
                _ => report.skipped.push(array.path.clone()),
            }
        }
        for leaf in &flat.leaves {
            let names: Vec<&str> = leaf.path.split('/').collect();
            match create_at(&mut self.root, &names, &leaf.trail) {
                Ok(IdsNode::Primitive(node)) => match node.set(leaf.value.clone()) {
                    Ok(()) => report.applied += 1,
                    Err(_) => report.skipped.push(leaf.path.clone()),
                },
                _ => report.skipped.push(leaf.path.clone()),
            }
        }
        report
    }

    // ---- validation ----

    /// Validate the contents of this IDS.
    ///
    /// Checks that the time mode is set and valid, that constant IDSs use
    /// independent time, that no dynamic quantity is filled under
    /// independent time, and that every filled dimension satisfies its
    /// coordinate rules (exact sizes, referred quantity sizes, `same_as`
    /// sizes). Time is special: under homogeneous time every time coordinate
    /// is the toplevel `time` node.
    pub fn validate(&self) -> Result<()> {
        let time_mode = self.time_mode();
        if !IDS_TIME_MODES.contains(&time_mode) {
            return Err(IdsError::Validation(format!(
                "invalid value for ids_properties/homogeneous_time: {}",
                time_mode
            )));
        }
        if self.metadata().ids_type() == Some(IdsType::Constant)
            && time_mode != IDS_TIME_MODE_INDEPENDENT
        {
            return Err(IdsError::Validation(format!(
                "invalid value for ids_properties/homogeneous_time: {}. The IDS is \
                 constant, therefore homogeneous_time must be IDS_TIME_MODE_INDEPENDENT ({})",
                time_mode, IDS_TIME_MODE_INDEPENDENT
            )));
        }
        let mut aos_indices = HashMap::default();
        self.validate_structure(&self.root, time_mode, &mut aos_indices)
    }

    fn validate_structure(
        &self,
        structure: &IdsStructure,
        time_mode: i32,
        aos_indices: &mut HashMap<String, usize, OtherHasher>,
    ) -> Result<()> {
        for child_metadata in structure.metadata().children() {
            let Some(node) = structure.child(child_metadata.name()) else {
                continue;
            };
            if node.is_empty() {
                continue;
            }
            if child_metadata.is_dynamic() && time_mode == IDS_TIME_MODE_INDEPENDENT {
                return Err(IdsError::Validation(format!(
                    "dynamic quantity '{}' is set while homogeneous_time is \
                     IDS_TIME_MODE_INDEPENDENT",
                    child_metadata.path()
                )));
            }
            match node {
                IdsNode::Primitive(primitive) => {
                    self.validate_node(child_metadata, &primitive.shape(), time_mode, aos_indices)?;
                }
                IdsNode::Structure(inner) => {
                    self.validate_structure(inner, time_mode, aos_indices)?;
                }
                IdsNode::StructArray(array) => {
                    self.validate_node(child_metadata, &[array.len()], time_mode, aos_indices)?;
                    for (i, element) in array.iter().enumerate() {
                        aos_indices.insert(child_metadata.path().to_owned(), i);
                        self.validate_structure(element, time_mode, aos_indices)?;
                    }
                    aos_indices.remove(child_metadata.path());
                }
            }
        }
        Ok(())
    }

    fn validate_node(
        &self,
        metadata: &Metadata,
        shape: &[usize],
        time_mode: i32,
        aos_indices: &HashMap<String, usize, OtherHasher>,
    ) -> Result<()> {
        for dim in 0..shape.len() {
            let coordinate = &metadata.coordinates()[dim];
            if !coordinate.has_validation() {
                continue;
            }
            // Exact size rule; alternatives fall through to the references.
            if let Some(size) = coordinate.size() {
                if shape[dim] == size {
                    continue;
                }
                if !coordinate.has_alternatives() {
                    return Err(IdsError::Coordinate {
                        path: metadata.path().to_owned(),
                        dim,
                        actual: shape[dim],
                        expected: size,
                        reference: String::new(),
                    });
                }
            }
            let expected = if coordinate.is_time_coordinate() {
                match time_mode {
                    IDS_TIME_MODE_HOMOGENEOUS => {
                        let time_path = IdsPath::parse("time")?;
                        self.reference_size(&time_path, aos_indices)
                    }
                    IDS_TIME_MODE_HETEROGENEOUS => {
                        // Time coordinates are guaranteed to be unique.
                        self.reference_size(&coordinate.references()[0], aos_indices)
                    }
                    _ => {
                        return Err(IdsError::Validation(format!(
                            "time-dependent quantity '{}' is set while homogeneous_time \
                             is IDS_TIME_MODE_INDEPENDENT",
                            metadata.path()
                        )));
                    }
                }
            } else if !coordinate.has_alternatives() {
                self.reference_size(&coordinate.references()[0], aos_indices)
            } else {
                // Exactly one of the alternatives may be filled.
                let mut defined = Vec::new();
                for reference in coordinate.references() {
                    if let Some((size, path)) = self.reference_size(reference, aos_indices) {
                        if size > 0 {
                            defined.push((size, path));
                        }
                    }
                }
                match defined.len() {
                    0 => {
                        // Reaching this point with an exact-size alternative
                        // means the size check above already failed.
                        if let Some(size) = coordinate.size() {
                            return Err(IdsError::Coordinate {
                                path: metadata.path().to_owned(),
                                dim,
                                actual: shape[dim],
                                expected: size,
                                reference: String::new(),
                            });
                        }
                        return Err(IdsError::Validation(format!(
                            "dimension {} of element '{}' must have exactly one of its \
                             coordinates ({}) set, but none are set",
                            dim,
                            metadata.path(),
                            coordinate
                        )));
                    }
                    1 => Some(defined.remove(0)),
                    _ => {
                        return Err(IdsError::Validation(format!(
                            "dimension {} of element '{}' must have exactly one of its \
                             coordinates ({}) set, but multiple are set",
                            dim,
                            metadata.path(),
                            coordinate
                        )));
                    }
                }
            };
            if let Some((expected_size, reference)) = expected {
                if shape[dim] != expected_size {
                    return Err(IdsError::Coordinate {
                        path: metadata.path().to_owned(),
                        dim,
                        actual: shape[dim],
                        expected: expected_size,
                        reference: format!(" (size of coordinate {})", reference),
                    });
                }
            }
        }
        // same_as rules compare sizes dimension by dimension
        for dim in 0..shape.len() {
            let same_as = &metadata.coordinates_same_as()[dim];
            if !same_as.has_validation() {
                continue;
            }
            let Some(reference) = same_as.references().first() else {
                continue;
            };
            let Some(expected) = self.reference_shape(reference, aos_indices) else {
                continue;
            };
            let expected_size = expected.1.get(dim).copied().unwrap_or(0);
            if shape[dim] != expected_size {
                return Err(IdsError::Coordinate {
                    path: metadata.path().to_owned(),
                    dim,
                    actual: shape[dim],
                    expected: expected_size,
                    reference: format!(" (same as {})", expected.0),
                });
            }
        }
        Ok(())
    }

    /// Size of the first dimension of a referred quantity. `None` when the
    /// reference cannot be resolved structurally (logged and skipped, the
    /// dictionary carries such references for nodes outside our tree).
    fn reference_size(
        &self,
        reference: &IdsPath,
        aos_indices: &HashMap<String, usize, OtherHasher>,
    ) -> Option<(usize, String)> {
        self.reference_shape(reference, aos_indices)
            .map(|(path, shape)| (shape.first().copied().unwrap_or(0), path))
    }

    fn reference_shape(
        &self,
        reference: &IdsPath,
        aos_indices: &HashMap<String, usize, OtherHasher>,
    ) -> Option<(String, Vec<usize>)> {
        match self.resolve(reference, aos_indices) {
            Resolved::Leaf(primitive) => {
                Some((reference.to_string(), primitive.shape()))
            }
            Resolved::Array(array) => Some((reference.to_string(), vec![array.len()])),
            Resolved::Absent(metadata) => match metadata.data_type() {
                IdsDataType::StructArray => Some((reference.to_string(), vec![0])),
                data_type if data_type.is_leaf() => {
                    Some((reference.to_string(), vec![0; metadata.ndim()]))
                }
                _ => {
                    warn!(%reference, "coordinate reference is not a quantity, skipping");
                    None
                }
            },
            Resolved::Unresolvable => {
                warn!(%reference, "cannot resolve coordinate reference, skipping");
                None
            }
        }
    }

    fn resolve(
        &self,
        reference: &IdsPath,
        aos_indices: &HashMap<String, usize, OtherHasher>,
    ) -> Resolved<'_> {
        let mut structure = &self.root;
        let parts = reference.parts();
        for (position, part) in parts.iter().enumerate() {
            let last = position + 1 == parts.len();
            let Some(child_metadata) = structure.metadata().child(part.name()) else {
                return Resolved::Unresolvable;
            };
            let child_metadata = Arc::clone(child_metadata);
            let Some(node) = structure.child(part.name()) else {
                // Nothing is materialized below here, so the target is unset;
                // find its metadata to report the right empty shape.
                if last {
                    return Resolved::Absent(child_metadata);
                }
                let remaining = parts[position + 1..]
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join("/");
                return match child_metadata.descendant(&remaining) {
                    Some(target) => Resolved::Absent(target),
                    None => Resolved::Unresolvable,
                };
            };
            if last {
                return match node {
                    IdsNode::Primitive(primitive) => Resolved::Leaf(primitive),
                    IdsNode::StructArray(array) => Resolved::Array(array),
                    IdsNode::Structure(_) => Resolved::Absent(child_metadata),
                };
            }
            match node {
                IdsNode::Structure(inner) => structure = inner,
                IdsNode::StructArray(array) => {
                    let index = match part.index() {
                        Some(PathIndex::Literal(i)) => Some(*i),
                        Some(PathIndex::Dummy(_)) => {
                            aos_indices.get(child_metadata.path()).copied()
                        }
                        _ => None,
                    };
                    let Some(index) = index else {
                        return Resolved::Unresolvable;
                    };
                    match array.get(index) {
                        Some(element) => structure = element,
                        None => return Resolved::Unresolvable,
                    }
                }
                IdsNode::Primitive(_) => return Resolved::Unresolvable,
            }
        }
        Resolved::Unresolvable
    }

    // ---- printing ----

    /// Render the tree, one line per node. Empty leaves are skipped unless
    /// `show_empty` is set.
    pub fn pretty(&self, show_empty: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} (IDS, version {})", self.name, self.version);
        pretty_structure(self.root.metadata(), Some(&self.root), 1, show_empty, &mut out);
        out
    }
}

impl fmt::Display for IdsToplevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<IdsToplevel (IDS:{})>", self.name)
    }
}

enum Resolved<'a> {
    Leaf(&'a IdsPrimitive),
    Array(&'a IdsStructArray),
    Absent(Arc<Metadata>),
    Unresolvable,
}

// ------------- Navigation helpers -------------
fn create_in<'a>(structure: &'a mut IdsStructure, parts: &[PathPart]) -> Result<&'a mut IdsNode> {
    let Some((part, rest)) = parts.split_first() else {
        return Err(IdsError::Path("empty path".to_owned()));
    };
    if rest.is_empty() && part.index().is_none() {
        return structure.child_mut(part.name());
    }
    let child = structure.child_mut(part.name())?;
    match child {
        IdsNode::Structure(inner) => {
            if part.index().is_some() {
                return Err(IdsError::Path(format!(
                    "'{}' is not an array of structures",
                    part.name()
                )));
            }
            create_in(inner, rest)
        }
        IdsNode::StructArray(array) => {
            let Some(PathIndex::Literal(index)) = part.index() else {
                return Err(IdsError::Path(format!(
                    "'{}' needs a literal element index",
                    part.name()
                )));
            };
            if rest.is_empty() {
                return Err(IdsError::Path(format!(
                    "'{}({})' addresses a structure element, not a node",
                    part.name(),
                    index
                )));
            }
            if array.len() <= *index {
                array.resize(index + 1);
            }
            create_in(array.get_mut(*index).unwrap(), rest)
        }
        IdsNode::Primitive(_) => Err(IdsError::Path(format!(
            "cannot descend into leaf '{}'",
            part.name()
        ))),
    }
}

fn create_at<'a>(
    structure: &'a mut IdsStructure,
    names: &[&str],
    trail: &[usize],
) -> Result<&'a mut IdsNode> {
    let Some((name, rest)) = names.split_first() else {
        return Err(IdsError::Path("empty path".to_owned()));
    };
    if rest.is_empty() {
        return structure.child_mut(name);
    }
    let child = structure.child_mut(name)?;
    match child {
        IdsNode::Structure(inner) => create_at(inner, rest, trail),
        IdsNode::StructArray(array) => {
            let Some((&index, trail_rest)) = trail.split_first() else {
                return Err(IdsError::Path(format!(
                    "missing element index for '{}'",
                    name
                )));
            };
            if array.len() <= index {
                array.resize(index + 1);
            }
            create_at(array.get_mut(index).unwrap(), rest, trail_rest)
        }
        IdsNode::Primitive(_) => Err(IdsError::Path(format!(
            "cannot descend into leaf '{}'",
            name
        ))),
    }
}

fn flatten_structure(structure: &IdsStructure, trail: &mut Vec<usize>, flat: &mut FlatIds) {
    for child_metadata in structure.metadata().children() {
        let Some(node) = structure.child(child_metadata.name()) else {
            continue;
        };
        match node {
            IdsNode::Primitive(primitive) => {
                if !primitive.is_empty() {
                    flat.leaves.push(LeafRecord {
                        path: child_metadata.path().to_owned(),
                        trail: trail.clone(),
                        value: primitive.value(),
                    });
                }
            }
            IdsNode::Structure(inner) => flatten_structure(inner, trail, flat),
            IdsNode::StructArray(array) => {
                if array.is_empty() {
                    continue;
                }
                flat.arrays.push(ArrayRecord {
                    path: child_metadata.path().to_owned(),
                    trail: trail.clone(),
                    len: array.len(),
                });
                for (i, element) in array.iter().enumerate() {
                    trail.push(i);
                    flatten_structure(element, trail, flat);
                    trail.pop();
                }
            }
        }
    }
}

fn pretty_structure(
    metadata: &Metadata,
    structure: Option<&IdsStructure>,
    depth: usize,
    show_empty: bool,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    for child_metadata in metadata.children() {
        let node = structure.and_then(|s| s.child(child_metadata.name()));
        match child_metadata.data_type() {
            IdsDataType::Structure => {
                let inner = match node {
                    Some(IdsNode::Structure(inner)) => Some(inner),
                    _ => None,
                };
                if inner.map(|s| !s.is_empty()).unwrap_or(false) || show_empty {
                    let _ = writeln!(out, "{}{}", indent, child_metadata.name());
                    pretty_structure(child_metadata, inner, depth + 1, show_empty, out);
                }
            }
            IdsDataType::StructArray => {
                let array = node.and_then(|n| n.as_struct_array());
                let len = array.map(|a| a.len()).unwrap_or(0);
                if len > 0 || show_empty {
                    let _ = writeln!(out, "{}{}({})", indent, child_metadata.name(), len);
                    if let Some(array) = array {
                        for (i, element) in array.iter().enumerate() {
                            let _ = writeln!(out, "{}  [{}]", indent, i);
                            pretty_structure(
                                child_metadata,
                                Some(element),
                                depth + 2,
                                show_empty,
                                out,
                            );
                        }
                    }
                }
            }
            _ => {
                let value = match node {
                    Some(IdsNode::Primitive(primitive)) => primitive.value(),
                    _ => match IdsValue::default_for(
                        child_metadata.data_type(),
                        child_metadata.ndim(),
                    ) {
                        Some(value) => value,
                        None => continue,
                    },
                };
                if !value.is_empty() || show_empty {
                    let units = match child_metadata.units() {
                        Some(units) => format!(" [{}]", units),
                        None => String::new(),
                    };
                    let _ = writeln!(
                        out,
                        "{}{}{}: {}",
                        indent,
                        child_metadata.name(),
                        units,
                        value
                    );
                }
            }
        }
    }
}
