//! Data dictionary schema parsing.
//!
//! The dictionary is an XML document listing every IDS toplevel and, nested
//! below it, every field with its data type, coordinates, units and
//! documentation. Parsed dictionaries are immutable and shared; the trees in
//! [`crate::tree`] hold `Arc<Metadata>` references into them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::debug;

use crate::coordinate::{Coordinate, CoordinateKeeper};
use crate::datatype::{IdsDataType, OtherHasher};
use crate::error::{IdsError, Result};
use crate::tree::IdsToplevel;

lazy_static! {
    static ref COORDINATE_ATTRIBUTE: Regex = Regex::new(r"^coordinate([1-6])(_same_as)?$").unwrap();
}

// ------------- IdsType -------------
/// Time behavior of a node as declared by the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdsType {
    /// Does not change within one entry.
    Constant,
    /// Does not change over time within one occurrence.
    Static,
    /// Time dependent.
    Dynamic,
}

impl IdsType {
    pub fn parse(token: &str) -> Result<IdsType> {
        match token {
            "constant" => Ok(IdsType::Constant),
            "static" => Ok(IdsType::Static),
            "dynamic" => Ok(IdsType::Dynamic),
            _ => Err(IdsError::Schema(format!("unknown node type '{}'", token))),
        }
    }
}

// ------------- Metadata -------------
/// Schema record of a single node. Children are ordered as declared and
/// indexed by name.
#[derive(Debug)]
pub struct Metadata {
    name: String,
    path: String, // without the IDS name, empty for a toplevel
    data_type: IdsDataType,
    ndim: usize,
    units: Option<String>,
    documentation: Option<String>,
    ids_type: Option<IdsType>,
    coordinates: Vec<Arc<Coordinate>>,
    coordinates_same_as: Vec<Arc<Coordinate>>,
    children: Vec<Arc<Metadata>>,
    child_index: HashMap<String, usize, OtherHasher>,
}

impl Metadata {
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Slash path of this node below the toplevel, empty for the toplevel.
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn data_type(&self) -> IdsDataType {
        self.data_type
    }
    pub fn ndim(&self) -> usize {
        self.ndim
    }
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }
    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }
    pub fn ids_type(&self) -> Option<IdsType> {
        self.ids_type
    }
    pub fn is_dynamic(&self) -> bool {
        self.ids_type == Some(IdsType::Dynamic)
    }
    pub fn coordinates(&self) -> &[Arc<Coordinate>] {
        &self.coordinates
    }
    pub fn coordinates_same_as(&self) -> &[Arc<Coordinate>] {
        &self.coordinates_same_as
    }
    pub fn children(&self) -> &[Arc<Metadata>] {
        &self.children
    }
    pub fn child(&self, name: &str) -> Option<&Arc<Metadata>> {
        self.child_index.get(name).map(|i| &self.children[*i])
    }
    /// Look up a descendant by slash-joined part names (no index qualifiers).
    pub fn descendant(self: &Arc<Self>, names: &str) -> Option<Arc<Metadata>> {
        let mut current = Arc::clone(self);
        for name in names.split('/') {
            let next = Arc::clone(current.child(name)?);
            current = next;
        }
        Some(current)
    }
}

// ------------- Schema parsing -------------
// Partially read node; becomes Metadata once its end tag is seen.
struct MetadataBuilder {
    name: String,
    path: String,
    data_type: IdsDataType,
    ndim: usize,
    units: Option<String>,
    documentation: Option<String>,
    ids_type: Option<IdsType>,
    coordinate_specs: [Option<String>; 6],
    same_as_specs: [Option<String>; 6],
    children: Vec<Arc<Metadata>>,
}

impl MetadataBuilder {
    fn finish(self, coordinates: &mut CoordinateKeeper) -> Result<Arc<Metadata>> {
        let mut kept_coordinates = Vec::with_capacity(self.ndim);
        let mut kept_same_as = Vec::with_capacity(self.ndim);
        for dim in 0..self.ndim {
            let spec = self.coordinate_specs[dim].as_deref().unwrap_or("");
            kept_coordinates.push(coordinates.keep(spec).0);
            let spec = self.same_as_specs[dim].as_deref().unwrap_or("");
            kept_same_as.push(coordinates.keep(spec).0);
        }
        let mut child_index = HashMap::default();
        for (i, child) in self.children.iter().enumerate() {
            if child_index.insert(child.name().to_owned(), i).is_some() {
                return Err(IdsError::Schema(format!(
                    "duplicate field '{}' under '{}'",
                    child.name(),
                    self.path
                )));
            }
        }
        Ok(Arc::new(Metadata {
            name: self.name,
            path: self.path,
            data_type: self.data_type,
            ndim: self.ndim,
            units: self.units,
            documentation: self.documentation,
            ids_type: self.ids_type,
            coordinates: kept_coordinates,
            coordinates_same_as: kept_same_as,
            children: self.children,
            child_index,
        }))
    }
}

struct DictionaryParser {
    version: String,
    in_version: bool,
    stack: Vec<MetadataBuilder>,
    toplevels: HashMap<String, Arc<Metadata>, OtherHasher>,
    coordinates: CoordinateKeeper,
}

impl DictionaryParser {
    fn new() -> Self {
        Self {
            version: String::new(),
            in_version: false,
            stack: Vec::new(),
            toplevels: HashMap::default(),
            coordinates: CoordinateKeeper::new(),
        }
    }

    fn handle_start(&mut self, element: &BytesStart) -> Result<()> {
        match element.name().as_ref() {
            b"version" => self.in_version = true,
            b"IDS" | b"field" => {
                let builder = self.read_element(element)?;
                self.stack.push(builder);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_end(&mut self, name: &[u8]) -> Result<()> {
        match name {
            b"version" => self.in_version = false,
            b"IDS" | b"field" => self.attach_finished()?,
            _ => {}
        }
        Ok(())
    }

    fn attach_finished(&mut self) -> Result<()> {
        let builder = self
            .stack
            .pop()
            .ok_or_else(|| IdsError::Schema("unbalanced schema document".to_owned()))?;
        let metadata = builder.finish(&mut self.coordinates)?;
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(metadata),
            None => {
                self.toplevels.insert(metadata.name().to_owned(), metadata);
            }
        }
        Ok(())
    }

    fn read_element(&self, element: &BytesStart) -> Result<MetadataBuilder> {
        let is_toplevel = element.name().as_ref() == b"IDS";
        let mut name = None;
        let mut data_type_token = None;
        let mut units = None;
        let mut documentation = None;
        let mut ids_type = None;
        let mut coordinate_specs: [Option<String>; 6] = Default::default();
        let mut same_as_specs: [Option<String>; 6] = Default::default();

        for attribute in element.attributes() {
            let attribute =
                attribute.map_err(|e| IdsError::Schema(format!("bad attribute: {}", e)))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
            let value = String::from_utf8_lossy(&attribute.value).to_string();
            match key.as_str() {
                "name" => name = Some(value),
                "data_type" => data_type_token = Some(value),
                "units" => units = Some(value),
                "documentation" => documentation = Some(value),
                "type" => ids_type = Some(IdsType::parse(&value)?),
                _ => {
                    if let Some(captures) = COORDINATE_ATTRIBUTE.captures(&key) {
                        let dim: usize = captures.get(1).unwrap().as_str().parse().unwrap();
                        if captures.get(2).is_some() {
                            same_as_specs[dim - 1] = Some(value);
                        } else {
                            coordinate_specs[dim - 1] = Some(value);
                        }
                    }
                }
            }
        }

        let name = name.ok_or_else(|| {
            IdsError::Schema("schema element without a name attribute".to_owned())
        })?;
        let (data_type, ndim) = match data_type_token {
            // Toplevels and structural elements may omit data_type.
            None => (IdsDataType::Structure, 0),
            Some(token) => IdsDataType::parse(&token)?,
        };
        if is_toplevel && data_type != IdsDataType::Structure {
            return Err(IdsError::Schema(format!(
                "IDS '{}' must be a structure, not {}",
                name, data_type
            )));
        }
        let path = if is_toplevel {
            String::new()
        } else {
            match self.stack.last() {
                Some(parent) if !parent.path.is_empty() => format!("{}/{}", parent.path, name),
                _ => name.clone(),
            }
        };
        Ok(MetadataBuilder {
            name,
            path,
            data_type,
            ndim,
            units,
            documentation,
            ids_type,
            coordinate_specs,
            same_as_specs,
            children: Vec::new(),
        })
    }
}

// ------------- DataDictionary -------------
pub struct DataDictionary {
    version: String,
    fingerprint: String,
    toplevels: HashMap<String, Arc<Metadata>, OtherHasher>,
}

impl DataDictionary {
    /// Parse a schema document. The fingerprint is a blake3 hash of the raw
    /// bytes, so byte-identical schemas are interchangeable regardless of
    /// where they were loaded from.
    pub fn parse(xml: &str) -> Result<DataDictionary> {
        let mut reader = Reader::from_str(xml);
        let mut parser = DictionaryParser::new();
        loop {
            match reader
                .read_event()
                .map_err(|e| IdsError::Schema(format!("malformed schema XML: {}", e)))?
            {
                Event::Start(ref element) => parser.handle_start(element)?,
                Event::Empty(ref element) => {
                    parser.handle_start(element)?;
                    parser.handle_end(element.name().as_ref())?;
                }
                Event::Text(ref text) => {
                    if parser.in_version {
                        parser
                            .version
                            .push_str(text.unescape().unwrap_or_default().trim());
                    }
                }
                Event::End(ref element) => parser.handle_end(element.name().as_ref())?,
                Event::Eof => break,
                _ => {}
            }
        }
        if parser.version.is_empty() {
            return Err(IdsError::Schema(
                "schema document carries no version".to_owned(),
            ));
        }
        if parser.toplevels.is_empty() {
            return Err(IdsError::Schema(
                "schema document defines no IDS".to_owned(),
            ));
        }
        debug!(
            version = %parser.version,
            toplevels = parser.toplevels.len(),
            coordinates = parser.coordinates.len(),
            "parsed data dictionary"
        );
        Ok(DataDictionary {
            version: parser.version,
            fingerprint: blake3::hash(xml.as_bytes()).to_hex().to_string(),
            toplevels: parser.toplevels,
        })
    }

    pub fn from_file(path: &Path) -> Result<DataDictionary> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            IdsError::Schema(format!("cannot read schema '{}': {}", path.display(), e))
        })?;
        Self::parse(&xml)
    }

    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
    pub fn toplevel(&self, name: &str) -> Option<&Arc<Metadata>> {
        self.toplevels.get(name)
    }
    pub fn ids_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.toplevels.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

// ------------- Factory -------------
/// Creates empty IDS trees for one dictionary version.
#[derive(Clone)]
pub struct Factory {
    dictionary: Arc<DataDictionary>,
}

impl Factory {
    pub fn new(dictionary: Arc<DataDictionary>) -> Self {
        Self { dictionary }
    }
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(Self::new(Arc::new(DataDictionary::parse(xml)?)))
    }
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(DataDictionary::from_file(path)?)))
    }
    pub fn dictionary(&self) -> &Arc<DataDictionary> {
        &self.dictionary
    }
    pub fn version(&self) -> &str {
        self.dictionary.version()
    }
    pub fn fingerprint(&self) -> &str {
        self.dictionary.fingerprint()
    }
    pub fn ids_names(&self) -> Vec<&str> {
        self.dictionary.ids_names()
    }
    pub fn new_ids(&self, name: &str) -> Result<IdsToplevel> {
        let metadata = self.dictionary.toplevel(name).ok_or_else(|| {
            IdsError::Schema(format!(
                "IDS '{}' does not exist in dictionary version {}",
                name,
                self.version()
            ))
        })?;
        Ok(IdsToplevel::new(
            Arc::clone(metadata),
            self.version().to_owned(),
            self.fingerprint().to_owned(),
        ))
    }
}

// ------------- DictionaryKeeper -------------
/// Owns parsed dictionaries, keyed by schema fingerprint, so the same schema
/// bytes are parsed once and shared.
pub struct DictionaryKeeper {
    kept: Mutex<HashMap<String, Arc<DataDictionary>, OtherHasher>>,
}

impl DictionaryKeeper {
    pub fn new() -> Self {
        Self {
            kept: Mutex::new(HashMap::default()),
        }
    }
    pub fn keep(&self, xml: &str) -> Result<(Arc<DataDictionary>, bool)> {
        let fingerprint = blake3::hash(xml.as_bytes()).to_hex().to_string();
        let mut kept = self
            .kept
            .lock()
            .map_err(|e| IdsError::Lock(e.to_string()))?;
        if let Some(dictionary) = kept.get(&fingerprint) {
            return Ok((Arc::clone(dictionary), true));
        }
        let dictionary = Arc::new(DataDictionary::parse(xml)?);
        kept.insert(fingerprint, Arc::clone(&dictionary));
        Ok((dictionary, false))
    }
    pub fn len(&self) -> usize {
        self.kept.lock().map(|kept| kept.len()).unwrap_or(0)
    }
}

impl Default for DictionaryKeeper {
    fn default() -> Self {
        Self::new()
    }
}
