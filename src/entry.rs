//! Data entries: URI-addressed storage sessions for IDS trees.
//!
//! An entry is opened from a URI such as `imas:memory` or
//! `imas:sqlite?path=entry.db` and speaks to its backend through the
//! [`Backend`] seam. Entries are pinned to the dictionary version they were
//! created with; trees from another version are converted on `get` and
//! refused on `put`.

use std::collections::HashMap;
use std::fmt;

use pest::Parser;
use roaring::RoaringTreemap;
use tracing::{info, warn};

use crate::datatype::{IDS_TIME_MODE_UNKNOWN, OtherHasher};
use crate::dictionary::Factory;
use crate::error::{IdsError, Result};
use crate::path::{IdsParser, Rule};
use crate::persist::SqliteBackend;
use crate::tree::{ApplyReport, FlatIds, IdsToplevel};

/// First byte of a serialized IDS buffer.
pub const JSON_SERIALIZER_PROTOCOL: u8 = 1;

// ------------- URIs -------------
#[derive(Debug, Clone)]
pub struct EntryUri {
    raw: String,
    scheme: String,
    parameters: HashMap<String, String, OtherHasher>,
}

impl EntryUri {
    pub fn parse(raw: &str) -> Result<EntryUri> {
        let mut pairs = IdsParser::parse(Rule::uri, raw)
            .map_err(|e| IdsError::Uri(format!("invalid entry URI '{}': {}", raw, e)))?;
        let mut scheme = String::new();
        let mut parameters = HashMap::default();
        for pair in pairs.next().unwrap().into_inner() {
            match pair.as_rule() {
                Rule::scheme => scheme = pair.as_str().to_owned(),
                Rule::parameters => {
                    for parameter in pair.into_inner() {
                        let mut inner = parameter.into_inner();
                        let key = inner.next().unwrap().as_str().to_owned();
                        let value = inner.next().unwrap().as_str().to_owned();
                        parameters.insert(key, value);
                    }
                }
                _ => {}
            }
        }
        Ok(EntryUri {
            raw: raw.to_owned(),
            scheme,
            parameters,
        })
    }
    pub fn scheme(&self) -> &str {
        &self.scheme
    }
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(|v| v.as_str())
    }
}

impl fmt::Display for EntryUri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

// ------------- Access modes -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Existing entry, no writes.
    Read,
    /// Fresh entry, discarding previous contents.
    Write,
    /// Existing or fresh entry, read-write.
    Append,
    /// Fresh entry, refusing to touch an existing one.
    Create,
}

impl AccessMode {
    pub fn parse(token: &str) -> Result<AccessMode> {
        match token {
            "r" => Ok(AccessMode::Read),
            "w" => Ok(AccessMode::Write),
            "a" => Ok(AccessMode::Append),
            "x" => Ok(AccessMode::Create),
            _ => Err(IdsError::Entry(format!("unknown access mode '{}'", token))),
        }
    }
}

// ------------- Backend seam -------------
/// Storage backends move flattened trees; the entry handles trees, versions
/// and conversion.
pub trait Backend {
    /// Dictionary (version, fingerprint) recorded in the storage, if any.
    fn recorded_version(&self) -> Option<(String, String)>;
    fn pin_version(&mut self, version: &str, fingerprint: &str) -> Result<()>;
    fn fetch(&mut self, ids_name: &str, occurrence: u64) -> Result<FlatIds>;
    /// Store one occurrence; refuses to overwrite an existing one.
    fn store(&mut self, flat: &FlatIds, occurrence: u64) -> Result<()>;
    fn occurrences(&mut self, ids_name: &str) -> Result<RoaringTreemap>;
    fn delete(&mut self, ids_name: &str, occurrence: u64) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

// ------------- Memory backend -------------
/// Keeps occurrences in process memory; contents die with the entry.
pub struct MemoryBackend {
    version: Option<(String, String)>,
    stored: HashMap<(String, u64), FlatIds, OtherHasher>,
    occurrences: HashMap<String, RoaringTreemap, OtherHasher>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            version: None,
            stored: HashMap::default(),
            occurrences: HashMap::default(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn recorded_version(&self) -> Option<(String, String)> {
        self.version.clone()
    }
    fn pin_version(&mut self, version: &str, fingerprint: &str) -> Result<()> {
        self.version = Some((version.to_owned(), fingerprint.to_owned()));
        Ok(())
    }
    fn fetch(&mut self, ids_name: &str, occurrence: u64) -> Result<FlatIds> {
        self.stored
            .get(&(ids_name.to_owned(), occurrence))
            .cloned()
            .ok_or_else(|| {
                IdsError::Entry(format!(
                    "IDS '{}', occurrence {} is not found",
                    ids_name, occurrence
                ))
            })
    }
    fn store(&mut self, flat: &FlatIds, occurrence: u64) -> Result<()> {
        let key = (flat.ids.clone(), occurrence);
        if self.stored.contains_key(&key) {
            return Err(IdsError::Entry(format!(
                "IDS '{}', occurrence {} already exists. Cannot overwrite existing data",
                flat.ids, occurrence
            )));
        }
        self.occurrences
            .entry(flat.ids.clone())
            .or_default()
            .insert(occurrence);
        self.stored.insert(key, flat.clone());
        Ok(())
    }
    fn occurrences(&mut self, ids_name: &str) -> Result<RoaringTreemap> {
        Ok(self.occurrences.get(ids_name).cloned().unwrap_or_default())
    }
    fn delete(&mut self, ids_name: &str, occurrence: u64) -> Result<()> {
        self.stored.remove(&(ids_name.to_owned(), occurrence));
        if let Some(set) = self.occurrences.get_mut(ids_name) {
            set.remove(occurrence);
        }
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ------------- DataEntry -------------
pub struct DataEntry {
    uri: EntryUri,
    mode: AccessMode,
    factory: Factory,
    recorded_version: (String, String),
    backend: Box<dyn Backend>,
}

impl DataEntry {
    /// Open an entry. `mode` is one of `r`, `w`, `a`, `x`.
    pub fn open(uri: &str, mode: &str, factory: Factory) -> Result<DataEntry> {
        let uri = EntryUri::parse(uri)?;
        let mode = AccessMode::parse(mode)?;
        let mut backend: Box<dyn Backend> = match uri.scheme() {
            "memory" => {
                if mode == AccessMode::Read {
                    return Err(IdsError::Entry(
                        "a memory entry starts empty, there is nothing to read".to_owned(),
                    ));
                }
                Box::new(MemoryBackend::new())
            }
            "sqlite" => {
                let path = uri.parameter("path").ok_or_else(|| {
                    IdsError::Uri(format!("'{}' is missing the path parameter", uri))
                })?;
                let exists = std::path::Path::new(path).exists();
                match mode {
                    AccessMode::Read if !exists => {
                        return Err(IdsError::Entry(format!("'{}' does not exist", path)));
                    }
                    AccessMode::Create if exists => {
                        return Err(IdsError::Entry(format!("'{}' already exists", path)));
                    }
                    AccessMode::Write if exists => {
                        std::fs::remove_file(path).map_err(|e| {
                            IdsError::Entry(format!("cannot recreate '{}': {}", path, e))
                        })?;
                    }
                    _ => {}
                }
                Box::new(SqliteBackend::open(path)?)
            }
            other => {
                return Err(IdsError::Uri(format!("unsupported backend '{}'", other)));
            }
        };
        let recorded_version = match backend.recorded_version() {
            Some(recorded) => {
                if recorded.1 != factory.fingerprint() {
                    info!(
                        entry_version = %recorded.0,
                        factory_version = %factory.version(),
                        "entry uses another dictionary version, trees convert on get"
                    );
                }
                recorded
            }
            None => {
                let version = (
                    factory.version().to_owned(),
                    factory.fingerprint().to_owned(),
                );
                backend.pin_version(&version.0, &version.1)?;
                version
            }
        };
        Ok(DataEntry {
            uri,
            mode,
            factory,
            recorded_version,
            backend,
        })
    }

    pub fn uri(&self) -> &EntryUri {
        &self.uri
    }
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
    pub fn factory(&self) -> &Factory {
        &self.factory
    }
    /// Dictionary version the storage is pinned to.
    pub fn dd_version(&self) -> &str {
        &self.recorded_version.0
    }

    /// Read one occurrence into a tree of this entry's factory version.
    pub fn get(&mut self, ids_name: &str, occurrence: u64) -> Result<IdsToplevel> {
        let flat = self.backend.fetch(ids_name, occurrence)?;
        let mut ids = self.factory.new_ids(ids_name)?;
        if self.recorded_version.1 == self.factory.fingerprint() {
            ids.apply(&flat)?;
        } else {
            let report = ids.apply_lossy(&flat);
            if !report.skipped.is_empty() {
                warn!(
                    ids = ids_name,
                    from = %flat.version,
                    to = %self.factory.version(),
                    skipped = report.skipped.len(),
                    "conversion dropped nodes"
                );
            }
        }
        Ok(ids)
    }

    /// Store one occurrence. The tree must carry a valid time mode and match
    /// the entry's dictionary version.
    pub fn put(&mut self, ids: &IdsToplevel, occurrence: u64) -> Result<()> {
        if self.mode == AccessMode::Read {
            return Err(IdsError::Entry("entry is opened read-only".to_owned()));
        }
        if ids.time_mode() == IDS_TIME_MODE_UNKNOWN {
            return Err(IdsError::Validation(
                "IDS is found to be EMPTY (homogeneous_time undefined)".to_owned(),
            ));
        }
        if ids.fingerprint() != self.recorded_version.1 {
            return Err(IdsError::Entry(format!(
                "cannot store an IDS with DD version {} in an entry with DD version {}",
                ids.version(),
                self.recorded_version.0
            )));
        }
        self.backend.store(&ids.flatten(), occurrence)
    }

    /// Sorted set of stored occurrence numbers for one IDS.
    pub fn occurrences(&mut self, ids_name: &str) -> Result<RoaringTreemap> {
        self.backend.occurrences(ids_name)
    }

    pub fn delete(&mut self, ids_name: &str, occurrence: u64) -> Result<()> {
        if self.mode == AccessMode::Read {
            return Err(IdsError::Entry("entry is opened read-only".to_owned()));
        }
        self.backend.delete(ids_name, occurrence)
    }

    pub fn close(mut self) -> Result<()> {
        self.backend.close()
    }
}

// ------------- Serialization -------------
/// Serialize an IDS to a portable buffer: one protocol byte followed by the
/// payload.
pub fn serialize(ids: &IdsToplevel) -> Result<Vec<u8>> {
    if ids.time_mode() == IDS_TIME_MODE_UNKNOWN {
        return Err(IdsError::Validation(
            "IDS is found to be EMPTY (homogeneous_time undefined)".to_owned(),
        ));
    }
    let payload = serde_json::to_vec(&ids.flatten())?;
    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(JSON_SERIALIZER_PROTOCOL);
    data.extend_from_slice(&payload);
    Ok(data)
}

/// Deserialize a buffer produced by [`serialize`] into a tree of the given
/// factory version, converting if the versions differ.
pub fn deserialize(factory: &Factory, data: &[u8]) -> Result<IdsToplevel> {
    if data.len() <= 1 {
        return Err(IdsError::Serialization("no data provided".to_owned()));
    }
    if data[0] != JSON_SERIALIZER_PROTOCOL {
        return Err(IdsError::Serialization(format!(
            "unrecognized serialization protocol: {}",
            data[0]
        )));
    }
    let flat: FlatIds = serde_json::from_slice(&data[1..])?;
    let mut ids = factory.new_ids(&flat.ids)?;
    if flat.version == factory.version() {
        ids.apply(&flat)?;
    } else {
        let report = ids.apply_lossy(&flat);
        if !report.skipped.is_empty() {
            warn!(
                ids = %flat.ids,
                from = %flat.version,
                to = %factory.version(),
                skipped = report.skipped.len(),
                "conversion dropped nodes"
            );
        }
    }
    Ok(ids)
}

// ------------- Conversion -------------
/// Rebuild a tree under another dictionary version. Nodes whose path, data
/// type or dimensionality vanished are dropped and listed in the report.
pub fn convert_ids(source: &IdsToplevel, factory: &Factory) -> Result<(IdsToplevel, ApplyReport)> {
    let mut target = factory.new_ids(source.name())?;
    let report = target.apply_lossy(&source.flatten());
    for path in &report.skipped {
        warn!(
            path = path.as_str(),
            from = source.version(),
            to = factory.version(),
            "node dropped during conversion"
        );
    }
    Ok((target, report))
}
