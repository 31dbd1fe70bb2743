// used for persistence
use rusqlite::{Connection, OptionalExtension, params};

// one-to-one mapping between node paths and their interned identities
use bimap::BiMap;

use chrono::Utc;
use roaring::RoaringTreemap;
use tracing::debug;

use crate::entry::Backend;
use crate::error::{IdsError, Result};
use crate::tree::{ArrayRecord, FlatIds, LeafRecord};

/// Array-of-structures marker in the ValueType column; leaves carry their
/// data type token (`FLT_1D`, ...) instead.
const STRUCT_ARRAY_TYPE: &str = "struct_array";

// ------------- Persistence -------------
/// SQLite storage for `imas:sqlite` entries. One row per filled node, with
/// node paths interned in their own table and a ledger of puts.
pub struct SqliteBackend {
    db: Connection,
    version: Option<(String, String)>,
    path_interner: BiMap<String, i64>,
    next_path_identity: i64,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<SqliteBackend> {
        let db = Connection::open(path)?;
        db.execute_batch(
            "
            create table if not exists Entry (
                Property text not null,
                Value text not null,
                constraint unique_Property primary key (
                    Property
                )
            );
            create table if not exists Path (
                Path_Identity integer not null,
                Path text not null,
                constraint referenceable_Path_Identity primary key (
                    Path_Identity
                ),
                constraint unique_Path unique (
                    Path
                )
            );
            create table if not exists Node (
                Ids text not null,
                Occurrence integer not null,
                Path_Identity integer not null,
                Element text not null,
                ValueType text not null,
                Shape text not null,
                Value text not null,
                constraint unique_Node primary key (
                    Ids,
                    Occurrence,
                    Path_Identity,
                    Element
                ),
                constraint Node_has_Path foreign key (
                    Path_Identity
                ) references Path(Path_Identity)
            );
            create table if not exists Put_Ledger (
                Ids text not null,
                Occurrence integer not null,
                Put_At text not null,
                Node_Count integer not null
            );
            ",
        )?;
        let version = {
            let read = |property: &str| -> Result<Option<String>> {
                Ok(db
                    .query_row(
                        "select Value from Entry where Property = ?",
                        params![property],
                        |row| row.get(0),
                    )
                    .optional()?)
            };
            match (read("dd_version")?, read("dd_fingerprint")?) {
                (Some(version), Some(fingerprint)) => Some((version, fingerprint)),
                _ => None,
            }
        };
        let mut path_interner = BiMap::new();
        let mut next_path_identity = 1;
        {
            let mut all_paths = db.prepare("select Path_Identity, Path from Path")?;
            let mut rows = all_paths.query([])?;
            while let Some(row) = rows.next()? {
                let identity: i64 = row.get(0)?;
                let path: String = row.get(1)?;
                if identity >= next_path_identity {
                    next_path_identity = identity + 1;
                }
                path_interner.insert(path, identity);
            }
        }
        debug!(paths = path_interner.len(), "opened sqlite entry");
        Ok(SqliteBackend {
            db,
            version,
            path_interner,
            next_path_identity,
        })
    }

    fn exists(&self, ids_name: &str, occurrence: u64) -> Result<bool> {
        let found: Option<i64> = self
            .db
            .query_row(
                "select 1 from Node where Ids = ? and Occurrence = ? limit 1",
                params![ids_name, occurrence as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn stored_version(&self) -> String {
        self.version
            .as_ref()
            .map(|(version, _)| version.clone())
            .unwrap_or_default()
    }
}

impl Backend for SqliteBackend {
    fn recorded_version(&self) -> Option<(String, String)> {
        self.version.clone()
    }

    fn pin_version(&mut self, version: &str, fingerprint: &str) -> Result<()> {
        let mut add_property = self
            .db
            .prepare_cached("insert or ignore into Entry (Property, Value) values (?, ?)")?;
        add_property.execute(params!["dd_version", version])?;
        add_property.execute(params!["dd_fingerprint", fingerprint])?;
        add_property.execute(params!["created_at", Utc::now().to_rfc3339()])?;
        drop(add_property);
        self.version = Some((version.to_owned(), fingerprint.to_owned()));
        Ok(())
    }

    fn fetch(&mut self, ids_name: &str, occurrence: u64) -> Result<FlatIds> {
        let mut flat = FlatIds {
            ids: ids_name.to_owned(),
            version: self.stored_version(),
            arrays: Vec::new(),
            leaves: Vec::new(),
        };
        let mut all_nodes = self.db.prepare_cached(
            "
            select p.Path, n.Element, n.ValueType, n.Value
                from Node n
                join Path p
                on p.Path_Identity = n.Path_Identity
                where n.Ids = ? and n.Occurrence = ?
                order by n.rowid
            ",
        )?;
        let mut rows = all_nodes.query(params![ids_name, occurrence as i64])?;
        let mut found = false;
        while let Some(row) = rows.next()? {
            found = true;
            let path: String = row.get(0)?;
            let element: String = row.get(1)?;
            let value_type: String = row.get(2)?;
            let value: String = row.get(3)?;
            let trail: Vec<usize> = serde_json::from_str(&element)?;
            if value_type == STRUCT_ARRAY_TYPE {
                flat.arrays.push(ArrayRecord {
                    path,
                    trail,
                    len: value.parse().map_err(|_| {
                        IdsError::Persistence(format!("corrupt array length '{}'", value))
                    })?,
                });
            } else {
                flat.leaves.push(LeafRecord {
                    path,
                    trail,
                    value: serde_json::from_str(&value)?,
                });
            }
        }
        if !found {
            return Err(IdsError::Entry(format!(
                "IDS '{}', occurrence {} is not found",
                ids_name, occurrence
            )));
        }
        Ok(flat)
    }

    fn store(&mut self, flat: &FlatIds, occurrence: u64) -> Result<()> {
        if self.exists(&flat.ids, occurrence)? {
            return Err(IdsError::Entry(format!(
                "IDS '{}', occurrence {} already exists. Cannot overwrite existing data",
                flat.ids, occurrence
            )));
        }
        let mut new_paths: Vec<(String, i64)> = Vec::new();
        let mut next_path_identity = self.next_path_identity;
        let path_interner = &self.path_interner;
        {
            let tx = self.db.transaction()?;
            {
                let mut add_path = tx
                    .prepare_cached("insert into Path (Path_Identity, Path) values (?, ?)")?;
                let mut add_node = tx.prepare_cached(
                    "
                    insert into Node (
                        Ids,
                        Occurrence,
                        Path_Identity,
                        Element,
                        ValueType,
                        Shape,
                        Value
                    ) values (?, ?, ?, ?, ?, ?, ?)
                    ",
                )?;
                let mut intern = |path: &str,
                                  new_paths: &mut Vec<(String, i64)>|
                 -> rusqlite::Result<i64> {
                    if let Some(identity) = path_interner.get_by_left(path) {
                        return Ok(*identity);
                    }
                    if let Some((_, identity)) = new_paths.iter().find(|(p, _)| p == path) {
                        return Ok(*identity);
                    }
                    let identity = next_path_identity;
                    next_path_identity += 1;
                    add_path.execute(params![identity, path])?;
                    new_paths.push((path.to_owned(), identity));
                    Ok(identity)
                };
                for array in &flat.arrays {
                    let identity = intern(&array.path, &mut new_paths)?;
                    add_node.execute(params![
                        flat.ids,
                        occurrence as i64,
                        identity,
                        serde_json::to_string(&array.trail)?,
                        STRUCT_ARRAY_TYPE,
                        serde_json::to_string(&[array.len])?,
                        array.len.to_string(),
                    ])?;
                }
                for leaf in &flat.leaves {
                    let identity = intern(&leaf.path, &mut new_paths)?;
                    add_node.execute(params![
                        flat.ids,
                        occurrence as i64,
                        identity,
                        serde_json::to_string(&leaf.trail)?,
                        leaf.value.type_token(),
                        serde_json::to_string(&leaf.value.shape())?,
                        serde_json::to_string(&leaf.value)?,
                    ])?;
                }
                let mut add_ledger = tx.prepare_cached(
                    "insert into Put_Ledger (Ids, Occurrence, Put_At, Node_Count) values (?, ?, ?, ?)",
                )?;
                add_ledger.execute(params![
                    flat.ids,
                    occurrence as i64,
                    Utc::now().to_rfc3339(),
                    (flat.arrays.len() + flat.leaves.len()) as i64,
                ])?;
            }
            tx.commit()?;
        }
        self.next_path_identity = next_path_identity;
        for (path, identity) in new_paths {
            self.path_interner.insert(path, identity);
        }
        Ok(())
    }

    fn occurrences(&mut self, ids_name: &str) -> Result<RoaringTreemap> {
        let mut all_occurrences = self
            .db
            .prepare_cached("select distinct Occurrence from Node where Ids = ?")?;
        let mut rows = all_occurrences.query(params![ids_name])?;
        let mut occurrences = RoaringTreemap::new();
        while let Some(row) = rows.next()? {
            let occurrence: i64 = row.get(0)?;
            occurrences.insert(occurrence as u64);
        }
        Ok(occurrences)
    }

    fn delete(&mut self, ids_name: &str, occurrence: u64) -> Result<()> {
        self.db.execute(
            "delete from Node where Ids = ? and Occurrence = ?",
            params![ids_name, occurrence as i64],
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // the connection flushes on drop
        Ok(())
    }
}
