//! Idstree – schema-driven, dynamically typed in-memory data trees.
//!
//! Idstree mirrors an external scientific data dictionary: an XML schema that
//! defines a family of typed trees (IDSs), where:
//! * A [`dictionary::DataDictionary`] is one parsed schema version, holding a
//!   [`dictionary::Metadata`] record per declared node.
//! * An [`tree::IdsToplevel`] is one tree instance. Its structures create
//!   children lazily and its leaves check the declared data type and
//!   dimensionality at assign time.
//! * A [`coordinate::Coordinate`] describes one dimension of a leaf (an exact
//!   size, or the size of another quantity) and drives
//!   [`tree::IdsToplevel::validate`].
//! * A [`entry::DataEntry`] stores and loads trees through a storage backend
//!   addressed by URI.
//!
//! Parsed schemas and coordinate specifiers are owned and deduplicated by
//! "keeper" structures enabling canonical sharing through `Arc`.
//!
//! ## Modules
//! * [`datatype`] – Leaf data types, values, sentinels and time modes.
//! * [`path`] – Parsed path references such as `profiles_1d(itime)/time`.
//! * [`coordinate`] – Coordinate specifiers and their keeper.
//! * [`dictionary`] – Schema parsing, metadata, factories and their keeper.
//! * [`tree`] – The lazily built trees themselves.
//! * [`entry`] – URI-addressed storage sessions, serialization, conversion.
//! * [`persist`] – SQLite persistence layer.
//!
//! ## Quick Start
//! ```
//! use idstree::datatype::IDS_TIME_MODE_HOMOGENEOUS;
//! use idstree::dictionary::Factory;
//!
//! let schema = r#"
//! <IDSs>
//!   <version>1.0.0</version>
//!   <IDS name="minimal" type="dynamic">
//!     <field name="ids_properties" data_type="structure">
//!       <field name="homogeneous_time" data_type="INT_0D" type="constant"/>
//!     </field>
//!     <field name="time" data_type="FLT_1D" coordinate1="1...N" type="dynamic" units="s"/>
//!   </IDS>
//! </IDSs>"#;
//! let factory = Factory::from_xml(schema).unwrap();
//! let mut minimal = factory.new_ids("minimal").unwrap();
//! minimal.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS).unwrap();
//! minimal.set("time", vec![0.0, 0.1]).unwrap();
//! minimal.validate().unwrap();
//! ```
//!
//! ## Storage
//! The [`entry::Backend`] trait separates tree handling from storage. Two
//! backends are provided: a process-memory backend and a SQLite file backend
//! (see [`persist`]). Entries record the dictionary version they were created
//! with; trees stored under another version are converted on load.

pub mod coordinate;
pub mod datatype;
pub mod dictionary;
pub mod entry;
pub mod error;
pub mod path;
pub mod persist;
pub mod tree;
