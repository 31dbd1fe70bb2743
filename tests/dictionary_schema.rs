use std::sync::Arc;

use idstree::datatype::IdsDataType;
use idstree::dictionary::{DataDictionary, DictionaryKeeper, Factory, IdsType};

const MINIMAL: &str = include_str!("data/minimal.xml");
const MINIMAL_V2: &str = include_str!("data/minimal_v2.xml");

#[test]
fn schema_parses_into_metadata() {
    let dictionary = DataDictionary::parse(MINIMAL).expect("schema");
    assert_eq!(dictionary.version(), "1.0.0");
    assert_eq!(dictionary.ids_names(), vec!["minimal", "settings_ids"]);

    let minimal = dictionary.toplevel("minimal").expect("toplevel");
    assert_eq!(minimal.data_type(), IdsDataType::Structure);
    assert_eq!(minimal.ids_type(), Some(IdsType::Dynamic));

    let flt_1d = minimal.descendant("flt_1d").expect("field");
    assert_eq!(flt_1d.data_type(), IdsDataType::Flt);
    assert_eq!(flt_1d.ndim(), 1);
    assert_eq!(flt_1d.units(), Some("m"));
    assert_eq!(flt_1d.coordinates()[0].spec(), "time");
    assert!(flt_1d.coordinates()[0].is_time_coordinate());
    assert!(flt_1d.is_dynamic());

    let homogeneous_time = minimal
        .descendant("ids_properties/homogeneous_time")
        .expect("field");
    assert_eq!(homogeneous_time.path(), "ids_properties/homogeneous_time");
    assert_eq!(
        homogeneous_time.documentation(),
        Some("Time mode of this IDS")
    );

    // children keep their declaration order
    let profiles = minimal.descendant("profiles_1d").expect("field");
    assert_eq!(profiles.data_type(), IdsDataType::StructArray);
    let names: Vec<&str> = profiles.children().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["pressure", "grid"]);
}

#[test]
fn identical_coordinate_specs_are_shared() {
    let dictionary = DataDictionary::parse(MINIMAL).expect("schema");
    let minimal = dictionary.toplevel("minimal").expect("toplevel");
    let time = minimal.descendant("time").expect("field");
    let rho = minimal.descendant("profiles_1d/grid/rho").expect("field");
    // both are 1...N and point at the same kept coordinate
    assert!(Arc::ptr_eq(&time.coordinates()[0], &rho.coordinates()[0]));
}

#[test]
fn dictionary_keeper_deduplicates_by_fingerprint() {
    let keeper = DictionaryKeeper::new();
    let (first, previously_kept) = keeper.keep(MINIMAL).expect("schema");
    assert!(!previously_kept);
    let (second, previously_kept) = keeper.keep(MINIMAL).expect("schema");
    assert!(previously_kept);
    assert!(Arc::ptr_eq(&first, &second));
    let (other, previously_kept) = keeper.keep(MINIMAL_V2).expect("schema");
    assert!(!previously_kept);
    assert_ne!(first.fingerprint(), other.fingerprint());
    assert_eq!(keeper.len(), 2);
}

#[test]
fn malformed_schemas_are_refused() {
    // no version
    assert!(DataDictionary::parse("<IDSs><IDS name=\"a\"/></IDSs>").is_err());
    // no IDS
    assert!(DataDictionary::parse("<IDSs><version>1.0.0</version></IDSs>").is_err());
    // unknown data type
    assert!(
        DataDictionary::parse(
            "<IDSs><version>1.0.0</version><IDS name=\"a\">\
             <field name=\"x\" data_type=\"BOOL_0D\"/></IDS></IDSs>"
        )
        .is_err()
    );
    // nameless field
    assert!(
        DataDictionary::parse(
            "<IDSs><version>1.0.0</version><IDS name=\"a\">\
             <field data_type=\"INT_0D\"/></IDS></IDSs>"
        )
        .is_err()
    );
    // duplicate field names
    assert!(
        DataDictionary::parse(
            "<IDSs><version>1.0.0</version><IDS name=\"a\">\
             <field name=\"x\" data_type=\"INT_0D\"/>\
             <field name=\"x\" data_type=\"INT_0D\"/></IDS></IDSs>"
        )
        .is_err()
    );
    // not even XML
    assert!(DataDictionary::parse("not xml at all <<<").is_err());
}

#[test]
fn factories_create_only_declared_ids() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    assert!(factory.new_ids("minimal").is_ok());
    let error = factory.new_ids("equilibrium").unwrap_err();
    assert!(error.to_string().contains("does not exist"));
}
