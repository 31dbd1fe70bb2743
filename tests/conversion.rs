use idstree::datatype::{IDS_TIME_MODE_HOMOGENEOUS, IdsValue};
use idstree::dictionary::Factory;
use idstree::entry::convert_ids;

const MINIMAL: &str = include_str!("data/minimal.xml");
const MINIMAL_V2: &str = include_str!("data/minimal_v2.xml");

#[test]
fn matching_paths_survive_conversion() {
    let factory_v1 = Factory::from_xml(MINIMAL).expect("schema");
    let factory_v2 = Factory::from_xml(MINIMAL_V2).expect("schema");
    let mut ids = factory_v1.new_ids("minimal").expect("ids");
    ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
        .expect("assign");
    ids.set("time", vec![0.0, 1.0]).expect("assign");
    ids.set("flt_1d", vec![3.0, 4.0]).expect("assign");
    ids.resize("profiles_1d", 2).expect("resize");
    ids.set("profiles_1d(0)/pressure", vec![7.0]).expect("assign");
    ids.set("profiles_1d(0)/grid/rho", vec![0.1]).expect("assign");

    let (converted, report) = convert_ids(&ids, &factory_v2).expect("convert");
    assert_eq!(converted.version(), "2.0.0");
    assert!(report.skipped.is_empty());
    assert_eq!(
        converted.value("flt_1d").expect("kept"),
        IdsValue::from(vec![3.0, 4.0])
    );
    assert_eq!(
        converted.value("profiles_1d(0)/pressure").expect("kept"),
        IdsValue::from(vec![7.0])
    );
    converted.validate().expect("still valid");
}

#[test]
fn vanished_paths_are_reported() {
    let factory_v1 = Factory::from_xml(MINIMAL).expect("schema");
    let factory_v2 = Factory::from_xml(MINIMAL_V2).expect("schema");
    let mut ids = factory_v1.new_ids("minimal").expect("ids");
    ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
        .expect("assign");
    ids.set("flt_0d", 1.5).expect("assign"); // dropped in v2
    let (converted, report) = convert_ids(&ids, &factory_v2).expect("convert");
    assert_eq!(report.skipped, vec!["flt_0d".to_owned()]);
    assert!(converted.value("flt_0d").is_err());
}

#[test]
fn changed_types_are_reported() {
    let factory_v1 = Factory::from_xml(MINIMAL).expect("schema");
    let factory_v2 = Factory::from_xml(MINIMAL_V2).expect("schema");
    let mut ids = factory_v1.new_ids("minimal").expect("ids");
    ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
        .expect("assign");
    // str_1d became INT_1D in version 2.0.0
    ids.set("str_1d", vec!["a".to_owned()]).expect("assign");
    let (converted, report) = convert_ids(&ids, &factory_v2).expect("convert");
    assert_eq!(report.skipped, vec!["str_1d".to_owned()]);
    assert!(converted.value("str_1d").expect("path exists").is_empty());
}

#[test]
fn conversion_to_an_unknown_ids_fails() {
    let factory_v1 = Factory::from_xml(MINIMAL).expect("schema");
    let factory_v2 = Factory::from_xml(MINIMAL_V2).expect("schema");
    let mut ids = factory_v1.new_ids("settings_ids").expect("ids");
    ids.set("ids_properties/homogeneous_time", 2).expect("assign");
    // settings_ids does not exist in version 2.0.0
    assert!(convert_ids(&ids, &factory_v2).is_err());
}
