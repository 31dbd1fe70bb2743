use idstree::datatype::{EMPTY_FLOAT, IdsValue};
use idstree::dictionary::Factory;

const MINIMAL: &str = include_str!("data/minimal.xml");

#[test]
fn reading_does_not_materialize_nodes() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let minimal = factory.new_ids("minimal").expect("ids");
    // reading a leaf answers from the schema default
    assert_eq!(
        minimal.value("flt_0d").expect("valid path"),
        IdsValue::Flt(EMPTY_FLOAT)
    );
    assert_eq!(
        minimal.value("ids_properties/comment").expect("valid path"),
        IdsValue::Str(String::new())
    );
    // and leaves nothing behind
    assert!(minimal.root().child("flt_0d").is_none());
    assert!(minimal.root().child("ids_properties").is_none());
    assert!(minimal.is_empty());
}

#[test]
fn writing_materializes_the_path() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let mut minimal = factory.new_ids("minimal").expect("ids");
    minimal.set("ids_properties/comment", "hello").expect("assign");
    assert!(minimal.root().child("ids_properties").is_some());
    assert_eq!(
        minimal.value("ids_properties/comment").expect("valid path"),
        IdsValue::Str("hello".to_owned())
    );
    assert!(!minimal.is_empty());
}

#[test]
fn unknown_paths_are_refused() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let mut minimal = factory.new_ids("minimal").expect("ids");
    assert!(minimal.set("no_such_field", 1.0).is_err());
    assert!(minimal.value("ids_properties/no_such_field").is_err());
    assert!(minimal.set("ids_properties", 1.0).is_err()); // not a leaf
}

#[test]
fn struct_arrays_resize_and_index() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let mut minimal = factory.new_ids("minimal").expect("ids");
    minimal.resize("profiles_1d", 2).expect("resize");
    minimal
        .set("profiles_1d(0)/grid/rho", vec![0.1, 0.2])
        .expect("assign");
    minimal
        .set("profiles_1d(1)/grid/rho", vec![0.1])
        .expect("assign");
    assert_eq!(
        minimal
            .value("profiles_1d(0)/grid/rho")
            .expect("valid path"),
        IdsValue::from(vec![0.1, 0.2])
    );
    // assigning past the end grows the array
    minimal
        .set("profiles_1d(4)/grid/rho", vec![0.5])
        .expect("assign");
    let array = minimal
        .goto(&idstree::path::IdsPath::parse("profiles_1d").expect("path"))
        .expect("valid path")
        .expect("materialized")
        .as_struct_array()
        .expect("array node")
        .len();
    assert_eq!(array, 5);
}

#[test]
fn unmaterialized_element_reads_as_default() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let mut minimal = factory.new_ids("minimal").expect("ids");
    minimal.resize("profiles_1d", 1).expect("resize");
    assert_eq!(
        minimal
            .value("profiles_1d(0)/pressure")
            .expect("valid path"),
        IdsValue::from(Vec::<f64>::new())
    );
}

#[test]
fn pretty_print_shows_filled_nodes_only() {
    let factory = Factory::from_xml(MINIMAL).expect("schema");
    let mut minimal = factory.new_ids("minimal").expect("ids");
    minimal.set("time", vec![0.0, 1.0]).expect("assign");
    minimal.set("flt_0d", 2.5).expect("assign");
    let rendered = minimal.pretty(false);
    assert!(rendered.contains("time [s]: [0, 1]"));
    assert!(rendered.contains("flt_0d [m]: 2.5"));
    assert!(!rendered.contains("comment"));
    // show_empty also renders untouched nodes
    let rendered = minimal.pretty(true);
    assert!(rendered.contains("comment"));
}
