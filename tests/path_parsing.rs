use idstree::entry::EntryUri;
use idstree::path::{IdsPath, PathIndex};

#[test]
fn plain_paths_parse() {
    let path = IdsPath::parse("ids_properties/homogeneous_time").expect("path");
    assert_eq!(path.parts().len(), 2);
    assert_eq!(path.parts()[0].name(), "ids_properties");
    assert_eq!(path.parts()[1].name(), "homogeneous_time");
    assert!(path.parts().iter().all(|p| p.index().is_none()));
    assert_eq!(path.to_string(), "ids_properties/homogeneous_time");
}

#[test]
fn indexed_paths_parse() {
    let path = IdsPath::parse("profiles_1d(itime)/time").expect("path");
    assert_eq!(
        path.parts()[0].index(),
        Some(&PathIndex::Dummy("itime".to_owned()))
    );
    let path = IdsPath::parse("profiles_1d(4)/grid/rho").expect("path");
    assert_eq!(path.parts()[0].index(), Some(&PathIndex::Literal(4)));
    let path = IdsPath::parse("distribution(:)/process").expect("path");
    assert_eq!(path.parts()[0].index(), Some(&PathIndex::Wildcard));
}

#[test]
fn malformed_paths_are_refused() {
    assert!(IdsPath::parse("").is_err());
    assert!(IdsPath::parse("/leading").is_err());
    assert!(IdsPath::parse("trailing/").is_err());
    assert!(IdsPath::parse("a//b").is_err());
    assert!(IdsPath::parse("bad(").is_err());
    assert!(IdsPath::parse("1numeric").is_err());
}

#[test]
fn time_paths_are_recognized() {
    assert!(IdsPath::parse("time").expect("path").is_time_path());
    assert!(!IdsPath::parse("grid/time").expect("path").is_time_path());
    assert!(!IdsPath::parse("time_width").expect("path").is_time_path());
}

#[test]
fn ancestry_compares_names_only() {
    let parent = IdsPath::parse("profiles_1d").expect("path");
    let child = IdsPath::parse("profiles_1d(itime)/grid/rho").expect("path");
    assert!(parent.is_ancestor_of(&child));
    assert!(!child.is_ancestor_of(&parent));
    assert!(!parent.is_ancestor_of(&parent));
}

#[test]
fn entry_uris_parse() {
    let uri = EntryUri::parse("imas:memory").expect("uri");
    assert_eq!(uri.scheme(), "memory");
    assert_eq!(uri.parameter("path"), None);

    let uri = EntryUri::parse("imas:sqlite?path=entry.db;flavor=test").expect("uri");
    assert_eq!(uri.scheme(), "sqlite");
    assert_eq!(uri.parameter("path"), Some("entry.db"));
    assert_eq!(uri.parameter("flavor"), Some("test"));
    assert_eq!(uri.to_string(), "imas:sqlite?path=entry.db;flavor=test");
}

#[test]
fn malformed_uris_are_refused() {
    assert!(EntryUri::parse("sqlite?path=x").is_err());
    assert!(EntryUri::parse("imas:").is_err());
    assert!(EntryUri::parse("imas:sqlite?").is_err());
    assert!(EntryUri::parse("imas:sqlite?path").is_err());
}
