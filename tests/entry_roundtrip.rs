use idstree::datatype::IDS_TIME_MODE_HOMOGENEOUS;
use idstree::dictionary::Factory;
use idstree::entry::DataEntry;
use idstree::tree::IdsToplevel;

const MINIMAL: &str = include_str!("data/minimal.xml");
const MINIMAL_V2: &str = include_str!("data/minimal_v2.xml");

fn factory() -> Factory {
    Factory::from_xml(MINIMAL).expect("schema")
}

fn filled(factory: &Factory) -> IdsToplevel {
    let mut ids = factory.new_ids("minimal").expect("ids");
    ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
        .expect("assign");
    ids.set("time", vec![0.0, 1.0]).expect("assign");
    ids.set("flt_1d", vec![4.0, 5.0]).expect("assign");
    ids.set("flt_0d", 2.5).expect("assign");
    ids.resize("profiles_1d", 2).expect("resize");
    ids.set("profiles_1d(1)/grid/rho", vec![0.5]).expect("assign");
    ids.set("profiles_1d(1)/pressure", vec![10.0]).expect("assign");
    ids
}

#[test]
fn memory_entry_round_trips() {
    let factory = factory();
    let mut entry = DataEntry::open("imas:memory", "w", factory.clone()).expect("entry");
    let ids = filled(&factory);
    entry.put(&ids, 0).expect("put");
    let read = entry.get("minimal", 0).expect("get");
    assert_eq!(read.flatten(), ids.flatten());
}

#[test]
fn memory_entry_lists_sorted_occurrences() {
    let factory = factory();
    let mut entry = DataEntry::open("imas:memory", "w", factory.clone()).expect("entry");
    let ids = filled(&factory);
    for occurrence in [5, 0, 2] {
        entry.put(&ids, occurrence).expect("put");
    }
    let occurrences: Vec<u64> = entry.occurrences("minimal").expect("list").iter().collect();
    assert_eq!(occurrences, vec![0, 2, 5]);
    assert!(
        entry
            .occurrences("settings_ids")
            .expect("list")
            .is_empty()
    );
}

#[test]
fn occurrences_cannot_be_overwritten() {
    let factory = factory();
    let mut entry = DataEntry::open("imas:memory", "w", factory.clone()).expect("entry");
    let ids = filled(&factory);
    entry.put(&ids, 0).expect("put");
    let error = entry.put(&ids, 0).unwrap_err();
    assert!(error.to_string().contains("already exists"));
    // delete clears the way
    entry.delete("minimal", 0).expect("delete");
    entry.put(&ids, 0).expect("put after delete");
}

#[test]
fn empty_ids_is_refused_on_put() {
    let factory = factory();
    let mut entry = DataEntry::open("imas:memory", "w", factory.clone()).expect("entry");
    let ids = factory.new_ids("minimal").expect("ids");
    let error = entry.put(&ids, 0).unwrap_err();
    assert!(error.to_string().contains("homogeneous_time"));
}

#[test]
fn memory_entry_cannot_be_opened_read_only() {
    assert!(DataEntry::open("imas:memory", "r", factory()).is_err());
}

#[test]
fn unknown_scheme_and_bad_uris_are_refused() {
    assert!(DataEntry::open("imas:mdsplus?path=x", "w", factory()).is_err());
    assert!(DataEntry::open("file:whatever", "w", factory()).is_err());
    assert!(DataEntry::open("imas:sqlite", "w", factory()).is_err()); // missing path
}

#[test]
fn sqlite_entry_survives_reopening() {
    let path = "test_idstree_roundtrip.db";
    let _ = std::fs::remove_file(path);
    let uri = format!("imas:sqlite?path={}", path);
    let factory = factory();
    let ids = filled(&factory);
    {
        let mut entry = DataEntry::open(&uri, "w", factory.clone()).expect("entry");
        entry.put(&ids, 0).expect("put");
        entry.put(&ids, 3).expect("put");
        entry.close().expect("close");
    }
    {
        let mut entry = DataEntry::open(&uri, "a", factory.clone()).expect("reopen");
        assert_eq!(entry.dd_version(), "1.0.0");
        let read = entry.get("minimal", 0).expect("get");
        assert_eq!(read.flatten(), ids.flatten());
        let occurrences: Vec<u64> = entry.occurrences("minimal").expect("list").iter().collect();
        assert_eq!(occurrences, vec![0, 3]);
        entry.delete("minimal", 3).expect("delete");
        let occurrences: Vec<u64> = entry.occurrences("minimal").expect("list").iter().collect();
        assert_eq!(occurrences, vec![0]);
    }
    let _ = std::fs::remove_file(path);
}

#[test]
fn sqlite_modes_guard_the_file() {
    let path = "test_idstree_modes.db";
    let _ = std::fs::remove_file(path);
    let uri = format!("imas:sqlite?path={}", path);
    let factory = factory();
    // reading a missing entry fails
    assert!(DataEntry::open(&uri, "r", factory.clone()).is_err());
    // x creates...
    {
        let mut entry = DataEntry::open(&uri, "x", factory.clone()).expect("create");
        entry.put(&filled(&factory), 0).expect("put");
        entry.close().expect("close");
    }
    // ...but refuses an existing file
    assert!(DataEntry::open(&uri, "x", factory.clone()).is_err());
    // w starts over
    {
        let mut entry = DataEntry::open(&uri, "w", factory.clone()).expect("recreate");
        assert!(entry.get("minimal", 0).is_err());
    }
    let _ = std::fs::remove_file(path);
}

#[test]
fn entries_pin_their_dictionary_version() {
    let path = "test_idstree_version.db";
    let _ = std::fs::remove_file(path);
    let uri = format!("imas:sqlite?path={}", path);
    let factory_v1 = factory();
    let factory_v2 = Factory::from_xml(MINIMAL_V2).expect("schema");
    {
        let mut entry = DataEntry::open(&uri, "w", factory_v1.clone()).expect("entry");
        entry.put(&filled(&factory_v1), 0).expect("put");
        entry.close().expect("close");
    }
    {
        let mut entry = DataEntry::open(&uri, "a", factory_v2.clone()).expect("reopen");
        // storing a v2 tree in a v1 entry is refused
        let mut ids = factory_v2.new_ids("minimal").expect("ids");
        ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
            .expect("assign");
        let error = entry.put(&ids, 1).unwrap_err();
        assert!(error.to_string().contains("DD version"));
        // loading converts: flt_0d does not exist in v2 and is dropped
        let read = entry.get("minimal", 0).expect("get");
        assert_eq!(read.version(), "2.0.0");
        assert_eq!(
            read.value("flt_1d").expect("kept"),
            idstree::datatype::IdsValue::from(vec![4.0, 5.0])
        );
        assert!(read.value("flt_0d").is_err());
    }
    let _ = std::fs::remove_file(path);
}
