use criterion::{Criterion, black_box, criterion_group, criterion_main};

use idstree::datatype::IDS_TIME_MODE_HOMOGENEOUS;
use idstree::dictionary::Factory;
use idstree::tree::IdsToplevel;

const MINIMAL: &str = include_str!("../tests/data/minimal.xml");

fn fill(factory: &Factory, elements: usize) -> IdsToplevel {
    let mut ids = factory.new_ids("minimal").expect("ids");
    ids.set("ids_properties/homogeneous_time", IDS_TIME_MODE_HOMOGENEOUS)
        .expect("assign");
    let time: Vec<f64> = (0..elements).map(|i| i as f64).collect();
    ids.set("time", time.clone()).expect("assign");
    ids.set("flt_1d", time).expect("assign");
    ids.resize("profiles_1d", elements).expect("resize");
    for i in 0..elements {
        ids.set(&format!("profiles_1d({})/grid/rho", i), vec![0.0, 0.5, 1.0])
            .expect("assign");
        ids.set(&format!("profiles_1d({})/pressure", i), vec![1.0, 2.0, 3.0])
            .expect("assign");
    }
    ids
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("parse schema", |b| {
        b.iter(|| Factory::from_xml(black_box(MINIMAL)).expect("schema"))
    });

    let factory = Factory::from_xml(MINIMAL).expect("schema");
    c.bench_function("fill 64 element tree", |b| {
        b.iter(|| fill(black_box(&factory), 64))
    });

    let ids = fill(&factory, 64);
    c.bench_function("validate", |b| b.iter(|| ids.validate().expect("valid")));

    c.bench_function("flatten and apply", |b| {
        b.iter(|| {
            let flat = ids.flatten();
            let mut copy = factory.new_ids("minimal").expect("ids");
            copy.apply(black_box(&flat)).expect("apply");
            copy
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
