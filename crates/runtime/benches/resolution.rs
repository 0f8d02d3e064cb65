//! Resolution and lookup throughput.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use solder_runtime::{Bean, Container, Qualifier};

#[derive(Debug)]
struct Settings {
    level: u32,
}

#[derive(Debug)]
struct Worker {
    _settings: std::sync::Arc<Settings>,
}

fn container() -> Container {
    let mut builder = Container::builder()
        .bean(Bean::builder(|_| Ok(Settings { level: 3 })).singleton().build())
        .bean(
            Bean::builder(|creator| {
                Ok(Worker {
                    _settings: creator.get::<Settings>()?,
                })
            })
            .build(),
        );
    // A population of named beans so matching has something to filter.
    for i in 0..50 {
        builder = builder.bean(
            Bean::builder(move |_| Ok(i as u64))
                .named(format!("bean-{i}"))
                .build(),
        );
    }
    builder.build().unwrap()
}

fn bench_resolution(c: &mut Criterion) {
    let container = container();

    c.bench_function("cached_singleton_lookup", |b| {
        b.iter(|| {
            let handle = container.instance::<Settings>().unwrap();
            black_box(handle.get().unwrap().level)
        });
    });

    c.bench_function("dependent_create_and_destroy", |b| {
        b.iter(|| {
            let handle = container.instance::<Worker>().unwrap();
            black_box(handle.get().unwrap());
        });
    });

    c.bench_function("named_lookup", |b| {
        b.iter(|| {
            let handle = container
                .instance_with::<u64>(Qualifier::named("bean-25"))
                .unwrap();
            black_box(*handle.get().unwrap())
        });
    });
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
