//! Filter Translation Benchmarks
//!
//! Measures the cost of turning filter trees into directory queries, from a
//! single leaf up to wide conjunctions with custom schema terms.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use directory_connector::filter::translate;
use directory_connector::schema::CustomSchemas;
use directory_connector::{FilterNode, ResourceType};

const CUSTOM_SCHEMAS: &str = r#"[
    {"name": "Employment", "type": "object", "innerSchemas": [
        {"name": "costCenter", "type": "int"},
        {"name": "badges", "type": "string", "multiValued": true}
    ]}
]"#;

/// A conjunction of `width` leaves over the common account attributes
fn wide_filter(width: usize) -> FilterNode {
    FilterNode::and((0..width).map(|i| match i % 4 {
        0 => FilterNode::starts_with("givenName", format!("Ja{}", i)),
        1 => FilterNode::contains("familyName", format!("Doe {}", i)),
        2 => FilterNode::equals("orgUnitPath", format!("/Eng/Team {}", i)),
        _ => FilterNode::equals("Employment.costCenter", i as i64),
    }))
}

fn bench_leaf_translation(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaf_translation");
    let custom = CustomSchemas::default();

    let cases = [
        ("direct_fetch", ResourceType::Account, FilterNode::equals("__NAME__", "jane@example.com")),
        ("prefix", ResourceType::Account, FilterNode::starts_with("givenName", "Ja")),
        ("quoted", ResourceType::Account, FilterNode::equals("fullName", "Jane O'Neil")),
        ("group_name", ResourceType::Group, FilterNode::contains("name", "staff")),
        (
            "membership_edge",
            ResourceType::Membership,
            FilterNode::and([
                FilterNode::equals("group", "staff@example.com"),
                FilterNode::equals("member", "jane@example.com"),
            ]),
        ),
    ];

    for (name, resource_type, filter) in &cases {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let result = translate(*resource_type, Some(black_box(filter)), &custom);
                let _ = black_box(result);
            });
        });
    }

    // Rejected shapes should fail fast
    let not = FilterNode::not(FilterNode::equals("givenName", "Jane"));
    group.bench_function("unsupported_not", |b| {
        b.iter(|| {
            let result = translate(ResourceType::Account, Some(black_box(&not)), &custom);
            let _ = black_box(result);
        });
    });

    group.finish();
}

fn bench_wide_conjunctions(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_conjunctions");
    let custom = CustomSchemas::from_json(CUSTOM_SCHEMAS).expect("valid custom schemas");

    for width in [4, 16, 64].iter() {
        group.throughput(Throughput::Elements(*width as u64));
        let filter = wide_filter(*width);

        group.bench_with_input(BenchmarkId::new("and", width), &filter, |b, filter| {
            b.iter(|| {
                let result = translate(ResourceType::Account, Some(black_box(filter)), &custom);
                let _ = black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_leaf_translation, bench_wide_conjunctions);
criterion_main!(benches);
