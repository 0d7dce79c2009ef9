//! Benchmarks for record transformation and relationship inference.
//!
//! Run with: cargo bench -p appwrite-migrate

#![allow(clippy::pedantic)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use appwrite_migrate::schema::{
    AttributeDescriptor, CollectionRef, CollectionSchema, PrimitiveType, RelationshipInferrer,
};
use appwrite_migrate::target::sql::{build_row, SqlDialect};
use appwrite_migrate::target::DialectFamily;
use appwrite_migrate::{ConflictPolicy, Dialect, DocumentTransformer, SchemaTranslator, SourceRecord};

const REL_KEY: &str = "0123456789abcdef0123";

fn record(i: usize) -> SourceRecord {
    let value = json!({
        "$id": format!("{i:020}"),
        "$createdAt": "2024-01-15T10:30:00.000+00:00",
        "$updatedAt": "2024-01-16T10:30:00.000+00:00",
        "$permissions": ["read(\"any\")"],
        "title": "Example document title",
        "content": "This is a longer content field with more text that simulates a real document.",
        "views": i,
        "published": i % 2 == 0,
        "tags": ["rust", "migration", "appwrite"],
        REL_KEY: format!("{:020x}", i)
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn bench_transform(c: &mut Criterion) {
    let rels = [REL_KEY.to_string()].into_iter().collect();
    let sql = DocumentTransformer::new(DialectFamily::Sql, rels);
    let rels = [REL_KEY.to_string()].into_iter().collect();
    let document = DocumentTransformer::new(DialectFamily::Document, rels);
    let source = record(42);

    c.bench_function("transform_sql", |b| {
        b.iter(|| black_box(sql.transform(black_box(&source)).unwrap()))
    });

    c.bench_function("transform_document", |b| {
        b.iter(|| black_box(document.transform(black_box(&source)).unwrap()))
    });
}

fn bench_page_size(c: &mut Criterion) {
    let rels = [REL_KEY.to_string()].into_iter().collect();
    let transformer = DocumentTransformer::new(DialectFamily::Sql, rels);

    let mut group = c.benchmark_group("transform_page");
    for page_size in [25, 100, 500] {
        let page: Vec<SourceRecord> = (0..page_size).map(record).collect();
        group.bench_with_input(BenchmarkId::new("records", page_size), &page, |b, page| {
            b.iter(|| {
                let out: Vec<_> = page
                    .iter()
                    .map(|r| transformer.transform(r).unwrap())
                    .collect();
                black_box(out)
            })
        });
    }
    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let inferrer = RelationshipInferrer::new("^[0-9a-fA-F]{20}$", 10).unwrap();
    let sample: Vec<SourceRecord> = (0..10).map(record).collect();

    c.bench_function("infer_relationships_10", |b| {
        b.iter(|| black_box(inferrer.infer_from_sample(black_box(&sample))))
    });
}

fn bench_build_row(c: &mut Criterion) {
    let inferrer = RelationshipInferrer::new("^[0-9a-fA-F]{20}$", 10).unwrap();
    let translator = SchemaTranslator::new(inferrer.clone(), Dialect::Postgres, None);
    let sample: Vec<SourceRecord> = (0..10).map(record).collect();

    let collection = CollectionRef {
        id: "bench".to_string(),
        name: Some("Bench".to_string()),
    };
    let mut tags = AttributeDescriptor::new("tags", PrimitiveType::String);
    tags.array = true;
    let declared = vec![
        AttributeDescriptor::new("title", PrimitiveType::String).with_size(255),
        AttributeDescriptor::new("content", PrimitiveType::String).with_size(1000),
        AttributeDescriptor::new("views", PrimitiveType::Integer),
        AttributeDescriptor::new("published", PrimitiveType::Boolean),
        tags,
    ];
    let mut schema = CollectionSchema::new(&collection, declared);
    for attribute in inferrer.infer_from_sample(&sample) {
        schema.push(attribute);
    }
    let fields = translator.target_fields(&schema);

    let transformer = DocumentTransformer::new(DialectFamily::Sql, schema.relationship_keys());
    let target = transformer.transform(&record(7)).unwrap();

    c.bench_function("build_sql_row", |b| {
        b.iter(|| black_box(build_row("bench", &fields, black_box(&target)).unwrap()))
    });

    c.bench_function("render_upsert_sql", |b| {
        let columns: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        b.iter(|| {
            black_box(SqlDialect::Postgres.upsert_sql(
                "bench",
                &columns,
                ConflictPolicy::Update,
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_transform,
    bench_page_size,
    bench_inference,
    bench_build_row,
);
criterion_main!(benches);
