use recall_core::{
    cache_key, EntityName, Expr, IncludePath, Lambda, Method, Parameter, Record, TypeRef, Value,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn news_filter() -> Lambda {
    let p = Parameter::new("p", TypeRef::entity("Post"));
    let captured = Expr::constant(Record::new("Closure").with_field("category", "news"));
    Lambda::predicate(
        p.clone(),
        Expr::param(&p).member("IsPublished", TypeRef::Bool).and(
            Expr::param(&p)
                .member("Category", TypeRef::Str)
                .eq(captured.member("category", TypeRef::Str)),
        ),
    )
}

fn id_filter(len: i64) -> Lambda {
    let p = Parameter::new("p", TypeRef::entity("Post"));
    let ids = Expr::constant(Value::list((0..len).map(Value::Int)));
    Lambda::predicate(
        p.clone(),
        ids.call(Method::Contains, vec![Expr::param(&p).member("Id", TypeRef::Int)]),
    )
}

fn bench_cache_key(c: &mut Criterion) {
    let entity = EntityName::new("Post", "blog.Post");
    let includes = vec![
        IncludePath::parse("Tags").expect("include path"),
        IncludePath::parse("Author").expect("include path"),
    ];

    let filter = news_filter();
    c.bench_function("fingerprint/captured_closure", |b| {
        b.iter(|| {
            let key = cache_key(Some(black_box(&filter)), &entity, &includes).expect("cache key");
            black_box(key);
        });
    });

    let ids = id_filter(256);
    c.bench_function("fingerprint/literal_sequence_256", |b| {
        b.iter(|| {
            let key = cache_key(Some(black_box(&ids)), &entity, &[]).expect("cache key");
            black_box(key);
        });
    });
}

criterion_group!(benches, bench_cache_key);
criterion_main!(benches);
