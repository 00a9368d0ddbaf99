//! 템플릿 확장 벤치마크
//!
//! placeholder 모드와 expression 모드의 이벤트당 확장 비용 비교

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use record_reformer::transformer::{
    EventTime, EventView, Expander, ExpressionExpander, PlaceholderExpander, Record, TagParts,
    Template,
};
use serde_json::json;

fn sample_record() -> Record {
    match json!({
        "message": "GET /index.html 200",
        "status": 200,
        "user": "alice",
        "latency_ms": 12.5
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn bench_expander(c: &mut Criterion, name: &str, expander: &dyn Expander, templates: &[Template]) {
    let record = sample_record();
    let tag = "app.web.access";

    // compile outside the measured loop
    for template in templates {
        expander.compile(template).expect("template should compile");
    }

    let mut group = c.benchmark_group(name);
    group.bench_with_input(
        BenchmarkId::new("event", templates.len()),
        &templates,
        |b, templates| {
            b.iter(|| {
                let parts = TagParts::split(tag);
                let view = EventView {
                    record: &record,
                    tag,
                    parts: &parts,
                    time: EventTime::from_secs(1_700_000_000),
                };
                let mut scope = expander.scope(view).expect("scope should build");
                for template in templates.iter() {
                    let _ = scope.expand(template);
                }
            })
        },
    );
    group.finish();
}

fn benchmark_placeholder(c: &mut Criterion) {
    let expander = PlaceholderExpander::new("bench-host");
    let templates = vec![
        Template::new("reformed.${tag_parts[-1]}"),
        Template::new("${hostname} ${message}"),
        Template::new("${status}"),
        Template::new("${user}@${tags[0]}"),
    ];
    bench_expander(c, "placeholder", &expander, &templates);
}

fn benchmark_expression(c: &mut Criterion) {
    let expander = ExpressionExpander::new("bench-host");
    let templates = vec![
        Template::new("reformed.${tag_parts[-1]}"),
        Template::new("${hostname} ${message.to_upper()}"),
        Template::new("${status}"),
        Template::new("${user}@${tag.split('.').first}"),
    ];
    bench_expander(c, "expression", &expander, &templates);
}

criterion_group!(benches, benchmark_placeholder, benchmark_expression);
criterion_main!(benches);
