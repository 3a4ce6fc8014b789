use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nl2sql::openai::build_chat_request;
use nl2sql::prompt::SystemPrompt;

fn criterion_benchmark(c: &mut Criterion) {
    let prompt = SystemPrompt::default();
    c.bench_function("build chat request", |b| {
        b.iter(|| {
            build_chat_request(
                black_box("gpt-35-turbo"),
                8191,
                &prompt,
                black_box("How many customers are in California?"),
            )
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
