use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nutriplanner_ai::interpret::interpret_str;
use nutriplanner_ai::logging::MemorySink;
use nutriplanner_ai::stream::{ChunkedSource, reduce_stream};
use nutriplanner_ai::translate::to_content_blocks;
use nutriplanner_ai::{
    GenerationParameters, NewTurn, Payload, RequestOptions, StreamChunk, StreamFraming, ToolDeclaration,
    ToolInvocationMode, Turn, compose,
};
use serde_json::json;

// Alternating user/model history with a JSON payload every fifth turn
fn create_history(count: usize, text_size: usize) -> Vec<Turn> {
    let text = "a".repeat(text_size);
    (0..count)
        .map(|i| {
            if i % 5 == 4 {
                Turn::model(
                    "bench",
                    Payload::MenuSuggestion {
                        data: json!({"date": "2024-05-01", "mealType": "dinner", "recipes": [text.clone()]}),
                    },
                )
            } else if i % 2 == 0 {
                Turn::user("bench", Payload::text(text.clone()))
            } else {
                Turn::model("bench", Payload::text(text.clone()))
            }
        })
        .collect()
}

fn create_stream_body(fragments: usize) -> Vec<u8> {
    let objects: Vec<String> = (0..fragments)
        .map(|i| {
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": format!("chunk {} of the reply ", i)}]}}]})
                .to_string()
        })
        .collect();
    format!("[{}]", objects.join(",\r\n")).into_bytes()
}

// Benchmark: history translation by turn count
fn bench_translate_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("translate_history");

    for count in [1, 10, 50, 200].iter() {
        let history = create_history(*count, 200);
        group.bench_with_input(BenchmarkId::from_parameter(count), &history, |b, turns| {
            b.iter(|| to_content_blocks(black_box(turns)));
        });
    }

    group.finish();
}

// Benchmark: full request composition, with and without tools
fn bench_compose(c: &mut Criterion) {
    let history = create_history(20, 200);
    let new_turn = NewTurn::text("What can I cook tonight?");
    let plain = RequestOptions::new().system_instruction("You plan family meals.");
    let with_tools = plain
        .clone()
        .generation_parameters(GenerationParameters::json())
        .tools(vec![ToolDeclaration::new(
            "findStoresWithIngredient",
            "Find stores",
            json!({"type": "object", "properties": {"ingredient": {"type": "string"}}}),
        )])
        .tool_invocation_mode(ToolInvocationMode::Automatic);

    c.bench_function("compose_plain", |b| {
        b.iter(|| compose(black_box(&history), black_box(&new_turn), black_box(&plain)))
    });
    c.bench_function("compose_with_tools_to_json", |b| {
        b.iter(|| {
            compose(black_box(&history), black_box(&new_turn), black_box(&with_tools))
                .to_json()
        })
    });
}

// Benchmark: stream decoding by chunk size
fn bench_stream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decode");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let body = create_stream_body(100);
    let sink = MemorySink::new();

    for chunk_size in [16, 256, 4096].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), chunk_size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut source = ChunkedSource::new(body.chunks(size).map(<[u8]>::to_vec));
                    let mut ignore = |_: StreamChunk| {};
                    reduce_stream(&mut source, StreamFraming::JsonArray, false, &mut ignore, &sink).await
                })
            });
        });
    }

    group.finish();
}

// Benchmark: interpreting a function-call reply
fn bench_interpret_function_call(c: &mut Criterion) {
    let raw = json!({"candidates": [{"content": {"role": "model", "parts": [{
        "functionCall": {"name": "findStoresWithIngredient", "args": {"ingredient": "saffron", "latitude": 48.85, "longitude": 2.35}}
    }]}}]})
    .to_string();

    c.bench_function("interpret_function_call", |b| {
        b.iter(|| interpret_str(black_box(&raw), false))
    });
}

criterion_group!(
    benches,
    bench_translate_history,
    bench_compose,
    bench_stream_decode,
    bench_interpret_function_call
);

criterion_main!(benches);
