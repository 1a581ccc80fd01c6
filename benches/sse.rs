use criterion::{black_box, criterion_group, criterion_main, Criterion};
use palace_rs::stream::delta::decode_delta;
use palace_rs::stream::SseParser;

fn sample_stream(frame_count: usize) -> String {
    let mut wire = String::new();
    for idx in 0..frame_count {
        wire.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-{idx}\",\"object\":\"chat.completion.chunk\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {idx} \"}},\"finish_reason\":null}}]}}\n\n"
        ));
    }
    wire.push_str("data: [DONE]\n\n");
    wire
}

fn bench_parser_feed(c: &mut Criterion) {
    let wire = sample_stream(512);

    c.bench_function("sse_parser_feed_whole", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            let events = parser.feed(black_box(&wire));
            black_box(events.len())
        });
    });

    c.bench_function("sse_parser_feed_chunked_64", |b| {
        b.iter(|| {
            let mut parser = SseParser::new();
            let mut events = Vec::with_capacity(600);
            for chunk in wire.as_bytes().chunks(64) {
                parser.feed_into(std::str::from_utf8(chunk).unwrap(), &mut events);
            }
            black_box(events.len())
        });
    });
}

fn bench_delta_decode(c: &mut Criterion) {
    let data = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"a token of answer text"},"finish_reason":null}]}"#;

    c.bench_function("delta_decode_text", |b| {
        b.iter(|| black_box(decode_delta(black_box(data)).unwrap()));
    });

    c.bench_function("delta_decode_sentinel", |b| {
        b.iter(|| black_box(decode_delta(black_box("[DONE]")).unwrap()));
    });
}

criterion_group!(benches, bench_parser_feed, bench_delta_decode);
criterion_main!(benches);
