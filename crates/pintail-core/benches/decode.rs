use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use pintail_core::decoder::Decoder;
use pintail_core::dict::Dictionary;

fn bench_dict() -> Arc<Dictionary> {
    Arc::new(Dictionary::from_pairs([
        ("ni", "你"),
        ("ni", "尼"),
        ("hao", "好"),
        ("hao", "号"),
        ("nihao", "你好"),
        ("shi", "是"),
        ("shi", "事"),
        ("jie", "界"),
        ("shijie", "世界"),
        ("ce", "测"),
        ("ceshi", "测试"),
    ]))
}

fn bench_decode(c: &mut Criterion) {
    let dict = bench_dict();
    let mut decoder = Decoder::with_params(Arc::clone(&dict), 20, 0.01);
    for _ in 0..20 {
        let _ = decoder.update("nihaoshijie", "你好世界");
        let _ = decoder.update("ceshi", "测试");
    }

    let mut group = c.benchmark_group("decode");
    for code in ["nihao", "nihaoshijie", "ceshinihaoshijie"] {
        group.bench_with_input(BenchmarkId::from_parameter(code), code, |b, code| {
            b.iter(|| decoder.predict(code, 10));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
