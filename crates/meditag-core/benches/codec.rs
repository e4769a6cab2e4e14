//! Benchmark for the tag payload codec.

use criterion::{Criterion, criterion_group, criterion_main};
use meditag_core::{MedicineDraft, NdefMessage, Shape, codec};

fn sample() -> MedicineDraft {
    let mut draft = MedicineDraft::new("Gabapentin", "300 mg");
    draft.shape = Shape::Capsule;
    draft.frequency = 3;
    draft.program_duration = 8;
    draft.times = vec!["9 am".into(), "3 pm".into(), "9 pm".into()];
    draft
}

fn benchmark_codec(c: &mut Criterion) {
    let draft = sample();
    let bytes = codec::encode(&draft, "en")
        .and_then(|encoded| Ok(encoded.message().to_bytes()?))
        .unwrap();

    c.bench_function("encode payload", |b| {
        b.iter(|| {
            let _ = codec::encode(&draft, "en").unwrap().message().to_bytes().unwrap();
        });
    });

    c.bench_function("decode payload", |b| {
        b.iter(|| {
            let message = NdefMessage::from_bytes(&bytes).unwrap();
            let _ = codec::decode(message.records()).unwrap();
        });
    });
}

criterion_group!(benches, benchmark_codec);
criterion_main!(benches);
