use bitmatch::{Bitstring, Matcher};
use criterion::{Criterion, criterion_group, criterion_main};

/// `case_count` cases keyed on the first byte; only the last one matches the packets
/// from [gen_packet].
fn gen_matcher(case_count: usize) -> Matcher {
    let mut builder = Matcher::builder();

    for i in 0..case_count {
        let tag = if i + 1 == case_count { 0xff } else { i % 0xff };
        builder = builder.case(
            format!(
                "{tag} : 8, len : 16 : littleendian, flags : 4, _ : 4, \
                 payload : len * 8 : string, rest : -1 : bitstring"
            ),
            "(len, flags, length(rest))",
        );
    }

    builder.build().unwrap()
}

fn gen_packet(payload_len: usize) -> Vec<u8> {
    let mut data = vec![0xff, payload_len as u8, (payload_len >> 8) as u8, 0xa5];

    // Deterministic but non-trivial pattern
    for i in 0..payload_len + 16 {
        data.push((i * 31 % 256) as u8);
    }

    data
}

fn bench_dispatch(c: &mut Criterion) {
    for &case_count in &[1usize, 10, 50] {
        let matcher = gen_matcher(case_count);
        let packet = gen_packet(64);

        c.bench_function(&format!("dispatch_{}_cases", case_count), |b| {
            b.iter(|| {
                let _ = matcher.run(Bitstring::new(&packet)).unwrap();
            })
        });
    }
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_50_cases", |b| b.iter(|| gen_matcher(50)));
}

criterion_group!(benches, bench_dispatch, bench_compile);
criterion_main!(benches);
