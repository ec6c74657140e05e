use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use acq_stream::protocol::encode_sample;
use acq_stream::segment::{plan, Demultiplexer};
use acq_stream::session::Channel;

fn interleaved(channels: usize, samples: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(channels * samples * 2);
    for k in 0..samples {
        for c in 0..channels {
            bytes.extend_from_slice(&encode_sample((k + c) as i16));
        }
    }
    bytes
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("demux");

    for &(sites, decimation) in &[(1usize, 1u32), (4, 1), (4, 4)] {
        let count = sites * 32;
        let channels: Vec<Channel> = (0..count).map(|i| Channel::new(i, decimation)).collect();
        let plan = plan(&vec![decimation; count], 8000).unwrap();
        let demux = Demultiplexer::new(channels, &plan, 1.0 / 16000.0);
        let bytes = interleaved(count, plan.segment_length);

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(format!("{}ch_d{}", count, decimation), |b| {
            b.iter(|| demux.split(black_box(&bytes), black_box(7)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_split);
criterion_main!(benches);
