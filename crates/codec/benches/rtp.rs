use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rtp_stream_codec::{PT_AUDIO, RtpPacket};

fn criterion_benchmark(c: &mut Criterion) {
    // One 20ms frame of 16-bit mono PCM at 8kHz.
    let packet = RtpPacket::new_media(PT_AUDIO, 1, 160, 0x12345678, Bytes::from(vec![0x5a; 320]));
    let wire = packet.to_bytes();
    let mut buf = BytesMut::with_capacity(2048);

    let mut rtp_criterion = c.benchmark_group("rtp");

    rtp_criterion.throughput(Throughput::Elements(1));
    rtp_criterion.bench_function("encode_audio_frame", |bencher| {
        bencher.iter(|| {
            packet.encode(&mut buf);
        })
    });

    rtp_criterion.bench_function("decode_audio_frame", |bencher| {
        bencher.iter(|| {
            RtpPacket::decode(&wire).unwrap();
        })
    });

    rtp_criterion.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
