//! Codec throughput for the frames that dominate a busy room: relayed ICE
//! candidates inbound and participant syncs outbound.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use common::types::{ConnectionId, MediaKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use room_protocol::codec::{decode_client, encode_server};
use room_protocol::{ChatEntry, ClientEvent, IceCandidateInit, ParticipantSnapshot, ServerEvent};

fn candidate_frame() -> String {
    let event = ClientEvent::IceCandidate {
        to: ConnectionId::new(),
        candidate: IceCandidateInit::new(
            "candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx raddr 0.0.0.0 rport 0",
        ),
        kind: MediaKind::Video,
    };
    room_protocol::codec::encode_client(&event).unwrap()
}

fn bench_decode_candidate(c: &mut Criterion) {
    let frame = candidate_frame();
    c.bench_function("decode_ice_candidate", |b| {
        b.iter(|| decode_client(black_box(&frame)).unwrap());
    });
}

fn bench_encode_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_participants_sync");
    for size in [2usize, 8, 32] {
        let event = ServerEvent::ParticipantsSync(
            (0..size)
                .map(|n| ParticipantSnapshot::new(ConnectionId::new(), format!("user-{n}")))
                .collect(),
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), &event, |b, event| {
            b.iter(|| encode_server(black_box(event)).unwrap());
        });
    }
    group.finish();
}

fn bench_encode_history(c: &mut Criterion) {
    let history = ServerEvent::ChatHistory(
        (0..200)
            .map(|n| ChatEntry::Text {
                username: format!("user-{}", n % 5),
                text: "toplantı notları birazdan paylaşılacak".to_string(),
                timestamp: Utc::now(),
            })
            .collect(),
    );
    c.bench_function("encode_chat_history_200", |b| {
        b.iter(|| encode_server(black_box(&history)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_decode_candidate,
    bench_encode_sync,
    bench_encode_history
);
criterion_main!(benches);
