//! # Throughput and handoff latency across the three channel flavors
//!
//! **Real-world scenario**: a producer thread streams values as fast as
//! possible while a consumer thread drains them, for each of the rendezvous,
//! single-slot, and ring-buffered channels, plus `std::sync::mpsc` and
//! `crossbeam-channel` as external references.
//!
//! ```text
//! ┌─────────────┐         ┌─────────────┐
//! │  Producer   │ ──────► │  Consumer   │
//! │ Thread 1    │  10K    │ Thread 2    │
//! │             │  msgs   │             │
//! └─────────────┘         └─────────────┘
//! ```
//!
//! | Channel             | Expectation                                   |
//! |----------------------|-----------------------------------------------|
//! | `UnbufferedChannel`  | slowest: every send parks until a recv arrives |
//! | `Buffered1Channel`   | one message of slack smooths out scheduling    |
//! | `BufferedNChannel`   | fastest: absorbs whole producer bursts         |

use std::sync::Arc;
use std::thread;

use chansel::{buffered_n, Buffered1Channel, UnbufferedChannel};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

const TOTAL_MESSAGES: usize = 10_000;

fn unbuffered_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    group.bench_function(BenchmarkId::new("chansel", "unbuffered"), |b| {
        b.iter(|| {
            let chan = Arc::new(UnbufferedChannel::<usize>::new());
            let producer = {
                let chan = chan.clone();
                thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        chan.send(i);
                    }
                })
            };
            for _ in 0..TOTAL_MESSAGES {
                chan.recv();
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::new("chansel", "buffered1"), |b| {
        b.iter(|| {
            let chan = Arc::new(Buffered1Channel::<usize>::new());
            let producer = {
                let chan = chan.clone();
                thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        chan.send(i);
                    }
                })
            };
            for _ in 0..TOTAL_MESSAGES {
                chan.recv();
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::new("chansel", "buffered_n_1024"), |b| {
        b.iter(|| {
            let chan = Arc::new(buffered_n::<usize>(1024));
            let producer = {
                let chan = chan.clone();
                thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        chan.send(i);
                    }
                })
            };
            for _ in 0..TOTAL_MESSAGES {
                chan.recv();
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::new("std", "sync_channel_1024"), |b| {
        b.iter(|| {
            let (tx, rx) = std::sync::mpsc::sync_channel::<usize>(1024);
            let producer = thread::spawn(move || {
                for i in 0..TOTAL_MESSAGES {
                    tx.send(i).unwrap();
                }
            });
            for _ in 0..TOTAL_MESSAGES {
                rx.recv().unwrap();
            }
            producer.join().unwrap();
        });
    });

    group.bench_function(BenchmarkId::new("crossbeam", "bounded_1024"), |b| {
        b.iter(|| {
            let (tx, rx) = crossbeam_channel::bounded::<usize>(1024);
            let producer = thread::spawn(move || {
                for i in 0..TOTAL_MESSAGES {
                    tx.send(i).unwrap();
                }
            });
            for _ in 0..TOTAL_MESSAGES {
                rx.recv().unwrap();
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

fn select_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    group.bench_function("two_arms_one_ready", |b| {
        let a = Buffered1Channel::<u32>::new();
        let b_chan = Buffered1Channel::<u32>::new();
        b.iter(|| {
            a.send(1);
            let (index, outcome) = chansel::select(&[
                chansel::SelectOp::recv(&a),
                chansel::SelectOp::recv(&b_chan),
            ]);
            criterion::black_box((index, outcome));
        });
    });

    group.finish();
}

criterion_group!(benches, unbuffered_roundtrip, select_overhead);
criterion_main!(benches);
