use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strand::{Executor, ExecutorConfig, StrandError};

fn executor(frames: usize) -> Option<Executor> {
    let config = ExecutorConfig::new().frame_count(frames).reactor_capacity(64);
    match Executor::new(config) {
        Ok(exec) => Some(exec),
        Err(StrandError::PrimitiveFailure(code)) => {
            eprintln!("skipping: io_uring unavailable (errno {})", code);
            None
        }
        Err(e) => panic!("executor: {}", e),
    }
}

fn bench_spawn_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_run");

    for tasks in [8usize, 64, 512] {
        let Some(exec) = executor(tasks) else { return };
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::new("immediate", tasks), &tasks, |b, &tasks| {
            b.iter(|| {
                for i in 0..tasks {
                    exec.spawn(move |_| {
                        black_box(i);
                    })
                    .unwrap();
                }
                exec.run().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_wait_zero(c: &mut Criterion) {
    let Some(exec) = executor(64) else { return };

    c.bench_function("wait_zero_x32", |b| {
        b.iter(|| {
            for _ in 0..32 {
                exec.spawn(|e| e.async_wait(Duration::ZERO).unwrap()).unwrap();
            }
            exec.run().unwrap();
        });
    });
}

fn bench_socket_round_trip(c: &mut Criterion) {
    const ROUNDS: usize = 256;
    let Some(exec) = executor(4) else { return };
    let mut group = c.benchmark_group("socket_round_trip");

    for size in [64usize, 4096] {
        let (a, b) = UnixStream::pair().unwrap();
        let (pfd, qfd) = (a.as_raw_fd(), b.as_raw_fd());

        group.throughput(Throughput::Elements(ROUNDS as u64));
        group.bench_with_input(BenchmarkId::new("pingpong", size), &size, |bench, &size| {
            bench.iter(|| {
                exec.spawn(move |e| {
                    let msg = vec![7u8; size];
                    let mut buf = vec![0u8; size];
                    for _ in 0..ROUNDS {
                        e.async_write_all(pfd, &msg).unwrap();
                        let mut got = 0;
                        while got < size {
                            got += e.async_read(pfd, &mut buf[got..]).unwrap();
                        }
                    }
                })
                .unwrap();
                exec.spawn(move |e| {
                    let mut buf = vec![0u8; size];
                    for _ in 0..ROUNDS {
                        let mut got = 0;
                        while got < size {
                            got += e.async_read(qfd, &mut buf[got..]).unwrap();
                        }
                        e.async_write_all(qfd, &buf).unwrap();
                    }
                })
                .unwrap();
                exec.run().unwrap();
            });
        });
        drop((a, b));
    }

    group.finish();
}

criterion_group!(benches, bench_spawn_run, bench_wait_zero, bench_socket_round_trip);
criterion_main!(benches);
