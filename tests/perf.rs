#![cfg(all(feature = "memory-store", feature = "aes-cipher"))]

use futures::executor::block_on;
use kkit_auth::{AesCipher, AuthRegistry, Consumer, MemorySessionStore, RoleFactory};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

const REPEATS: usize = 5;

fn benchmark_sync<F>(name: &str, iterations: usize, mut op: F)
where
    F: FnMut(),
{
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        for _ in 0..iterations {
            op();
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / iterations as f64;
    let ops_per_sec = iterations as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (iters={iterations}, repeats={REPEATS})"
    );
}

fn benchmark_parallel<F>(name: &str, threads: usize, iterations_per_thread: usize, op_factory: F)
where
    F: Fn() -> Box<dyn FnMut() + Send> + Send + Sync + 'static,
{
    let op_factory = Arc::new(op_factory);
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        let mut joins = Vec::with_capacity(threads);
        for _ in 0..threads {
            let factory = Arc::clone(&op_factory);
            joins.push(std::thread::spawn(move || {
                let mut op = factory();
                for _ in 0..iterations_per_thread {
                    op();
                }
            }));
        }
        for join in joins {
            join.join().expect("thread panicked");
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ops = threads * iterations_per_thread;
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / total_ops as f64;
    let ops_per_sec = total_ops as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (threads={threads}, total_ops={total_ops}, repeats={REPEATS})"
    );
}

fn setup_registry(role_count: usize) -> (AuthRegistry, Consumer) {
    let registry = AuthRegistry::builder(MemorySessionStore::new(), AesCipher::new())
        .temp_account("perf", "secret")
        .role_check(move |_username, factory: &RoleFactory| {
            Ok((0..role_count)
                .map(|i| {
                    factory.new_role(format!("role_{i}")).add_resource_group([factory
                        .new_resource_group(format!("group_{i}"))
                        .add([factory.new_resource(format!("res_{i}"), format!("/res/{i}"))])])
                })
                .collect())
        })
        .build()
        .unwrap();
    let consumer = block_on(registry.login().password("perf", "secret")).unwrap();
    (registry, consumer)
}

#[test]
fn role_swap_is_never_torn_under_concurrent_reads() {
    let (registry, consumer) = setup_registry(16);
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let consumer = consumer.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let roles = consumer.roles();
                    assert_eq!(roles.len(), 16);
                    assert!(consumer.resource_exist(["/res/0", "/res/15"]));
                }
            })
        })
        .collect();

    for _ in 0..1_000 {
        registry.refresh_role(&consumer).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader panicked");
    }
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_login_and_permission_checks() {
    let iterations = 200_000;

    let (registry, consumer) = setup_registry(1);
    benchmark_sync("resource_exist_single_role", iterations, || {
        black_box(consumer.resource_exist(["/res/0"]));
    });

    let (_registry, wide) = setup_registry(128);
    benchmark_sync("resource_exist_128_roles", iterations / 4, || {
        black_box(wide.resource_exist(["/res/127"]));
    });

    let token = block_on(consumer.token()).unwrap();
    benchmark_sync("check_token", iterations / 4, || {
        black_box(block_on(consumer.check_token(&token)));
    });

    benchmark_sync("single_client_relogin", iterations / 20, || {
        let consumer = block_on(registry.login().password("perf", "secret")).unwrap();
        black_box(consumer);
    });

    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let iterations_per_thread = 5_000;

    let next = Arc::new(AtomicUsize::new(0));
    let tags = Arc::clone(&next);
    let registry = Arc::new(
        AuthRegistry::builder(MemorySessionStore::new(), AesCipher::new())
            .allow_many_client(move || format!("#{}", tags.fetch_add(1, Ordering::Relaxed)))
            .build()
            .unwrap(),
    );
    let registry_for_parallel = Arc::clone(&registry);
    benchmark_parallel(
        "multi_client_login_parallel",
        threads,
        iterations_per_thread,
        move || {
            let registry = Arc::clone(&registry_for_parallel);
            Box::new(move || {
                let consumer = block_on(
                    registry
                        .login()
                        .use_password_checker(|_, _| Ok(()))
                        .password("perf", "secret"),
                )
                .unwrap();
                block_on(consumer.out_login()).unwrap();
            })
        },
    );
    assert!(block_on(registry.get_all_consumer()).is_empty());
    assert!(next.load(Ordering::Relaxed) > 0);
}
