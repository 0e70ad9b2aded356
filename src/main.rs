use async_workq::{Config, WorkQueue, WorkQueueInner};
use crossbeam::channel;
use std::time::Instant;
use tokio::runtime::Builder;
use tokio::time::Duration;


const ITERATIONS: usize = 25;

#[derive(Debug)]
struct Power {
    value: u64,
    exponent: u32,
}

async fn submit_requests(queue: WorkQueue<Power>, mut seed: u64) {
    for _ in 0..ITERATIONS {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let request = Power {
            value: seed % 20,
            exponent: (seed >> 32) as u32 % 7,
        };
        queue.add(request).expect("add request");
        tokio::time::sleep(Duration::from_millis(seed % 5)).await;
    }
}

fn main() {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let started = Instant::now();
        let (results, computed) = channel::unbounded();

        let queue = WorkQueueInner::with_config(
            Config {
                parallelism: 4,
                ..Config::default()
            },
            move |request: Power| {
                let results = results.clone();
                async move {
                    let power = request.value.pow(request.exponent);
                    println!("engine: {}^{} = {}", request.value, request.exponent, power);
                    let _ = results.send(power);
                }
            },
        )
        .expect("create work queue");

        // Two producers issuing jittered requests, like a pair of client
        // threads would.
        let a = tokio::spawn(submit_requests(queue.clone(), 0x9e3779b97f4a7c15));
        let b = tokio::spawn(submit_requests(queue.clone(), 0xcafef00dd15ea5e5));
        let _ = tokio::join!(a, b);

        queue.shutdown().await.expect("shutdown");

        let processed = computed.try_iter().count();
        let metrics = queue.metrics();
        println!(
            "{} workers processed {} requests in {:?}",
            metrics.spawned_workers,
            processed,
            started.elapsed()
        );
    });
}
