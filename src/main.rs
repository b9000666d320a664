// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use seqflow::config::{load_and_validate_config, Config, StreamRuntime};
use seqflow::engine::{
    buffer, concat2, delay, from_iter, inspect, map, range, to_list_async, zip, Context,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seqflow=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("failed to load config '{}'", path))?,
        None => Config::default(),
    };
    let runtime = StreamRuntime::from_config(&config)?;

    println!("🚀 seqflow stream engine demo");
    println!("═════════════════════════════");
    println!();

    let start = Instant::now();
    run_scenarios(&runtime).await?;
    println!("\n🎉 All scenarios finished in {:?}", start.elapsed());
    Ok(())
}

async fn run_scenarios(runtime: &StreamRuntime) -> Result<()> {
    let doubled = to_list_async(&map(range(1, 3), |x| x * 2), &Context::new()).await?;
    println!("map(range(1, 3), x * 2)          => {:?}", doubled);

    let joined = concat2(from_iter(vec![1, 2]), from_iter(vec![3, 4]));
    println!(
        "concat([1, 2], [3, 4])            => {:?}",
        to_list_async(&joined, &Context::new()).await?
    );

    let merged = runtime.merge_n(vec![
        delay(from_iter(vec![1]), Duration::from_millis(10)),
        from_iter(vec![2]),
    ]);
    let merged: HashSet<i32> = to_list_async(&merged, &Context::new()).await?.into_iter().collect();
    println!("merge([1] after 10ms, [2])        => {:?}", merged);

    let pairs = zip(from_iter(vec![1, 2, 3]), from_iter(vec!["a", "b"]));
    println!(
        "zip([1, 2, 3], [a, b])            => {:?}",
        to_list_async(&pairs, &Context::new()).await?
    );

    let chunks = buffer(range(1, 10), 3);
    println!(
        "buffer(range(1, 10), 3)           => {:?}",
        to_list_async(&chunks, &Context::new()).await?
    );

    let reads = Arc::new(AtomicUsize::new(0));
    let counter = reads.clone();
    let source = inspect(from_iter(vec![1, 2, 3]), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let outputs = runtime.broadcast(source, 2);
    let ctx = Context::new();
    let (a, b) = tokio::join!(
        to_list_async(&outputs[0], &ctx),
        to_list_async(&outputs[1], &ctx)
    );
    println!(
        "broadcast([1, 2, 3], 2)           => {:?} / {:?} ({} source reads)",
        a?,
        b?,
        reads.load(Ordering::SeqCst)
    );

    Ok(())
}
