//! Tear a pipeline down from one task while another is blocked waiting
//! on it.

use std::sync::Arc;
use std::time::Duration;

use sluice::prelude::*;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> sluice::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = Arc::new(MockEngine::new());
    let pipeline = Arc::new(Pipeline::new(engine.clone(), "race-demo")?);
    pipeline.start()?;

    let waiter = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.wait().await }
    });

    // No EOS is ever coming; the destroy is what unblocks the waiter.
    tokio::time::sleep(Duration::from_millis(50)).await;
    pipeline.destroy()?;

    match waiter.await.expect("waiter panicked") {
        WaitOutcome::TornDown => println!("waiter released by teardown"),
        other => println!("unexpected outcome: {other:?}"),
    }
    Ok(())
}
