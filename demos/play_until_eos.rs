//! Build a pipeline from a launch description, start it, and wait for
//! end-of-stream.

use std::sync::Arc;

use sluice::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> sluice::Result<()> {
    tracing_subscriber::fmt::init();

    let engine = Arc::new(MockEngine::new());
    let pipeline = Pipeline::from_description(
        engine.clone(),
        "testsrc count=3 ! passthrough ! nullsink",
    )?;
    pipeline.start()?;

    // A real engine posts EOS when the source runs dry; the mock has to
    // be told.
    engine.emit_eos(pipeline.handle());

    match pipeline.wait().await {
        WaitOutcome::Eos => println!("end of stream"),
        WaitOutcome::Error(e) => eprintln!("pipeline error: {e}"),
        WaitOutcome::TornDown => println!("torn down before finishing"),
    }

    pipeline.destroy()
}
