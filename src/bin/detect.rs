//! Run the pipeline over an ONNX model: synthetic gray frames in, decoded
//! detections out. Mostly useful for checking that a model's output head
//! matches the coordinates/confidence contract.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;

use framesight::ort_engine::OrtLoader;
use framesight::{spawn, Args, PixelFormat, Pipeline, RawFrame};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if args.model.is_empty() {
        bail!("--model <path.onnx> is required");
    }

    let pipeline = Pipeline::new(args.pipeline_config());
    let loader = OrtLoader::default();
    pipeline.load_model(&loader, Path::new(&args.model))?;

    let (inlet, worker) = spawn(pipeline.clone());
    let interval = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let frame_bytes = Arc::new(vec![114u8; 1280 * 720 * 3]);
    for _ in 0..args.frames {
        inlet.on_frame(RawFrame::new(
            frame_bytes.clone(),
            PixelFormat::Rgb8,
            1280,
            720,
            None,
        ));
        std::thread::sleep(interval);
    }
    drop(inlet);
    worker.join().ok();

    let stats = pipeline.stats();
    info!(
        delivered = stats.delivered,
        processed = stats.processed,
        failed = stats.failed,
        dropped = stats.dropped,
        "run complete"
    );
    if let Some(result) = pipeline.latest() {
        for det in &result.detections {
            println!(
                "class {} {:.2} @ ({:.3}, {:.3}) {:.3}x{:.3}",
                det.class_id,
                det.confidence,
                det.bbox.x,
                det.bbox.y,
                det.bbox.width,
                det.bbox.height
            );
        }
    }
    Ok(())
}
