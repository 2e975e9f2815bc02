//! Synthetic end-to-end run: a fake camera delivering frames faster than a
//! deliberately slow engine can process them, to show the drop-newest
//! backpressure and the published-result flow.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use framesight::{
    map_frame, spawn, Args, ModelInputSpec, Orientation, PixelFormat, Pipeline, RawFrame,
    Resolution, SyntheticLoader, Viewport,
};

const LABELS: [&str; 2] = ["person", "bicycle"];

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let pipeline = Pipeline::new(args.pipeline_config());
    let loader = SyntheticLoader {
        spec: ModelInputSpec {
            width: 64,
            height: 64,
            ..ModelInputSpec::default()
        },
        latency: Duration::from_millis(60),
    };
    pipeline.load_model(&loader, Path::new("synthetic"))?;

    let (inlet, worker) = spawn(pipeline.clone());

    let interval = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let source = Resolution::new(160, 120);
    let frame_bytes = Arc::new(vec![128u8; 160 * 120 * 3]);
    for _ in 0..args.frames {
        let frame = RawFrame::new(
            frame_bytes.clone(),
            PixelFormat::Rgb8,
            source.width,
            source.height,
            Some(Orientation::Portrait),
        );
        inlet.on_frame(frame);
        std::thread::sleep(interval);
    }
    drop(inlet);
    worker.join().ok();

    let stats = pipeline.stats();
    info!(
        delivered = stats.delivered,
        processed = stats.processed,
        dropped = stats.dropped,
        "source outran the engine as designed"
    );

    if let Some(result) = pipeline.latest() {
        info!(
            frame = result.frame_id,
            inference_ms = result.inference.as_secs_f64() * 1000.0,
            fps = result.inference_fps(),
            "latest published result"
        );
        let viewport = Viewport::new(390.0, 844.0);
        for vb in map_frame(&result, source, viewport) {
            let label = LABELS.get(vb.class_id).copied().unwrap_or("unknown");
            println!(
                "{label} {:.2} @ ({:.0}, {:.0}) {:.0}x{:.0}",
                vb.confidence, vb.x, vb.y, vb.width, vb.height
            );
        }
    }

    Ok(())
}
