use anyhow::Context;
use av_pipeline::ffmpeg::{FfmpegCodecProvider, FfmpegSink, FfmpegSource};
use av_pipeline::{Identity, Pipeline, PipelineError, TranscodeTask};

mod config;

use config::{DEFAULT_CONFIG_PATH, RunConfig};

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .filter_module("av_pipeline", log::LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    av_pipeline::ffmpeg::init()?;

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = RunConfig::load(&path)?;
    let options = config.to_options();
    log::info!(
        "{} -> {} ({:?}, trim {:?}..{:?})",
        config.input,
        config.output,
        options.mode,
        options.trim.start(),
        options.trim.end()
    );

    let mut task = TranscodeTask::new();
    let (input, output) = (config.input.clone(), config.output.clone());
    // ffmpeg contexts are opened on the worker thread that drives them
    task.start_with(move |cancel| {
        let mut source = FfmpegSource::open(&input)?;
        let mut sink = FfmpegSink::open(&output).map_err(PipelineError::SinkOpenFailed)?;
        let provider = FfmpegCodecProvider::new().with_global_header(sink.needs_global_header());
        Pipeline::new(options)
            .with_cancel_token(cancel)
            .run(&mut source, &mut sink, &provider, &mut Identity)
    });

    let cancel = task.cancel_token();
    let stats = loop {
        tokio::select! {
            stats = task.wait() => break stats,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                log::info!("interrupted, finishing the output");
                cancel.cancel();
            },
        }
    }
    .with_context(|| format!("transcoding {} to {}", config.input, config.output))?;

    if stats.cancelled {
        log::warn!("{} ends early, the run was interrupted", config.output);
    }
    for (stream, written) in &stats.written_per_stream {
        log::info!("output stream {}: {} packets", stream, written);
    }
    Ok(())
}
