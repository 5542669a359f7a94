use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::CodecProvider;
use crate::error::Result;
use crate::io::{Sink, Source};
use crate::pipeline::{Pipeline, PipelineOptions, RunStats};
use crate::transform::FrameTransform;

/// Runs a pipeline on the blocking pool and lets async code stop it.
pub struct TranscodeTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<RunStats>>>,
}

impl Default for TranscodeTask {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscodeTask {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start<S, K, P, T>(
        &mut self,
        options: PipelineOptions,
        mut source: S,
        mut sink: K,
        provider: P,
        mut transform: T,
    ) where
        S: Source + Send + 'static,
        K: Sink + Send + 'static,
        P: CodecProvider + Send + 'static,
        T: FrameTransform + Send + 'static,
    {
        self.start_with(move |cancel| {
            Pipeline::new(options)
                .with_cancel_token(cancel)
                .run(&mut source, &mut sink, &provider, &mut transform)
        });
    }

    /// Runs `job` on the blocking pool with this task's token. Lets the
    /// caller open non-`Send` resources on the worker thread.
    pub fn start_with<F>(&mut self, job: F)
    where
        F: FnOnce(CancellationToken) -> Result<RunStats> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.handle = Some(tokio::task::spawn_blocking(move || job(cancel)));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run to end. Dropping the future before it completes
    /// leaves the run attached, so `wait` can be polled again.
    pub async fn wait(&mut self) -> anyhow::Result<RunStats> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("transcode task was not started"))?;
        let joined = handle.await;
        self.handle = None;
        Ok(joined??)
    }
}
