use crate::frame::Frame;

/// A per-frame processing step between decode and encode.
///
/// Scaling, resampling or filtering plug in here. Implementations must keep
/// the frame's time base; the pts may change.
pub trait FrameTransform {
    fn transform(&mut self, frame: Frame) -> anyhow::Result<Frame>;
}

/// Passes frames through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl FrameTransform for Identity {
    fn transform(&mut self, frame: Frame) -> anyhow::Result<Frame> {
        Ok(frame)
    }
}

impl<F> FrameTransform for F
where
    F: FnMut(Frame) -> anyhow::Result<Frame>,
{
    fn transform(&mut self, frame: Frame) -> anyhow::Result<Frame> {
        self(frame)
    }
}
