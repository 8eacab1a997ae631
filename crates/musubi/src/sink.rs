//! Progress sinks shipped with the engine.

use musubi_core::{Phase, ProgressNotice, ProgressSink};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A sink that sends notices to an unbounded channel.
///
/// Use this to render live progress from another task. Send errors are
/// ignored: the run never depends on the receiver being consumed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressNotice>,
}

impl ChannelSink {
    /// Creates a sink from an existing sender.
    pub fn new(sender: mpsc::UnboundedSender<ProgressNotice>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn notify(&self, notice: ProgressNotice) {
        // Receiver may have been dropped
        let _ = self.sender.send(notice);
    }
}

/// A sink that forwards notices to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn notify(&self, notice: ProgressNotice) {
        match notice.phase {
            Phase::Failed => warn!(
                run_id = %notice.run_id,
                step = %notice.step,
                phase = %notice.phase,
                "{}",
                notice.message
            ),
            _ => info!(
                run_id = %notice.run_id,
                step = %notice.step,
                phase = %notice.phase,
                "{}",
                notice.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musubi_core::{RunId, StepName};

    fn notice(phase: Phase) -> ProgressNotice {
        ProgressNotice {
            run_id: RunId::new(),
            step: StepName::new("parse"),
            phase,
            message: String::new(),
        }
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, mut receiver) = ChannelSink::channel();
        sink.notify(notice(Phase::Started));
        sink.notify(notice(Phase::Completed));

        let first = tokio_test::block_on(receiver.recv()).expect("first notice");
        let second = tokio_test::block_on(receiver.recv()).expect("second notice");
        assert_eq!(first.phase, Phase::Started);
        assert_eq!(second.phase, Phase::Completed);
    }

    #[test]
    fn test_channel_sink_ignores_dropped_receiver() {
        let (sink, receiver) = ChannelSink::channel();
        drop(receiver);
        sink.notify(notice(Phase::Failed));
    }

    #[test]
    fn test_tracing_sink_accepts_every_phase() {
        for phase in [Phase::Started, Phase::Completed, Phase::Failed, Phase::Progress] {
            TracingSink.notify(notice(phase));
        }
    }
}
