//! `LoopbackConnector`: offline stand-in for the remote voice service.
//!
//! Reports "opened" on the next scheduler turn and echoes every outbound
//! 16 kHz frame back as a 24 kHz model frame, so the full capture → session →
//! playback path can be exercised without network access or credentials.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{
    AgentConfig, SessionEvent, SessionEventKind, SessionEventSender, VoiceConnector, VoiceSession,
};
use crate::audio::resample::RateConverter;
use crate::buffering::{AudioFrame, EncodedFrame};
use crate::error::{Result, VocallError};
use crate::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

const ECHO_QUEUE_CAP: usize = 8;
const ECHO_RESAMPLE_CHUNK: usize = 1_024;

#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackConnector;

impl VoiceConnector for LoopbackConnector {
    fn open(
        &self,
        agent: &AgentConfig,
        call_id: u64,
        events: SessionEventSender,
    ) -> Result<Box<dyn VoiceSession>> {
        let converter =
            RateConverter::new(CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE, ECHO_RESAMPLE_CHUNK)?;
        let (tx, rx) = mpsc::channel(ECHO_QUEUE_CAP);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        debug!(call_id, agent = %agent.id, "opening loopback session");
        tokio::spawn(echo(call_id, events, converter, rx, shutdown_rx));
        Ok(Box::new(LoopbackSession {
            outbound: tx,
            shutdown: Some(shutdown_tx),
        }))
    }
}

pub struct LoopbackSession {
    outbound: mpsc::Sender<EncodedFrame>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl VoiceSession for LoopbackSession {
    fn send(&self, frame: EncodedFrame) -> Result<()> {
        if self.shutdown.is_none() {
            return Err(VocallError::SessionNotOpen);
        }
        self.outbound
            .try_send(frame)
            .map_err(|_| VocallError::Channel("loopback queue full".into()))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        Ok(())
    }
}

async fn echo(
    call_id: u64,
    events: SessionEventSender,
    mut converter: RateConverter,
    mut inbound: mpsc::Receiver<EncodedFrame>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let emit = |kind| {
        let _ = events.send(SessionEvent { call_id, kind });
    };
    tokio::task::yield_now().await;
    emit(SessionEventKind::Opened);

    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            frame = inbound.recv() => {
                let Some(frame) = frame else { return };
                let decoded = match frame.decode() {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(call_id, "loopback dropped frame: {e}");
                        continue;
                    }
                };
                let upsampled = converter.process(decoded.samples());
                if upsampled.is_empty() {
                    continue;
                }
                let echoed = AudioFrame::new(upsampled, PLAYBACK_SAMPLE_RATE);
                emit(SessionEventKind::Frame(EncodedFrame::encode(&echoed)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_then_echoes_at_playback_rate() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let mut session = LoopbackConnector
            .open(&AgentConfig::new("echo", "Echo", ""), 7, events)
            .expect("open loopback");

        let opened = rx.recv().await.expect("opened event");
        assert_eq!(opened.call_id, 7);
        assert_eq!(opened.kind, SessionEventKind::Opened);

        let captured = AudioFrame::new(vec![0.1; 4_096], CAPTURE_SAMPLE_RATE);
        session.send(EncodedFrame::encode(&captured)).expect("send");

        let echoed = rx.recv().await.expect("frame event");
        let SessionEventKind::Frame(frame) = echoed.kind else {
            panic!("expected frame, got {:?}", echoed.kind);
        };
        assert_eq!(frame.sample_rate, PLAYBACK_SAMPLE_RATE);
        assert!(!frame.decode().unwrap().is_empty());

        session.close().unwrap();
        session.close().unwrap();
        assert!(session.send(EncodedFrame::encode(&captured)).is_err());
    }
}
