use std::sync::Arc;

use moodgate_core::{Frame, FramePipeline, ProcessedFrame, SessionStats};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn session thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("session thread exited")]
    ChannelClosed,
}

/// Messages sent from a frame pump to its session thread.
enum SessionRequest {
    Process {
        frame: Frame,
        reply: oneshot::Sender<ProcessedFrame>,
    },
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
}

/// Clone-safe handle to one session thread.
///
/// The session lives until every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Feed one frame and wait for its annotated counterpart.
    pub async fn process(&self, frame: Frame) -> Result<ProcessedFrame, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Process {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Snapshot of the session counters.
    pub async fn stats(&self) -> Result<SessionStats, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Stats { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn a session on a dedicated OS thread.
///
/// The thread owns the session state and processes frames strictly in
/// arrival order. The pipeline is shared with every other session.
pub fn spawn_session(
    pipeline: Arc<FramePipeline>,
    queue_depth: usize,
) -> Result<SessionHandle, EngineError> {
    let mut session = pipeline.new_session();
    let id = session.id();
    let (tx, mut rx) = mpsc::channel::<SessionRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name(format!("moodgate-session-{}", id.simple()))
        .spawn(move || {
            tracing::info!(session = %id, "session started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    SessionRequest::Process { frame, reply } => {
                        let processed = pipeline.process(&mut session, &frame);
                        // Requester gone: the result is dropped, never retried.
                        let _ = reply.send(processed);
                    }
                    SessionRequest::Stats { reply } => {
                        let _ = reply.send(session.stats());
                    }
                }
            }
            let stats = session.stats();
            tracing::info!(
                session = %id,
                frames = stats.frames,
                analyses = stats.analyses,
                real = stats.real,
                fake = stats.fake,
                failures = stats.failures,
                "session ended"
            );
        })
        .map_err(EngineError::Spawn)?;

    Ok(SessionHandle { id, tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use moodgate_core::{
        AnnotationRenderer, EmotionClassifier, EmotionLabel, LivenessGate, OverlayConfig,
        PipelineConfig, Stage,
    };
    use std::num::NonZeroU32;

    fn pipeline(interval: u32) -> Arc<FramePipeline> {
        let config = PipelineConfig {
            sampling_interval: NonZeroU32::new(interval).unwrap(),
            analysis_width: 32,
            analysis_height: 32,
            ..PipelineConfig::default()
        };
        Arc::new(
            FramePipeline::new(
                &config,
                LivenessGate::from_fn(|img| Ok(img.get_pixel(0, 0)[1] > 100)),
                EmotionClassifier::from_fn(|_| {
                    Ok([(EmotionLabel::Happy, 90.0), (EmotionLabel::Sad, 10.0)]
                        .into_iter()
                        .collect())
                }),
                AnnotationRenderer::plain(&OverlayConfig::default()),
            )
            .unwrap(),
        )
    }

    fn frame(green: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(64, 64, Rgb([0, green, 0])))
    }

    #[tokio::test]
    async fn test_session_processes_in_order() {
        let handle = spawn_session(pipeline(2), 4).unwrap();
        let mut indices = Vec::new();
        for _ in 0..6 {
            indices.push(handle.process(frame(200)).await.unwrap().index);
        }
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.frames, 6);
        assert_eq!(stats.analyses, 3);
        assert_eq!(stats.real, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sessions_run_concurrently_and_independently() {
        let shared = pipeline(1);
        let mut tasks = Vec::new();
        for green in [200u8, 10] {
            let handle = spawn_session(shared.clone(), 2).unwrap();
            tasks.push(tokio::spawn(async move {
                let mut last = None;
                for _ in 0..50 {
                    last = Some(handle.process(frame(green)).await.unwrap());
                }
                (handle.id(), last.unwrap())
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_ne!(results[0].0, results[1].0);
        assert_eq!(results[0].1.stage, Stage::Real);
        assert_eq!(results[0].1.annotated.caption, "happy (90.0%) | ✅ Real");
        assert_eq!(results[1].1.stage, Stage::Fake);
        assert_eq!(results[1].1.annotated.caption, "Fake Face (0.0%) | ❌ Fake");
        assert_eq!(results[1].1.index, 50);
    }

    #[tokio::test]
    async fn test_cloned_handles_share_session() {
        let handle = spawn_session(pipeline(10), 1).unwrap();
        let other = handle.clone();
        handle.process(frame(200)).await.unwrap();
        let out = other.process(frame(200)).await.unwrap();
        assert_eq!(out.index, 2);
        assert_eq!(handle.id(), other.id());
    }
}
