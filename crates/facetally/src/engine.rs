use facetally_core::detector::largest_face;
use facetally_core::samples::SampleError;
use facetally_core::{crop_face, FaceDetector, FaceRect, SampleStore, TrainedModel, Verdict};
use facetally_hw::{CameraError, FrameSource};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::preview;

/// Frames discarded after opening a camera so exposure can settle.
const WARMUP_FRAMES: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("sample error: {0}")]
    Samples(#[from] SampleError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] facetally_core::lbph::LbphError),
    #[error("preview error: {0}")]
    Preview(#[from] image::ImageError),
    #[error("frame {width}x{height} has {len} bytes")]
    InvalidFrame { width: u32, height: u32, len: usize },
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("no trained model loaded")]
    NotTrained,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Opens a frame source by camera index.
pub type SourceOpener =
    Box<dyn FnMut(u32) -> Result<Box<dyn FrameSource>, CameraError> + Send>;

/// Everything the engine thread owns.
pub struct EngineParts {
    pub source: Box<dyn FrameSource>,
    pub opener: SourceOpener,
    pub detector: Box<dyn FaceDetector>,
    pub samples: SampleStore,
    pub threshold: f64,
    pub preview_path: Option<PathBuf>,
    pub sample_interval: Duration,
    pub max_enroll_frames: usize,
}

/// Result of an enrollment capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollResult {
    pub samples: usize,
    pub frames_tried: usize,
}

/// One face in a recognized frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceOutcome {
    pub rect: FaceRect,
    pub verdict: Verdict,
}

impl FaceOutcome {
    /// Name shown next to the face, with the distance when there is one.
    pub fn caption(&self) -> String {
        match &self.verdict {
            Verdict::Known { name, distance } => format!("{name} ({distance:.1})"),
            Verdict::Unknown {
                distance: Some(distance),
            } => format!("Unknown ({distance:.1})"),
            Verdict::Unknown { distance: None } => "Unknown".to_string(),
        }
    }
}

/// Everything recognized in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub sequence: u32,
    pub faces: Vec<FaceOutcome>,
}

impl FrameReport {
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().filter_map(|f| match &f.verdict {
            Verdict::Known { name, .. } => Some(name.as_str()),
            Verdict::Unknown { .. } => None,
        })
    }
}

/// Messages sent from the panel to the engine thread.
enum EngineRequest {
    Enroll {
        name: String,
        count: usize,
        progress: Option<mpsc::UnboundedSender<usize>>,
        reply: oneshot::Sender<Result<EnrollResult, EngineError>>,
    },
    Recognize {
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
    SwitchCamera {
        index: u32,
        reply: oneshot::Sender<Result<u32, EngineError>>,
    },
    SetModel {
        model: Option<TrainedModel>,
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture `count` face samples for `name` into the sample folder.
    pub async fn enroll(&self, name: &str, count: usize) -> Result<EnrollResult, EngineError> {
        self.enroll_with_progress(name, count, None).await
    }

    /// Like `enroll`, sending the running sample count after every saved sample.
    pub async fn enroll_with_progress(
        &self,
        name: &str,
        count: usize,
        progress: Option<mpsc::UnboundedSender<usize>>,
    ) -> Result<EnrollResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll {
            name: name.to_string(),
            count,
            progress,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Grab one frame, detect and recognize every face in it.
    pub async fn recognize(&self) -> Result<FrameReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Recognize { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Reopen the capture on camera `index`. The old camera stays active on failure.
    pub async fn switch_camera(&self, index: u32) -> Result<u32, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::SwitchCamera { index, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Replace (or clear) the model used by `recognize`.
    pub async fn set_model(&self, model: Option<TrainedModel>) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::SetModel { model, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

struct Engine {
    parts: EngineParts,
    model: Option<TrainedModel>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the frame source and detector and serves requests until
/// every handle is dropped.
pub fn spawn_engine(parts: EngineParts) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut engine = Engine { parts, model: None };
    engine.warmup();

    std::thread::Builder::new()
        .name("facetally-engine".into())
        .spawn(move || {
            tracing::info!(camera = engine.parts.source.index(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        name,
                        count,
                        progress,
                        reply,
                    } => {
                        let _ = reply.send(engine.enroll(&name, count, progress.as_ref()));
                    }
                    EngineRequest::Recognize { reply } => {
                        let _ = reply.send(engine.recognize());
                    }
                    EngineRequest::SwitchCamera { index, reply } => {
                        let _ = reply.send(engine.switch_camera(index));
                    }
                    EngineRequest::SetModel { model, reply } => {
                        tracing::debug!(loaded = model.is_some(), "engine model replaced");
                        engine.model = model;
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

impl Engine {
    fn warmup(&mut self) {
        for _ in 0..WARMUP_FRAMES {
            let _ = self.parts.source.grab();
        }
    }

    fn grab_gray(&mut self) -> Result<(image::GrayImage, u32, bool), EngineError> {
        let frame = self.parts.source.grab()?;
        let (width, height, len) = (frame.width, frame.height, frame.data.len());
        let sequence = frame.sequence;
        let is_dark = frame.is_dark;
        let gray = frame
            .to_gray_image()
            .ok_or(EngineError::InvalidFrame { width, height, len })?;
        Ok((gray, sequence, is_dark))
    }

    /// Keep the largest face of each frame until `count` samples are saved or
    /// `max_enroll_frames` frames have been tried.
    fn enroll(
        &mut self,
        name: &str,
        count: usize,
        progress: Option<&mpsc::UnboundedSender<usize>>,
    ) -> Result<EnrollResult, EngineError> {
        SampleStore::validate_name(name)?;
        let mut index = self.parts.samples.next_index(name)?;
        let mut saved = 0usize;
        let mut tried = 0usize;

        while saved < count && tried < self.parts.max_enroll_frames {
            tried += 1;
            let (gray, sequence, is_dark) = match self.grab_gray() {
                Ok(f) => f,
                Err(EngineError::Camera(e)) => {
                    tracing::warn!(error = %e, "enroll: frame capture failed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if is_dark {
                tracing::debug!(seq = sequence, "enroll: skipping dark frame");
                continue;
            }

            let faces = self.parts.detector.detect(&gray);
            let Some(face) = largest_face(&faces) else {
                continue;
            };
            let Some(crop) = crop_face(&gray, &face) else {
                continue;
            };

            self.parts.samples.write_sample(name, index, &crop)?;
            index += 1;
            saved += 1;
            tracing::debug!(name, saved, count, "enroll: captured sample");
            if let Some(tx) = progress {
                let _ = tx.send(saved);
            }

            if saved < count && !self.parts.sample_interval.is_zero() {
                std::thread::sleep(self.parts.sample_interval);
            }
        }

        if saved == 0 {
            return Err(EngineError::NoFaceDetected);
        }
        tracing::info!(name, samples = saved, frames = tried, "enroll: capture finished");
        Ok(EnrollResult {
            samples: saved,
            frames_tried: tried,
        })
    }

    fn recognize(&mut self) -> Result<FrameReport, EngineError> {
        if self.model.is_none() {
            return Err(EngineError::NotTrained);
        }
        let (gray, sequence, _) = self.grab_gray()?;
        let faces = self.parts.detector.detect(&gray);

        let mut outcomes = Vec::with_capacity(faces.len());
        if let Some(model) = &self.model {
            for rect in faces {
                let Some(crop) = crop_face(&gray, &rect) else {
                    continue;
                };
                let prediction = match model.recognizer.predict(&crop) {
                    Ok(p) => Some(p),
                    Err(facetally_core::lbph::LbphError::ImageTooSmall { .. }) => None,
                    Err(e) => return Err(e.into()),
                };
                let verdict = Verdict::judge(prediction, &model.labels, self.parts.threshold);
                outcomes.push(FaceOutcome { rect, verdict });
            }
        }

        if let Some(path) = &self.parts.preview_path {
            preview::annotate(&gray, &outcomes).save(path)?;
        }

        Ok(FrameReport {
            sequence,
            faces: outcomes,
        })
    }

    fn switch_camera(&mut self, index: u32) -> Result<u32, EngineError> {
        let source = (self.parts.opener)(index)?;
        tracing::info!(from = self.parts.source.index(), to = index, "camera switched");
        self.parts.source = source;
        self.warmup();
        Ok(index)
    }
}
