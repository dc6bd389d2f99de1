//! Button panel: the actions a user can trigger and the dialogs they raise.

use facetally_core::samples::SampleError;
use facetally_core::LabelMap;
use image::GrayImage;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle, FrameReport};
use crate::library::{Library, LibraryError};
use crate::preview;

/// Dialog and display surface the panel talks to.
pub trait Frontend {
    /// Text prompt. `None` when cancelled.
    fn ask_string(&mut self, title: &str, prompt: &str) -> Option<String>;
    fn ask_yes_no(&mut self, title: &str, question: &str) -> bool;
    fn info(&mut self, title: &str, message: &str);
    fn warning(&mut self, title: &str, message: &str);
    fn error(&mut self, title: &str, message: &str);
    /// Show the preview of `name` and ask whether to delete them.
    fn confirm_delete(&mut self, name: &str, preview: &Path, thumbnail: &GrayImage) -> bool;
    /// Called for every recognized frame.
    fn show_frame(&mut self, _report: &FrameReport) {}
    /// Called whenever the status line or stored-face count changes.
    fn status_changed(&mut self, _status: &str, _stored_faces: i64) {}
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Totals for one recognition run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionSummary {
    pub frames: u64,
    pub recognitions: u64,
    pub capture_errors: u64,
}

pub struct Panel<F: Frontend> {
    config: Config,
    engine: EngineHandle,
    library: Library,
    frontend: F,
    labels: LabelMap,
    trained: bool,
    tracking: bool,
    camera: u32,
    status: String,
}

impl<F: Frontend> Panel<F> {
    /// Load any saved model into the engine and start idle.
    pub async fn new(
        config: Config,
        engine: EngineHandle,
        library: Library,
        frontend: F,
    ) -> Result<Self, PanelError> {
        let camera = config.camera_index;
        let mut panel = Self {
            config,
            engine,
            library,
            frontend,
            labels: LabelMap::default(),
            trained: false,
            tracking: false,
            camera,
            status: "Status: Idle".to_string(),
        };
        let model = panel.library.load_model()?;
        if model.is_some() {
            tracing::info!("loaded saved model");
        }
        panel.install_model(model).await?;
        panel.refresh()?;
        Ok(panel)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn camera(&self) -> u32 {
        self.camera
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn face_count_label(&self) -> Result<String, PanelError> {
        Ok(format!(
            "Stored Faces: {}",
            self.library.store.face_count().map_err(LibraryError::from)?
        ))
    }

    fn set_status(&mut self, status: impl Into<String>) -> Result<(), PanelError> {
        self.status = status.into();
        self.refresh()
    }

    fn refresh(&mut self) -> Result<(), PanelError> {
        let count = self.library.store.face_count().map_err(LibraryError::from)?;
        self.frontend.status_changed(&self.status, count);
        Ok(())
    }

    async fn install_model(
        &mut self,
        model: Option<facetally_core::TrainedModel>,
    ) -> Result<(), PanelError> {
        match &model {
            Some(m) => {
                self.labels = m.labels.clone();
                self.trained = true;
            }
            None => {
                self.labels.clear();
                self.trained = false;
            }
        }
        self.engine.set_model(model).await?;
        Ok(())
    }

    /// "Start Recognition": run the capture loop until `stop` resolves or
    /// `max_ticks` frames have been processed.
    pub async fn start_recognition(
        &mut self,
        stop: impl Future<Output = ()>,
        max_ticks: Option<u64>,
    ) -> Result<Option<RecognitionSummary>, PanelError> {
        if !self.trained {
            self.frontend.warning("Not Trained", "Please add a face first!");
            return Ok(None);
        }
        self.tracking = true;
        self.set_status("Status: Recognizing Faces")?;

        let summary = self.capture_loop(stop, max_ticks).await;
        self.stop()?;
        let summary = summary?;
        tracing::info!(
            frames = summary.frames,
            recognitions = summary.recognitions,
            "recognition stopped"
        );
        Ok(Some(summary))
    }

    async fn capture_loop(
        &mut self,
        stop: impl Future<Output = ()>,
        max_ticks: Option<u64>,
    ) -> Result<RecognitionSummary, PanelError> {
        let mut summary = RecognitionSummary::default();
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(stop);

        while self.tracking {
            if max_ticks.is_some_and(|max| summary.frames >= max) {
                break;
            }
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = interval.tick() => {}
            }

            let report = match self.engine.recognize().await {
                Ok(report) => report,
                Err(EngineError::Camera(e)) => {
                    tracing::warn!(error = %e, "frame capture failed");
                    summary.capture_errors += 1;
                    summary.frames += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            summary.frames += 1;

            for name in report.known_names() {
                self.library
                    .store
                    .increment_recognition(name)
                    .map_err(LibraryError::from)?;
                summary.recognitions += 1;
            }
            self.frontend.show_frame(&report);
        }
        Ok(summary)
    }

    /// "Stop"
    pub fn stop(&mut self) -> Result<(), PanelError> {
        self.tracking = false;
        self.set_status("Status: Stopped")
    }

    /// "Add New Face": ask for a name, capture samples, record and retrain.
    pub async fn add_new_face(&mut self) -> Result<(), PanelError> {
        let name = self
            .frontend
            .ask_string("Add Face", "Enter user name:")
            .map(|n| n.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            self.frontend.info("Cancelled", "No name entered.");
            return Ok(());
        }
        self.enroll(&name).await
    }

    /// Capture and register `name` without asking for it.
    pub async fn enroll(&mut self, name: &str) -> Result<(), PanelError> {
        let count = self.config.samples_per_enroll;
        self.set_status(format!("Status: Capturing {name} 0/{count}"))?;

        let engine = self.engine.clone();
        let (tx, mut progress) = mpsc::unbounded_channel();
        let capture = engine.enroll_with_progress(name, count, Some(tx));
        tokio::pin!(capture);
        let outcome = loop {
            tokio::select! {
                Some(saved) = progress.recv() => {
                    self.set_status(format!("Status: Capturing {name} {saved}/{count}"))?;
                }
                outcome = &mut capture => break outcome,
            }
        };
        while let Ok(saved) = progress.try_recv() {
            self.set_status(format!("Status: Capturing {name} {saved}/{count}"))?;
        }

        let result = match outcome {
            Ok(result) => result,
            Err(EngineError::NoFaceDetected) => {
                self.frontend
                    .error("No Face", &format!("No face captured for {name}."));
                return self.set_status("Status: Idle");
            }
            Err(EngineError::Samples(SampleError::InvalidName(_))) => {
                self.frontend
                    .error("Invalid Name", &format!("'{name}' cannot be used as a name."));
                return self.set_status("Status: Idle");
            }
            Err(e) => {
                self.set_status("Status: Idle")?;
                return Err(e.into());
            }
        };

        self.library.register(name)?;
        let model = self.library.retrain()?;
        self.install_model(model).await?;
        tracing::info!(name, samples = result.samples, "face enrolled");

        self.set_status("Status: Idle")?;
        self.frontend
            .info("Done", &format!("Face data saved for {name}"));
        Ok(())
    }

    /// "Delete Stored Faces": one person (with preview) or everything.
    pub async fn delete_faces(&mut self) -> Result<(), PanelError> {
        let one = self.frontend.ask_yes_no(
            "Delete Faces",
            "Do you want to delete a specific person?\n\n\
             Click 'Yes' to delete one person or 'No' to delete all.",
        );
        if one {
            self.delete_one().await
        } else {
            if self.frontend.ask_yes_no(
                "Confirm Delete",
                "Are you sure you want to delete ALL stored faces?",
            ) {
                self.delete_everything().await?;
                self.frontend
                    .info("Deleted", "All stored faces and records have been removed.");
            }
            self.set_status("Status: Faces updated")
        }
    }

    async fn delete_one(&mut self) -> Result<(), PanelError> {
        let names = self.library.store.names().map_err(LibraryError::from)?;
        if names.is_empty() {
            self.frontend
                .info("No Records", "No faces found in the database.");
            return Ok(());
        }

        let prompt = format!(
            "Enter the name to delete:\n\nAvailable: {}",
            names.join(", ")
        );
        let name = self
            .frontend
            .ask_string("Delete Person", &prompt)
            .map(|n| n.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            self.frontend.info("Cancelled", "No name entered.");
            return Ok(());
        }
        if !names.contains(&name) {
            self.frontend
                .error("Not Found", &format!("No record found for '{name}'."));
            return Ok(());
        }

        let Some(preview_path) = self.library.samples.preview(&name).map_err(LibraryError::from)?
        else {
            self.frontend
                .warning("No Image", &format!("No stored image found for {name}."));
            return Ok(());
        };
        let thumb = match preview::thumbnail(&preview_path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, path = %preview_path.display(), "unreadable preview");
                self.frontend
                    .warning("No Image", &format!("No stored image found for {name}."));
                return Ok(());
            }
        };

        if !self.frontend.confirm_delete(&name, &preview_path, &thumb) {
            self.frontend.info("Cancelled", "Deletion cancelled.");
            return Ok(());
        }

        let removed = self.delete_person(&name).await?;
        self.frontend.info(
            "Deleted",
            &format!("Removed {removed} image(s) and record for {name}."),
        );
        self.set_status(format!("Status: Deleted {name}"))
    }

    /// Remove `name` and retrain. Returns the number of images removed.
    pub async fn delete_person(&mut self, name: &str) -> Result<usize, PanelError> {
        let (removed, model) = self.library.delete_person(name)?;
        self.install_model(model).await?;
        self.refresh()?;
        Ok(removed.images)
    }

    /// Remove every record, sample and the model.
    pub async fn delete_everything(&mut self) -> Result<(), PanelError> {
        self.library.delete_all()?;
        self.install_model(None).await?;
        self.refresh()
    }

    /// "Switch Camera": toggle to the other camera and resume recognition.
    pub async fn switch_camera(
        &mut self,
        stop: impl Future<Output = ()>,
        max_ticks: Option<u64>,
    ) -> Result<Option<RecognitionSummary>, PanelError> {
        self.tracking = false;
        let target = self.config.other_camera(self.camera);
        match self.engine.switch_camera(target).await {
            Ok(index) => {
                self.camera = index;
                self.frontend
                    .info("Camera Switched", &format!("Switched to camera {index}"));
            }
            Err(EngineError::Camera(e)) => {
                self.frontend.error(
                    "Camera Error",
                    &format!("Could not open camera {target}: {e}"),
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.start_recognition(stop, max_ticks).await
    }

    /// "Quit": stop tracking and release the engine.
    pub fn quit(mut self) -> F {
        self.tracking = false;
        tracing::info!("panel closed");
        self.frontend
    }
}
