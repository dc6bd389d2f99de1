//! Terminal rendition of the button panel.

use image::GrayImage;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::engine::FrameReport;
use crate::panel::{Frontend, Panel, PanelError};
use crate::preview;

/// Width of ASCII-art thumbnails.
const ART_COLUMNS: u32 = 48;

const MENU: &str = "\
[1] Start Recognition
[2] Add New Face
[3] Delete Stored Faces
[4] Switch Camera
[5] Stop
[6] Quit";

/// Panel buttons, as picked from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartRecognition,
    AddFace,
    DeleteFaces,
    SwitchCamera,
    Stop,
    Quit,
}

impl Action {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "1" | "start" | "s" => Some(Action::StartRecognition),
            "2" | "add" | "a" => Some(Action::AddFace),
            "3" | "delete" | "d" => Some(Action::DeleteFaces),
            "4" | "switch" | "c" => Some(Action::SwitchCamera),
            "5" | "stop" => Some(Action::Stop),
            "6" | "quit" | "q" | "exit" => Some(Action::Quit),
            _ => None,
        }
    }
}

/// Dialogs on a line-oriented reader and writer (stdin/stdout in the binary).
pub struct ConsoleFrontend<R, W> {
    input: R,
    output: W,
    last_seen: Vec<String>,
}

impl<R: BufRead, W: Write> ConsoleFrontend<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            last_seen: Vec::new(),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = writeln!(self.output, "{text}").and_then(|_| self.output.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    /// One trimmed line, `None` at end of input.
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "console read failed");
                None
            }
        }
    }

    /// Show the menu and read the next action. `None` at end of input.
    pub fn next_action(&mut self) -> Option<Action> {
        loop {
            self.say(MENU);
            self.say("> ");
            let line = self.read_line()?;
            match Action::parse(&line) {
                Some(action) => return Some(action),
                None if line.is_empty() => continue,
                None => self.say(&format!("Unknown choice: {line}")),
            }
        }
    }
}

impl<R: BufRead, W: Write> Frontend for ConsoleFrontend<R, W> {
    fn ask_string(&mut self, title: &str, prompt: &str) -> Option<String> {
        self.say(&format!("== {title} =="));
        self.say(prompt);
        self.read_line()
    }

    fn ask_yes_no(&mut self, title: &str, question: &str) -> bool {
        self.say(&format!("== {title} =="));
        self.say(&format!("{question} [y/N]"));
        matches!(
            self.read_line().map(|l| l.to_ascii_lowercase()).as_deref(),
            Some("y" | "yes")
        )
    }

    fn info(&mut self, title: &str, message: &str) {
        self.say(&format!("{title}: {message}"));
    }

    fn warning(&mut self, title: &str, message: &str) {
        self.say(&format!("warning: {title}: {message}"));
    }

    fn error(&mut self, title: &str, message: &str) {
        self.say(&format!("error: {title}: {message}"));
    }

    fn confirm_delete(&mut self, name: &str, preview: &Path, thumbnail: &GrayImage) -> bool {
        self.say(&preview::ascii_art(thumbnail, ART_COLUMNS));
        self.say(&format!("({})", preview.display()));
        self.ask_yes_no(
            "Confirm Delete",
            &format!("Delete all data for {name}?"),
        )
    }

    fn show_frame(&mut self, report: &FrameReport) {
        let seen: Vec<String> = report
            .faces
            .iter()
            .map(|f| f.verdict.display_name().to_string())
            .collect();
        if seen != self.last_seen {
            if seen.is_empty() {
                self.say("No faces in view");
            } else {
                let captions: Vec<String> = report.faces.iter().map(|f| f.caption()).collect();
                self.say(&format!("In view: {}", captions.join(", ")));
            }
            self.last_seen = seen;
        }
    }

    fn status_changed(&mut self, status: &str, stored_faces: i64) {
        self.say(&format!("[{status} | Stored Faces: {stored_faces}]"));
    }
}

/// Drive the panel from the menu until "Quit" or end of input.
///
/// `stop` builds the future that ends a recognition run (Ctrl-C in the binary).
pub async fn run_menu<R, W, S, Fut>(
    mut panel: Panel<ConsoleFrontend<R, W>>,
    mut stop: S,
) -> Result<ConsoleFrontend<R, W>, PanelError>
where
    R: BufRead,
    W: Write,
    S: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(action) = panel.frontend_mut().next_action() {
        tracing::debug!(?action, "panel action");
        match action {
            Action::StartRecognition => {
                panel.start_recognition(stop(), None).await?;
            }
            Action::AddFace => panel.add_new_face().await?,
            Action::DeleteFaces => panel.delete_faces().await?,
            Action::SwitchCamera => {
                panel.switch_camera(stop(), None).await?;
            }
            Action::Stop => panel.stop()?,
            Action::Quit => break,
        }
    }
    Ok(panel.quit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::spawn_engine;
    use crate::engine::testing::{parts, Scene};
    use crate::library::Library;
    use crate::store::FaceStore;
    use facetally_core::SampleStore;
    use std::io::Cursor;

    fn console(script: &str) -> ConsoleFrontend<Cursor<Vec<u8>>, Vec<u8>> {
        ConsoleFrontend::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("1"), Some(Action::StartRecognition));
        assert_eq!(Action::parse(" Quit "), Some(Action::Quit));
        assert_eq!(Action::parse("d"), Some(Action::DeleteFaces));
        assert_eq!(Action::parse("9"), None);
    }

    #[test]
    fn test_dialogs() {
        let mut c = console("bob\nyes\n\n");
        assert_eq!(c.ask_string("Add Face", "Enter user name:").as_deref(), Some("bob"));
        assert!(c.ask_yes_no("Q", "sure?"));
        assert!(!c.ask_yes_no("Q", "sure?"));
        // End of input reads as cancel.
        assert_eq!(c.ask_string("Add Face", "Enter user name:"), None);
        assert!(!c.ask_yes_no("Q", "sure?"));

        let out = String::from_utf8(c.into_output()).unwrap();
        assert!(out.contains("== Add Face =="));
        assert!(out.contains("sure? [y/N]"));
    }

    #[test]
    fn test_next_action_skips_garbage() {
        let mut c = console("\nwhat\n2\n");
        assert_eq!(c.next_action(), Some(Action::AddFace));
        assert_eq!(c.next_action(), None);
        let out = String::from_utf8(c.into_output()).unwrap();
        assert!(out.contains("Unknown choice: what"));
    }

    #[test]
    fn test_show_frame_prints_names_on_change() {
        use crate::engine::testing::FACE;
        use crate::engine::FaceOutcome;
        use facetally_core::Verdict;

        let report = |distance: f64| FrameReport {
            sequence: 1,
            faces: vec![FaceOutcome {
                rect: FACE,
                verdict: Verdict::Known { name: "alice".into(), distance },
            }],
        };
        let mut c = console("");
        c.show_frame(&report(10.0));
        c.show_frame(&report(11.0));
        c.show_frame(&FrameReport { sequence: 2, faces: Vec::new() });

        let out = String::from_utf8(c.into_output()).unwrap();
        assert_eq!(out, "In view: alice (10.0)\nNo faces in view\n");
    }

    #[tokio::test]
    async fn test_menu_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            sample_dir: dir.path().join("face_database"),
            db_path: dir.path().join("faces.db"),
            model_path: dir.path().join("trainer.json"),
            samples_per_enroll: 3,
            ..Config::default()
        };
        let scene = Scene::new(Some(5));
        let engine =
            spawn_engine(parts(&scene, SampleStore::open(&config.sample_dir).unwrap())).unwrap();
        let library = Library::from_parts(
            FaceStore::open(&config.db_path).unwrap(),
            SampleStore::open(&config.sample_dir).unwrap(),
            config.model_path.clone(),
        );

        // Add carol, try to delete her but decline, then quit.
        let script = "2\ncarol\n3\ny\ncarol\nn\n6\n";
        let panel = Panel::new(config, engine, library, console(script))
            .await
            .unwrap();
        let frontend = run_menu(panel, || std::future::ready(())).await.unwrap();

        let out = String::from_utf8(frontend.into_output()).unwrap();
        assert!(out.contains("Done: Face data saved for carol"));
        assert!(out.contains("Available: carol"));
        assert!(out.contains("Cancelled: Deletion cancelled."));
        assert!(out.contains("Stored Faces: 1"));

        let store = FaceStore::open(&dir.path().join("faces.db")).unwrap();
        assert_eq!(store.names().unwrap(), vec!["carol"]);
    }
}
