use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::canvas::{EditResult, NoOp, WriteGuard, note_skipped};
use crate::components::colors::Color;
use crate::components::history::{Direction, PacedReplay};
use crate::components::tools::{self, EditorCommand};
use crate::project::Project;
use crate::settings::EngineConfig;

/// A paced undo/redo in progress.  The guard keeps its layer locked.
struct PacedJob {
    layer_idx: usize,
    replay: PacedReplay,
    guard: WriteGuard,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub commands: usize,
    pub mask_updated: bool,
    pub paced_finished: bool,
    pub rendered: bool,
}

/// Single-threaded editor loop around one open project.
///
/// Each tick drains the pending commands, applies finished selection mask
/// batches, advances a paced undo/redo by one batch and re-renders the
/// composite if anything changed.  [`EditorApp::run`] paces ticks to the
/// configured frame rate.
pub struct EditorApp {
    pub project: Project,
    pub config: EngineConfig,
    pending: VecDeque<EditorCommand>,
    paced: Option<PacedJob>,
    frame: Vec<Color>,
    needs_render: bool,
    tick_count: u64,
}

impl EditorApp {
    pub fn new(project: Project, config: EngineConfig) -> Self {
        let frame = project.document.render();
        Self {
            project,
            config,
            pending: VecDeque::new(),
            paced: None,
            frame,
            needs_render: false,
            tick_count: 0,
        }
    }

    pub fn submit(&mut self, cmd: EditorCommand) {
        self.pending.push_back(cmd);
    }

    /// Queue every command of a script.  Nothing is queued if any line fails
    /// to parse.
    pub fn submit_script(&mut self, text: &str) -> Result<usize, String> {
        let cmds = tools::parse_script(text).map_err(|(line, e)| format!("line {}: {}", line, e))?;
        let n = cmds.len();
        self.pending.extend(cmds);
        Ok(n)
    }

    /// Latest rendered composite.
    pub fn frame(&self) -> &[Color] {
        &self.frame
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// No commands, replays or mask batches outstanding.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.paced.is_none()
            && !self.project.document.rasterizer.is_busy()
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport::default();

        while let Some(cmd) = self.pending.pop_front() {
            let result = self.dispatch(&cmd);
            if cmd.modifies_document() && result.is_ok() {
                self.project.mark_dirty();
                self.needs_render = true;
            }
            if matches!(cmd, EditorCommand::SetLayerVisible { .. } | EditorCommand::SelectLayer(_)) {
                self.needs_render = true;
            }
            report.commands += 1;
        }

        if self.project.document.poll_mask() {
            report.mask_updated = true;
        }

        if let Some(mut job) = self.paced.take() {
            let layer = &mut self.project.document.layers[job.layer_idx];
            if layer.step_paced(&mut job.replay) {
                let n = layer.finish_paced(job.replay, job.guard);
                crate::log_info!("Paced replay finished ({} cells)", n);
                report.paced_finished = true;
            } else {
                self.paced = Some(job);
            }
            self.needs_render = true;
        }

        if self.needs_render {
            self.frame = self.project.document.render();
            self.needs_render = false;
            report.rendered = true;
        }
        report
    }

    fn dispatch(&mut self, cmd: &EditorCommand) -> EditResult {
        let replaying = self.paced.is_some();
        let result = match cmd {
            EditorCommand::Undo | EditorCommand::Redo if self.project.document.settings.slow_history => {
                let direction = if *cmd == EditorCommand::Undo {
                    Direction::Undo
                } else {
                    Direction::Redo
                };
                self.start_paced(direction)
            }
            // The replay refers to its layer by index.
            EditorCommand::AddLayer
            | EditorCommand::DeleteLayer
            | EditorCommand::DuplicateLayer
            | EditorCommand::MoveLayer { .. }
            | EditorCommand::Resize { .. }
                if replaying =>
            {
                Err(NoOp::Busy)
            }
            _ => return tools::execute(&mut self.project.document, cmd),
        };
        note_skipped(cmd.label(), &result);
        result
    }

    fn start_paced(&mut self, direction: Direction) -> EditResult {
        if self.paced.is_some() {
            return Err(NoOp::Busy);
        }
        let doc = &mut self.project.document;
        let layer_idx = doc.active_layer_index;
        let (replay, guard) = doc.layers[layer_idx].begin_paced(direction)?;
        crate::log_info!(
            "Paced {:?} started, {} cells per tick",
            direction,
            replay.batch_size()
        );
        self.paced = Some(PacedJob {
            layer_idx,
            replay,
            guard,
        });
        Ok(0)
    }

    /// Tick without sleeping until idle or `max_ticks` is reached.  Returns
    /// the number of ticks run.  Polygon masks are waited for rather than
    /// polled, so headless runs are deterministic.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> u64 {
        let mut ticks = 0;
        while ticks < max_ticks {
            self.tick();
            ticks += 1;
            if self.project.document.wait_mask() {
                self.needs_render = true;
            }
            if self.is_idle() {
                break;
            }
        }
        if self.needs_render {
            self.frame = self.project.document.render();
            self.needs_render = false;
        }
        ticks
    }

    /// Tick at the configured frame rate until `stop` returns true.
    pub fn run(&mut self, mut stop: impl FnMut(&Self, TickReport) -> bool) {
        let rate = self.config.frame_rate.max(1);
        let interval = Duration::from_secs_f64(1.0 / rate as f64);
        let mut deadline = Instant::now();
        loop {
            let report = self.tick();
            if stop(self, report) {
                break;
            }
            deadline += interval;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else {
                // Fell behind; don't try to catch up with a burst of ticks.
                deadline = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(w: u32, h: u32) -> EditorApp {
        let config = EngineConfig::default();
        let project = Project::new_untitled(1, w, h, &config);
        EditorApp::new(project, config)
    }

    #[test]
    fn tick_runs_queued_commands_and_renders() {
        let mut app = app(4, 4);
        app.submit(EditorCommand::SetColor(Color::WHITE));
        app.submit(EditorCommand::Fill { x: 0.0, y: 0.0 });
        let report = app.tick();
        assert_eq!(report.commands, 2);
        assert!(report.rendered);
        assert!(app.frame().iter().all(|c| *c == Color::WHITE));
        assert!(app.project.is_dirty);
    }

    #[test]
    fn paced_undo_locks_layer_until_done() {
        let mut app = app(40, 40);
        app.submit(EditorCommand::SetColor(Color::WHITE));
        app.submit(EditorCommand::Fill { x: 0.0, y: 0.0 });
        app.submit(EditorCommand::SetFlag(tools::ToolFlag::SlowHistory, true));
        app.submit(EditorCommand::Undo);
        app.tick();
        assert!(!app.is_idle());

        // 1600 records -> 2 per tick; the layer rejects edits meanwhile.
        app.submit(EditorCommand::Fill { x: 0.0, y: 0.0 });
        app.tick();
        assert!(app.project.document.layers[0].write_lock().is_held());

        let ticks = app.run_until_idle(10_000);
        assert!(ticks > 100);
        assert!(app.frame().iter().all(|c| *c == Color::TRANSPARENT));
        assert!(!app.project.document.layers[0].write_lock().is_held());
    }

    #[test]
    fn bad_script_queues_nothing() {
        let mut app = app(2, 2);
        assert!(app.submit_script("undo\nfrobnicate\n").is_err());
        assert!(app.is_idle());
        assert_eq!(app.submit_script("# comment\nundo\nredo\n"), Ok(2));
    }
}
