use std::collections::VecDeque;

use crate::components::colors::Color;
use crate::settings::DEFAULT_HISTORY_CAPACITY;

// ============================================================================
// CHANGE RECORDS & FRAMES
// ============================================================================

/// One overwritten cell: flat buffer index plus the color it held.
///
/// While a frame sits on the undo stack `color` is the color *before* the
/// action; once undone it holds the color the undo replaced, so the same
/// frame can be replayed by redo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub index: usize,
    pub color: Color,
}

/// All change records produced by one user action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    records: Vec<ChangeRecord>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    fn memory_size(&self) -> usize {
        self.records.len() * std::mem::size_of::<ChangeRecord>()
    }
}

#[inline]
fn swap_record(record: &mut ChangeRecord, buffer: &mut [Color]) {
    if let Some(cell) = buffer.get_mut(record.index) {
        std::mem::swap(cell, &mut record.color);
    }
}

// ============================================================================
// BOUNDED STACK
// ============================================================================

/// Fixed-capacity stack; pushing onto a full stack evicts the oldest entry.
#[derive(Clone, Debug)]
struct BoundedStack<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedStack<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
        }
    }

    /// Returns the evicted item, if any.
    fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    fn top(&self) -> Option<&T> {
        self.items.back()
    }

    fn top_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

// ============================================================================
// HISTORY — per-layer undo/redo
// ============================================================================

/// Undo/redo stacks of sparse change frames for one layer buffer.
///
/// Both stacks are bounded; once `capacity` frames are stored, opening a new
/// one silently drops the oldest and that state can no longer be reached.
#[derive(Clone, Debug)]
pub struct History {
    undo_stack: BoundedStack<Frame>,
    redo_stack: BoundedStack<Frame>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo_stack: BoundedStack::new(capacity),
            redo_stack: BoundedStack::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.undo_stack.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.undo_stack.set_capacity(capacity);
        self.redo_stack.set_capacity(capacity);
    }

    /// Start a new user action.
    ///
    /// Clears the redo stack.  A fresh frame is opened only when the top
    /// frame is non-empty or absent, so actions that changed nothing do not
    /// pile up empty frames.
    pub fn begin_frame(&mut self) {
        self.redo_stack.clear();
        if self.undo_stack.top().is_none_or(|f| !f.is_empty()) {
            self.undo_stack.push(Frame::default());
        }
    }

    /// Append a change to the currently open frame.
    pub fn record(&mut self, index: usize, prior: Color) {
        if self.undo_stack.top().is_none() {
            self.undo_stack.push(Frame::default());
        }
        if let Some(frame) = self.undo_stack.top_mut() {
            frame.records.push(ChangeRecord { index, color: prior });
        }
    }

    /// Number of records in the currently open (top) frame.
    pub fn open_frame_len(&self) -> usize {
        self.undo_stack.top().map_or(0, Frame::len)
    }

    /// Undo the most recent non-empty frame.  Returns the number of restored
    /// cells, or `None` when there is nothing to undo.
    pub fn undo(&mut self, buffer: &mut [Color]) -> Option<usize> {
        let mut frame = self.pop_non_empty(Direction::Undo)?;
        for record in frame.records.iter_mut().rev() {
            swap_record(record, buffer);
        }
        let n = frame.len();
        self.redo_stack.push(frame);
        Some(n)
    }

    /// Mirror of [`History::undo`].
    pub fn redo(&mut self, buffer: &mut [Color]) -> Option<usize> {
        let mut frame = self.pop_non_empty(Direction::Redo)?;
        for record in frame.records.iter_mut() {
            swap_record(record, buffer);
        }
        let n = frame.len();
        self.undo_stack.push(frame);
        Some(n)
    }

    /// Pop the top frame for a replay spread across several ticks.
    ///
    /// The caller steps the returned job and hands it back through
    /// [`History::finish_paced`] once it reports completion.
    pub fn begin_paced(&mut self, direction: Direction) -> Option<PacedReplay> {
        let frame = self.pop_non_empty(direction)?;
        Some(PacedReplay::new(frame, direction))
    }

    /// Push a completed paced replay onto the opposite stack.  Any records
    /// the job has not applied yet are applied to `buffer` first.
    pub fn finish_paced(&mut self, mut replay: PacedReplay, buffer: &mut [Color]) -> usize {
        replay.run_to_end(buffer);
        let n = replay.frame.len();
        match replay.direction {
            Direction::Undo => self.redo_stack.push(replay.frame),
            Direction::Redo => self.undo_stack.push(replay.frame),
        };
        n
    }

    fn pop_non_empty(&mut self, direction: Direction) -> Option<Frame> {
        let stack = match direction {
            Direction::Undo => &mut self.undo_stack,
            Direction::Redo => &mut self.redo_stack,
        };
        while let Some(frame) = stack.pop() {
            if !frame.is_empty() {
                return Some(frame);
            }
        }
        None
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.iter().any(|f| !f.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        self.redo_stack.iter().any(|f| !f.is_empty())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Approximate bytes held by both stacks.
    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Frame::memory_size)
            .sum()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

// ============================================================================
// PACED REPLAY — "deliberate-slow" undo/redo
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

/// Number of steps a paced replay is spread over.
const PACED_STEPS: usize = 600;

/// A frame being replayed a batch at a time so the change is visible.
///
/// Pacing only affects when cells change, never the final buffer.
#[derive(Debug)]
pub struct PacedReplay {
    frame: Frame,
    direction: Direction,
    applied: usize,
    batch: usize,
}

impl PacedReplay {
    fn new(frame: Frame, direction: Direction) -> Self {
        let batch = (frame.len() / PACED_STEPS).max(1);
        Self {
            frame,
            direction,
            applied: 0,
            batch,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    pub fn is_finished(&self) -> bool {
        self.applied >= self.frame.len()
    }

    pub fn progress(&self) -> f32 {
        if self.frame.is_empty() {
            1.0
        } else {
            self.applied as f32 / self.frame.len() as f32
        }
    }

    /// Apply one batch.  Returns `true` once every record has been applied.
    pub fn step(&mut self, buffer: &mut [Color]) -> bool {
        let len = self.frame.len();
        let end = (self.applied + self.batch).min(len);
        for n in self.applied..end {
            // Undo walks the frame backwards, redo forwards.
            let i = match self.direction {
                Direction::Undo => len - 1 - n,
                Direction::Redo => n,
            };
            swap_record(&mut self.frame.records[i], buffer);
        }
        self.applied = end;
        self.is_finished()
    }

    fn run_to_end(&mut self, buffer: &mut [Color]) {
        while !self.step(buffer) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgba(255, 0, 0, 255);
    const BLUE: Color = Color::rgba(0, 0, 255, 255);

    fn write(history: &mut History, buf: &mut [Color], index: usize, color: Color) {
        history.record(index, buf[index]);
        buf[index] = color;
    }

    #[test]
    fn undo_then_redo_restores_both_states() {
        let mut buf = vec![Color::TRANSPARENT; 4];
        let mut h = History::new(10);

        h.begin_frame();
        write(&mut h, &mut buf, 1, RED);
        write(&mut h, &mut buf, 2, RED);
        let after = buf.clone();

        assert_eq!(h.undo(&mut buf), Some(2));
        assert_eq!(buf, vec![Color::TRANSPARENT; 4]);
        assert_eq!(h.redo(&mut buf), Some(2));
        assert_eq!(buf, after);
    }

    #[test]
    fn repeated_writes_to_one_cell_undo_to_the_oldest_color() {
        let mut buf = vec![Color::TRANSPARENT; 1];
        let mut h = History::new(10);
        h.begin_frame();
        write(&mut h, &mut buf, 0, RED);
        write(&mut h, &mut buf, 0, BLUE);

        h.undo(&mut buf);
        assert_eq!(buf[0], Color::TRANSPARENT);
        h.redo(&mut buf);
        assert_eq!(buf[0], BLUE);
        h.undo(&mut buf);
        assert_eq!(buf[0], Color::TRANSPARENT);
    }

    #[test]
    fn empty_stacks_report_nothing() {
        let mut buf = vec![Color::TRANSPARENT; 1];
        let mut h = History::new(3);
        assert_eq!(h.undo(&mut buf), None);
        assert_eq!(h.redo(&mut buf), None);
        h.begin_frame();
        assert_eq!(h.undo(&mut buf), None);
    }

    #[test]
    fn begin_frame_reuses_an_empty_top_frame() {
        let mut h = History::new(5);
        h.begin_frame();
        h.begin_frame();
        h.begin_frame();
        assert_eq!(h.undo_count(), 1);
        h.record(0, RED);
        h.begin_frame();
        assert_eq!(h.undo_count(), 2);
    }

    #[test]
    fn new_action_clears_redo() {
        let mut buf = vec![Color::TRANSPARENT; 2];
        let mut h = History::new(5);
        h.begin_frame();
        write(&mut h, &mut buf, 0, RED);
        h.undo(&mut buf);
        assert!(h.can_redo());
        h.begin_frame();
        assert!(!h.can_redo());
    }

    #[test]
    fn overflow_evicts_oldest_frame() {
        let mut buf = vec![Color::TRANSPARENT; 4];
        let mut h = History::new(3);
        for i in 0..4 {
            h.begin_frame();
            write(&mut h, &mut buf, i, RED);
        }
        assert_eq!(h.undo_count(), 3);
        for _ in 0..3 {
            assert!(h.undo(&mut buf).is_some());
        }
        assert_eq!(h.undo(&mut buf), None);
        // The first write fell off the stack and stays applied.
        assert_eq!(buf, vec![RED, Color::TRANSPARENT, Color::TRANSPARENT, Color::TRANSPARENT]);
    }

    #[test]
    fn paced_replay_matches_synchronous_undo() {
        let mut buf = vec![Color::TRANSPARENT; 2000];
        let mut h = History::new(5);
        h.begin_frame();
        for i in 0..2000 {
            write(&mut h, &mut buf, i, if i % 2 == 0 { RED } else { BLUE });
        }
        write(&mut h, &mut buf, 7, RED);

        let mut replay = h.begin_paced(Direction::Undo).expect("frame");
        assert_eq!(replay.batch_size(), 3);
        let mut steps = 1;
        while !replay.step(&mut buf) {
            steps += 1;
        }
        assert!(steps > 1);
        h.finish_paced(replay, &mut buf);
        assert!(buf.iter().all(|c| *c == Color::TRANSPARENT));

        let replay = h.begin_paced(Direction::Redo).expect("frame");
        h.finish_paced(replay, &mut buf);
        assert_eq!(buf[7], RED);
        assert_eq!(buf[8], RED);
        assert_eq!(buf[9], BLUE);
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut h = History::new(10);
        for i in 0..6 {
            h.begin_frame();
            h.record(i, RED);
        }
        h.set_capacity(2);
        assert_eq!(h.undo_count(), 2);
        assert_eq!(h.capacity(), 2);
    }
}
