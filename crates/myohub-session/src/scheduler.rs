//! Deadline-ordered outbound write scheduling
//!
//! Multi-step side effects with timed delays (LED sequences, attach
//! staging, inter-write spacing) are modeled as pending writes with
//! deadlines, drained inside the session loop. Clearing the scheduler
//! cancels everything not yet written without further side effects.

use std::collections::VecDeque;

use tokio::time::{Duration, Instant};

/// FIFO queue of wire frames, each with an earliest-write deadline
///
/// Deadlines are monotonic along the queue: a frame is never due before
/// the one scheduled ahead of it plus the configured spacing, which
/// keeps commands from pipelining on the link.
#[derive(Debug)]
pub struct WriteScheduler {
    spacing: Duration,
    queue: VecDeque<(Instant, String)>,
    last_due: Option<Instant>,
}

impl WriteScheduler {
    /// Create a scheduler with a fixed inter-write spacing
    pub fn new(spacing: Duration) -> Self {
        WriteScheduler {
            spacing,
            queue: VecDeque::new(),
            last_due: None,
        }
    }

    /// Queue a frame to be written as soon as spacing allows
    pub fn schedule(&mut self, frame: String) {
        self.schedule_after(Duration::ZERO, frame);
    }

    /// Queue a frame to be written no earlier than `delay` from now
    pub fn schedule_after(&mut self, delay: Duration, frame: String) {
        let mut due = Instant::now() + delay;
        if let Some(last) = self.last_due {
            let spaced = last + self.spacing;
            if spaced > due {
                due = spaced;
            }
        }
        self.last_due = Some(due);
        self.queue.push_back((due, frame));
    }

    /// Deadline of the next pending write, if any
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.front().map(|(due, _)| *due)
    }

    /// Pop the next frame whose deadline has passed
    pub fn pop_due(&mut self, now: Instant) -> Option<String> {
        match self.queue.front() {
            Some((due, _)) if *due <= now => self.queue.pop_front().map(|(_, frame)| frame),
            _ => None,
        }
    }

    /// Cancel every pending write
    pub fn clear(&mut self) {
        self.queue.clear();
        self.last_due = None;
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
