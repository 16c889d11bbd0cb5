//! Terminal overlay: one line per completed cycle on stdout.

use gaze_core::{MatchResult, OverlayRenderer};
use std::time::Instant;

pub struct TerminalOverlay {
    started: Instant,
}

impl TerminalOverlay {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl OverlayRenderer for TerminalOverlay {
    fn render(&mut self, results: &[MatchResult], timestamp: Instant) {
        let at_ms = timestamp.saturating_duration_since(self.started).as_millis();
        if results.is_empty() {
            println!("[{at_ms:>6}ms] no faces");
            return;
        }
        let labels = results
            .iter()
            .map(|r| format!("{} (d={:.3})", r.display_label(), r.distance))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("[{at_ms:>6}ms] {} face(s): {labels}", results.len());
    }
}
