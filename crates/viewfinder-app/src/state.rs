use std::collections::VecDeque;
use std::time::Instant;

use viewfinder_core::{FrameSize, Rect};

// ── Phase ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Stopped,
    Previewing { source: String },
    Error(String),
}

impl Phase {
    pub fn label(&self) -> &str {
        match self {
            Phase::Stopped            => "Stopped",
            Phase::Previewing { .. } => "Previewing",
            Phase::Error       ( _ ) => "Error",
        }
    }

    pub fn color(&self) -> egui::Color32 {
        match self {
            Phase::Stopped            => egui::Color32::from_rgb(160, 160, 160),
            Phase::Previewing { .. } => egui::Color32::from_rgb(60, 200, 80),
            Phase::Error       ( _ ) => egui::Color32::from_rgb(220, 60, 60),
        }
    }
}

// ── ViewState ─────────────────────────────────────────────────────────────────

/// Everything the panel shows besides the video itself.
pub struct ViewState {
    pub phase:        Phase,
    pub fps:          f64,
    pub frames_drawn: u64,
    pub frame_size:   FrameSize,
    pub render_area:  Rect,
    pub logs:         VecDeque<String>,
    last_frame_times: VecDeque<Instant>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            phase:            Phase::default(),
            fps:              0.0,
            frames_drawn:     0,
            frame_size:       FrameSize::default(),
            render_area:      Rect::EMPTY,
            logs:             VecDeque::new(),
            last_frame_times: VecDeque::new(),
        }
    }
}

impl ViewState {
    const MAX_LOG_LINES: usize = 200;

    /// Append a line to the circular log buffer.
    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("[panel log] {}", line);
        if self.logs.len() >= Self::MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    /// Call once per drawn frame to update the one-second FPS window.
    pub fn tick_frame(&mut self) {
        self.tick_frame_at(Instant::now());
    }

    fn tick_frame_at(&mut self, now: Instant) {
        self.frames_drawn += 1;
        self.last_frame_times.push_back(now);
        while self
            .last_frame_times
            .front()
            .is_some_and(|t| now.duration_since(*t).as_secs_f64() > 1.0)
        {
            self.last_frame_times.pop_front();
        }
        self.fps = self.last_frame_times.len() as f64;
    }

    /// Reset counters between preview sessions.
    pub fn reset_stats(&mut self) {
        self.fps          = 0.0;
        self.frames_drawn = 0;
        self.last_frame_times.clear();
    }
}
