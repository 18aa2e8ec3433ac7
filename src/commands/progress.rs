//! Progress display for transfer events

use eeprog_serial::{ConnectionState, Event, ProgressState};
use indicatif::{ProgressBar, ProgressStyle};

fn phase_label(state: ProgressState) -> &'static str {
    match state {
        ProgressState::Read => "Reading",
        ProgressState::Write => "Writing",
        ProgressState::Verify => "Verifying",
        ProgressState::Error => "Error",
    }
}

/// Create a progress bar with custom phase message
fn create_progress_bar_with_phase(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {} {{msg}}",
                phase
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Turns the controller's event stream into progress bars
///
/// One bar per phase; a new phase (read, write, verify) finishes the
/// previous bar and starts a fresh one.
#[derive(Default)]
pub struct IndicatifProgress {
    bar: Option<ProgressBar>,
    phase: Option<ProgressState>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::ConnectionState(state) => match state {
                ConnectionState::Connecting => log::debug!("Connecting to programmer"),
                ConnectionState::Connected => log::info!("Programmer connected"),
                ConnectionState::Disconnected => log::debug!("Programmer disconnected"),
            },
            // Traffic is already logged at trace level
            Event::Communication { .. } => {}
            Event::Progress {
                state: ProgressState::Error,
                message,
                ..
            } => {
                let text = message.as_deref().unwrap_or("Transfer error, retrying");
                self.println(&format!("warning: {}", text));
            }
            Event::Progress {
                state,
                position,
                target,
                message,
            } => {
                if self.phase != Some(*state) {
                    self.start(*state, *target);
                }
                if let Some(pb) = &self.bar {
                    pb.set_position(*position);
                    if let Some(msg) = message {
                        pb.set_message(msg.clone());
                    }
                    if position >= target {
                        pb.finish();
                    }
                }
            }
            Event::Error { message, .. } => {
                if let Some(pb) = self.bar.take() {
                    pb.abandon_with_message(message.clone());
                }
                self.phase = None;
            }
        }
    }

    /// Finish whatever bar is still running
    pub fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
        self.phase = None;
    }

    fn start(&mut self, state: ProgressState, target: u64) {
        self.finish();
        self.bar = Some(create_progress_bar_with_phase(target, phase_label(state)));
        self.phase = Some(state);
    }

    fn println(&self, line: &str) {
        match &self.bar {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}
