//! Recognition loop: frames in, attendance records and annotations out.
//!
//! A [`RecognitionSession`] owns the cooldown ledger for one run. It pulls
//! frames from a [`FrameSource`] until the operator stops it, the stream ends
//! or a frame cannot be read, and returns a [`SessionReport`] describing why
//! it stopped. It never exits the process.

use crate::attendance::{AttendanceSink, LogRecord};
use crate::encoder::FaceEncoder;
use crate::ledger::CooldownLedger;
use crate::matcher::Matcher;
use crate::types::{FaceRegion, KnownIdentity};
use chrono::NaiveDateTime;
use image::RgbImage;
use thiserror::Error;

/// Label shown for faces that match no known identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("frame acquisition failed: {0}")]
pub struct FrameSourceError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already stopped; start a new session")]
    AlreadyStopped,
}

/// Produces frames on demand.
pub trait FrameSource {
    /// Next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameSourceError>;

    /// Release the underlying device. Called exactly once when the loop ends.
    fn release(&mut self) {}
}

/// Consumes annotated frames and reports the operator's stop request.
pub trait Presenter {
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation]);

    /// Polled once per frame, after `present`.
    fn stop_requested(&self) -> bool;
}

/// Source of the current wall-clock time.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Display style of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Identity has been logged this session.
    Admitted,
    /// Unknown face, or an identity not yet logged.
    Default,
}

impl Marker {
    /// Box colour as RGB: green for admitted, red otherwise.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Marker::Admitted => [0, 255, 0],
            Marker::Default => [255, 0, 0],
        }
    }
}

/// What to draw for one face: a box, a label and a colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub region: FaceRegion,
    pub label: String,
    pub marker: Marker,
}

/// Lifecycle of a session. A session runs once: `Idle` until [`RecognitionSession::run`]
/// is called, `Stopped` after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Stopped,
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    OperatorStop,
    EndOfStream,
    CameraFailure(FrameSourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub termination: Termination,
    pub frames_processed: u64,
    pub faces_seen: u64,
    pub records_written: u64,
    pub write_failures: u64,
}

/// Outcome of processing a single frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub annotations: Vec<Annotation>,
    /// Identities written to the log for this frame.
    pub logged: Vec<String>,
    pub write_failures: u64,
}

/// One recognition run. Single-threaded: the ledger is only touched from
/// the loop, and admission is a single check-and-record call.
pub struct RecognitionSession<'k, E, M> {
    known: &'k [KnownIdentity],
    encoder: E,
    matcher: M,
    ledger: CooldownLedger,
    state: SessionState,
}

impl<'k, E: FaceEncoder, M: Matcher> RecognitionSession<'k, E, M> {
    pub fn new(known: &'k [KnownIdentity], encoder: E, matcher: M, ledger: CooldownLedger) -> Self {
        Self {
            known,
            encoder,
            matcher,
            ledger,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Run until stopped. The source is released on every exit path.
    pub fn run<S, L, P, C>(
        &mut self,
        source: &mut S,
        sink: &mut L,
        presenter: &mut P,
        clock: &C,
    ) -> Result<SessionReport, SessionError>
    where
        S: FrameSource + ?Sized,
        L: AttendanceSink + ?Sized,
        P: Presenter + ?Sized,
        C: Clock + ?Sized,
    {
        // `&mut self` rules out a second concurrent run; only a finished session is refused.
        if self.state == SessionState::Stopped {
            return Err(SessionError::AlreadyStopped);
        }
        tracing::info!(
            known = self.known.len(),
            cooldown_secs = self.ledger.window().num_seconds(),
            "recognition session started"
        );

        let mut report = SessionReport {
            termination: Termination::EndOfStream,
            frames_processed: 0,
            faces_seen: 0,
            records_written: 0,
            write_failures: 0,
        };

        report.termination = loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("frame source reached end of stream");
                    break Termination::EndOfStream;
                }
                Err(e) => {
                    tracing::error!(error = %e, frames = report.frames_processed, "frame read failed, stopping");
                    break Termination::CameraFailure(e);
                }
            };

            let outcome = self.process_frame(&frame, clock.now(), sink);
            report.frames_processed += 1;
            report.faces_seen += outcome.annotations.len() as u64;
            report.records_written += outcome.logged.len() as u64;
            report.write_failures += outcome.write_failures;

            presenter.present(&frame, &outcome.annotations);

            if presenter.stop_requested() {
                tracing::info!("stop requested by operator");
                break Termination::OperatorStop;
            }
        };

        source.release();
        self.state = SessionState::Stopped;
        tracing::info!(
            termination = ?report.termination,
            frames = report.frames_processed,
            records = report.records_written,
            marked = self.ledger.marked_count(),
            "recognition session stopped"
        );
        Ok(report)
    }

    /// Detect, match, gate and annotate every face in one frame.
    ///
    /// An encoder failure is logged and yields no annotations; a log write
    /// failure is logged and counted, and processing continues.
    pub fn process_frame<L>(&mut self, frame: &RgbImage, now: NaiveDateTime, sink: &mut L) -> FrameOutcome
    where
        L: AttendanceSink + ?Sized,
    {
        let mut outcome = FrameOutcome::default();

        let detections = match self.encoder.encode(frame) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "face encoding failed for frame, skipping");
                return outcome;
            }
        };

        for detection in &detections {
            let result = self.matcher.find(&detection.encoding, self.known);

            let Some(name) = result.name() else {
                tracing::trace!(distance = ?result.distance, "unknown face");
                outcome.annotations.push(Annotation {
                    region: detection.region,
                    label: UNKNOWN_LABEL.to_string(),
                    marker: Marker::Default,
                });
                continue;
            };

            let previous = self.ledger.last_logged_at(name);
            if self.ledger.try_admit(name, now) {
                match sink.append(&LogRecord::new(name, now)) {
                    Ok(()) => outcome.logged.push(name.to_string()),
                    Err(e) => {
                        // No row was written, so the admission does not count.
                        tracing::error!(name = %name, error = %e, "failed to write attendance record");
                        self.ledger.revert(name, previous);
                        outcome.write_failures += 1;
                    }
                }
            }

            outcome.annotations.push(annotate(detection.region, name, self.ledger.is_marked(name)));
        }

        outcome
    }
}

fn annotate(region: FaceRegion, name: &str, marked: bool) -> Annotation {
    if marked {
        Annotation {
            region,
            label: format!("{name} - Marked"),
            marker: Marker::Admitted,
        }
    } else {
        Annotation {
            region,
            label: name.to_string(),
            marker: Marker::Default,
        }
    }
}
