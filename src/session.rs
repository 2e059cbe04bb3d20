//! Inspector session: the state a presentation layer drives with
//! start / abort / reset commands.

use opencv::prelude::*;

use crate::config::InspectionConfig;
use crate::error::{InspectError, Result};
use crate::scan::{CancellationToken, GridScanner, ScanObserver, ScanOutcome, ScanState};
use crate::types::{FinalDefect, GridCell, ScanSession};

pub struct Inspector {
    config: InspectionConfig,
    reference: Option<Mat>,
    test: Option<Mat>,
    state: ScanState,
    session: ScanSession,
    cells: Vec<GridCell>,
    defects: Vec<FinalDefect>,
    cancel: CancellationToken,
    last_error: Option<String>,
}

/// Mirrors scan updates into the inspector before forwarding them.
struct SessionObserver<'a> {
    state: &'a mut ScanState,
    session: &'a mut ScanSession,
    cells: &'a mut Vec<GridCell>,
    inner: &'a mut dyn ScanObserver,
}

impl ScanObserver for SessionObserver<'_> {
    fn on_state(&mut self, state: ScanState) {
        *self.state = state;
        if state == ScanState::Aborted {
            self.session.aborted = true;
        }
        self.inner.on_state(state);
    }

    fn on_progress(&mut self, progress: u8, label: &str) {
        self.session.progress = progress;
        self.session.current_step = label.to_string();
        self.inner.on_progress(progress, label);
    }

    fn on_grid(&mut self, cells: &[GridCell]) {
        *self.cells = cells.to_vec();
        self.inner.on_grid(cells);
    }

    fn on_cell(&mut self, cell: &GridCell) {
        if let Some(slot) = self.cells.get_mut(cell.id) {
            *slot = cell.clone();
        }
        self.inner.on_cell(cell);
    }
}

impl Inspector {
    pub fn new(config: InspectionConfig) -> Self {
        Self {
            config,
            reference: None,
            test: None,
            state: ScanState::Idle,
            session: ScanSession::default(),
            cells: Vec::new(),
            defects: Vec::new(),
            cancel: CancellationToken::new(),
            last_error: None,
        }
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    pub fn set_reference(&mut self, image: Mat) {
        self.reference = Some(image);
        self.reset();
    }

    pub fn set_test(&mut self, image: Mat) {
        self.test = Some(image);
        self.reset();
    }

    pub fn reference(&self) -> Option<&Mat> {
        self.reference.as_ref()
    }

    pub fn test(&self) -> Option<&Mat> {
        self.test.as_ref()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn defects(&self) -> &[FinalDefect] {
        &self.defects
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Token for aborting the running scan from elsewhere, e.g. another thread
    /// or an observer callback. Take it before calling [`Inspector::start`]:
    /// `start` holds the inspector for the whole scan.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the current session token. Between scans this only marks the
    /// session; the next [`Inspector::start`] runs with a fresh token.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Discard all session state and return to idle.
    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.session = ScanSession::default();
        self.cells.clear();
        self.defects.clear();
        self.cancel = CancellationToken::new();
    }

    /// Run a scan to completion on the calling thread.
    ///
    /// An aborted scan leaves the cell grid frozen and publishes no defects.
    /// A fatal error returns the session to idle with a diagnostic in
    /// [`Inspector::last_error`].
    pub fn start(&mut self, observer: &mut dyn ScanObserver) -> Result<ScanOutcome> {
        if self.reference.is_none() || self.test.is_none() {
            self.session.current_step = "Both images are required".to_string();
            return Ok(ScanOutcome::MissingImages);
        }
        let scanner = match GridScanner::new(&self.config) {
            Ok(scanner) => scanner,
            Err(e) => return Err(self.fail(e)),
        };

        self.state = ScanState::Idle;
        self.session = ScanSession::default();
        self.cells.clear();
        self.defects.clear();
        self.last_error = None;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let (Some(reference), Some(test)) = (self.reference.as_ref(), self.test.as_ref()) else {
            return Ok(ScanOutcome::MissingImages);
        };
        let mut session_observer = SessionObserver {
            state: &mut self.state,
            session: &mut self.session,
            cells: &mut self.cells,
            inner: observer,
        };
        let result = scanner.run(reference, test, &self.cancel, &mut session_observer);

        match result {
            Ok(ScanOutcome::Completed(report)) => {
                self.cells = report.cells.clone();
                self.defects = report.defects.clone();
                Ok(ScanOutcome::Completed(report))
            }
            Ok(ScanOutcome::Aborted) => {
                self.cancel = CancellationToken::new();
                Ok(ScanOutcome::Aborted)
            }
            Ok(other) => Ok(other),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, e: InspectError) -> InspectError {
        log::error!("Scan failed: {}", e);
        self.reset();
        self.last_error = Some(e.to_string());
        e
    }
}
