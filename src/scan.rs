//! Grid scan orchestration.
//!
//! A scan registers the pair once, tiles the working area into cells, scores
//! every cell against a padded search window and fuses the flagged cells
//! into final defects. Cancellation is cooperative: the token is checked at
//! every stage boundary and between cells, and a result that finishes after
//! cancellation is discarded rather than committed.

use opencv::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use crate::config::{InspectionConfig, ScanConfig};
use crate::error::{InspectError, Result};
use crate::fusion::{fuse, to_final_defects};
use crate::grid::build_grid;
use crate::image_io::{crop, crop_padded, image_bounds};
use crate::registration::{FeatureRegistrar, Registrar, RegistrationTier};
use crate::similarity::{NccScorer, RegionScorer};
use crate::types::{CellStatus, FinalDefect, GridCell, Rect};

/// Shared abort flag handed to a scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanState {
    Idle,
    Aligning,
    GridInit,
    Scanning { cell: usize },
    Fusing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    State(ScanState),
    Progress { progress: u8, label: String },
    Grid(Vec<GridCell>),
    Cell(GridCell),
}

/// Receives live scan updates, typically the presentation layer.
pub trait ScanObserver {
    fn on_state(&mut self, _state: ScanState) {}
    fn on_progress(&mut self, _progress: u8, _label: &str) {}
    fn on_grid(&mut self, _cells: &[GridCell]) {}
    fn on_cell(&mut self, _cell: &GridCell) {}
}

impl ScanObserver for () {}

/// Forwards every update as a [`ScanEvent`]. A dropped receiver is ignored.
pub struct ChannelObserver {
    sender: mpsc::Sender<ScanEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<ScanEvent>) -> Self {
        Self { sender }
    }
}

impl ScanObserver for ChannelObserver {
    fn on_state(&mut self, state: ScanState) {
        let _ = self.sender.send(ScanEvent::State(state));
    }

    fn on_progress(&mut self, progress: u8, label: &str) {
        let _ = self.sender.send(ScanEvent::Progress {
            progress,
            label: label.to_string(),
        });
    }

    fn on_grid(&mut self, cells: &[GridCell]) {
        let _ = self.sender.send(ScanEvent::Grid(cells.to_vec()));
    }

    fn on_cell(&mut self, cell: &GridCell) {
        let _ = self.sender.send(ScanEvent::Cell(cell.clone()));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// `None` when registration failed and the unregistered pair was scanned.
    pub registration_tier: Option<RegistrationTier>,
    /// Working area in reference-image coordinates; cells and defects are relative to it.
    pub crop: Rect,
    pub cells: Vec<GridCell>,
    pub defects: Vec<FinalDefect>,
    pub unscored_cells: usize,
    pub elapsed_ms: u128,
}

impl ScanReport {
    /// Defects translated from working-area to reference-image coordinates.
    pub fn defects_in_reference_frame(&self) -> Vec<FinalDefect> {
        self.defects
            .iter()
            .map(|d| FinalDefect {
                rect: Rect::new(d.rect.x + self.crop.x, d.rect.y + self.crop.y, d.rect.width, d.rect.height),
                ..d.clone()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum ScanOutcome {
    Completed(ScanReport),
    Aborted,
    MissingImages,
}

/// Keeps reported progress monotonically non-decreasing within a scan.
struct Progress<'a> {
    last: u8,
    observer: &'a mut dyn ScanObserver,
}

impl<'a> Progress<'a> {
    fn state(&mut self, state: ScanState) {
        self.observer.on_state(state);
    }

    fn report(&mut self, progress: u8, label: &str) {
        self.last = self.last.max(progress.min(100));
        self.observer.on_progress(self.last, label);
    }

    fn aborted(&mut self) -> Result<ScanOutcome> {
        log::info!("Scan aborted");
        self.observer.on_state(ScanState::Aborted);
        Ok(ScanOutcome::Aborted)
    }
}

/// Search window for a cell: the cell grown by `padding` of its size on each
/// side, origin clamped at zero, far edge left unclamped.
pub fn search_window_rect(cell: Rect, padding: f64) -> Rect {
    let pad_x = (cell.width as f64 * padding).round() as i32;
    let pad_y = (cell.height as f64 * padding).round() as i32;
    Rect::new(
        (cell.x - pad_x).max(0),
        (cell.y - pad_y).max(0),
        cell.width + 2 * pad_x,
        cell.height + 2 * pad_y,
    )
}

fn score_cell(reference: &Mat, test: &Mat, cell: Rect, padding: f64, scorer: &dyn RegionScorer) -> Result<u8> {
    let template = crop(reference, cell)?;
    let window = crop_padded(test, search_window_rect(cell, padding))?;
    scorer.score(&template, &window)
}

/// Record a scoring result; a failed cell is skipped and never counts as a defect.
fn commit(cell: &mut GridCell, result: Result<u8>, defect_threshold: u8) {
    match result {
        Ok(score) => {
            cell.score = score.min(100);
            cell.status = if cell.score < defect_threshold {
                CellStatus::Defect
            } else {
                CellStatus::Ok
            };
            log::debug!("Cell {} {}: score {} -> {:?}", cell.id, cell.rect, cell.score, cell.status);
        }
        Err(e) => {
            log::warn!("Cell {} {} could not be scored: {}", cell.id, cell.rect, e);
            cell.score = 0;
            cell.status = CellStatus::Unscored;
        }
    }
}

enum CellMessage {
    Started(usize),
    Finished(usize, Result<u8>),
}

pub struct GridScanner {
    config: ScanConfig,
    registrar: Box<dyn Registrar>,
    scorer: Arc<dyn RegionScorer>,
}

impl GridScanner {
    /// Build the standard feature registrar and NCC scorer from `config`.
    /// Fails with [`InspectError::Config`] when the configuration is invalid.
    pub fn new(config: &InspectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.scan.clone(),
            registrar: Box::new(FeatureRegistrar::new(config.registration.clone())),
            scorer: Arc::new(NccScorer::new(config.scorer.clone())),
        })
    }

    pub fn with_parts(config: ScanConfig, registrar: Box<dyn Registrar>, scorer: Arc<dyn RegionScorer>) -> Self {
        Self {
            config,
            registrar,
            scorer,
        }
    }

    /// Run a full scan on the calling thread.
    ///
    /// Returns `Err` for a missing feature detector or an OpenCV failure
    /// outside per-cell scoring. Any other registration failure falls back to
    /// the unregistered pair at its native size.
    pub fn run(
        &self,
        reference: &Mat,
        test: &Mat,
        cancel: &CancellationToken,
        observer: &mut dyn ScanObserver,
    ) -> Result<ScanOutcome> {
        let mut progress = Progress { last: 0, observer };
        if reference.empty() || test.empty() {
            log::warn!("Scan requested without both images");
            return Ok(ScanOutcome::MissingImages);
        }
        if cancel.is_cancelled() {
            return progress.aborted();
        }
        let start = std::time::Instant::now();

        progress.state(ScanState::Aligning);
        progress.report(0, "Aligning images...");
        let (working_ref, working_test, tier, crop_rect) = match self.registrar.register(reference, test) {
            Ok(reg) => (reg.aligned_reference, reg.aligned_test, Some(reg.tier), reg.crop),
            Err(e) if e.is_fatal() => {
                log::error!("Cannot scan: {}", e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("{}; scanning unregistered images", e);
                (reference.try_clone()?, test.try_clone()?, None, image_bounds(reference))
            }
        };
        if cancel.is_cancelled() {
            return progress.aborted();
        }

        progress.state(ScanState::GridInit);
        let mut cells = build_grid(working_ref.cols(), working_ref.rows(), self.config.grid);
        log::info!(
            "Scanning {} cells over {}x{} working area",
            cells.len(),
            working_ref.cols(),
            working_ref.rows()
        );
        progress.observer.on_grid(&cells);
        progress.report(0, &format!("Scanning {} regions...", cells.len()));

        let completed = if self.config.worker_count <= 1 {
            self.scan_sequential(&working_ref, &working_test, &mut cells, cancel, &mut progress)
        } else {
            self.scan_parallel(&working_ref, &working_test, &mut cells, cancel, &mut progress)?
        };
        if !completed || cancel.is_cancelled() {
            return progress.aborted();
        }

        progress.state(ScanState::Fusing);
        progress.report(100, "Merging defect regions...");
        let defect_rects: Vec<Rect> = cells
            .iter()
            .filter(|c| c.status == CellStatus::Defect)
            .map(|c| c.rect)
            .collect();
        let defects = to_final_defects(fuse(&defect_rects, self.config.fusion_tolerance));
        let unscored_cells = cells.iter().filter(|c| c.status == CellStatus::Unscored).count();

        let elapsed = start.elapsed();
        log::info!(
            "Scan finished in {:?}: {} defect cells fused into {} defects, {} unscored",
            elapsed,
            defect_rects.len(),
            defects.len(),
            unscored_cells
        );
        progress.state(ScanState::Done);
        progress.report(100, &format!("Found {} defects", defects.len()));

        Ok(ScanOutcome::Completed(ScanReport {
            registration_tier: tier,
            crop: crop_rect,
            cells,
            defects,
            unscored_cells,
            elapsed_ms: elapsed.as_millis(),
        }))
    }

    /// Returns false when cancelled before every cell was committed.
    fn scan_sequential(
        &self,
        reference: &Mat,
        test: &Mat,
        cells: &mut [GridCell],
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> bool {
        let total = cells.len();
        for i in 0..total {
            if cancel.is_cancelled() {
                return false;
            }
            progress.state(ScanState::Scanning { cell: i });
            cells[i].status = CellStatus::Analyzing;
            progress.observer.on_cell(&cells[i]);

            let result = score_cell(reference, test, cells[i].rect, self.config.search_padding, self.scorer.as_ref());
            if cancel.is_cancelled() {
                return false;
            }
            commit(&mut cells[i], result, self.config.defect_threshold);
            progress.observer.on_cell(&cells[i]);
            progress.report(
                ((i + 1) * 100 / total) as u8,
                &format!("Analyzed region {}/{}", i + 1, total),
            );
        }
        true
    }

    /// Workers pull cell indices from a shared counter, each scoring against
    /// private copies of the buffers. Results are committed here, once per cell.
    fn scan_parallel(
        &self,
        reference: &Mat,
        test: &Mat,
        cells: &mut [GridCell],
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<bool> {
        let total = cells.len();
        let workers = self.config.worker_count.min(total.max(1));
        let copies = (0..workers)
            .map(|_| -> Result<(Mat, Mat)> { Ok((reference.try_clone()?, test.try_clone()?)) })
            .collect::<Result<Vec<(Mat, Mat)>>>()?;
        let rects: Vec<Rect> = cells.iter().map(|c| c.rect).collect();
        let next = AtomicUsize::new(0);
        let padding = self.config.search_padding;
        let scorer = self.scorer.as_ref();
        log::debug!("Dispatching {} cells to {} workers", total, workers);

        let mut done = 0;
        std::thread::scope(|s| {
            let (tx, rx) = mpsc::channel::<CellMessage>();
            for (worker_ref, worker_test) in copies {
                let tx = tx.clone();
                let next = &next;
                let rects = &rects;
                s.spawn(move || loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= rects.len() || tx.send(CellMessage::Started(i)).is_err() {
                        break;
                    }
                    let result = score_cell(&worker_ref, &worker_test, rects[i], padding, scorer);
                    if tx.send(CellMessage::Finished(i, result)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for message in rx {
                if cancel.is_cancelled() {
                    continue;
                }
                match message {
                    CellMessage::Started(i) => {
                        progress.state(ScanState::Scanning { cell: i });
                        cells[i].status = CellStatus::Analyzing;
                        progress.observer.on_cell(&cells[i]);
                    }
                    CellMessage::Finished(i, result) => {
                        commit(&mut cells[i], result, self.config.defect_threshold);
                        progress.observer.on_cell(&cells[i]);
                        done += 1;
                        progress.report(
                            (done * 100 / total) as u8,
                            &format!("Analyzed region {}/{}", done, total),
                        );
                    }
                }
            }
        });
        Ok(done == total && !cancel.is_cancelled())
    }

    /// Run the scan on a background thread, streaming events over a channel.
    pub fn spawn(self, reference: Mat, test: Mat) -> ScanHandle {
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = std::thread::spawn(move || {
            let mut observer = ChannelObserver::new(tx);
            self.run(&reference, &test, &token, &mut observer)
        });
        ScanHandle {
            events: rx,
            cancel,
            join,
        }
    }
}

pub struct ScanHandle {
    pub events: mpsc::Receiver<ScanEvent>,
    pub cancel: CancellationToken,
    join: JoinHandle<Result<ScanOutcome>>,
}

impl ScanHandle {
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn wait(self) -> Result<ScanOutcome> {
        self.join
            .join()
            .map_err(|_| InspectError::Internal("scan thread panicked".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridStrategy;
    use crate::registration::Registration;
    use crate::testing::{block_noise, with_patch};

    /// Passes the pair through untouched.
    struct IdentityRegistrar;

    impl Registrar for IdentityRegistrar {
        fn register(&self, reference: &Mat, test: &Mat) -> Result<Registration> {
            Ok(Registration {
                aligned_reference: reference.try_clone()?,
                aligned_test: test.try_clone()?,
                crop: image_bounds(reference),
                tier: RegistrationTier::IdentityFallback,
                homography: None,
                good_matches: 0,
            })
        }
    }

    struct FailingRegistrar(fn() -> InspectError);

    impl Registrar for FailingRegistrar {
        fn register(&self, _: &Mat, _: &Mat) -> Result<Registration> {
            Err((self.0)())
        }
    }

    /// Scores from a fixed table indexed by call order; `None` raises.
    struct ScriptedScorer {
        scores: Vec<Option<u8>>,
        calls: AtomicUsize,
        delay: std::time::Duration,
    }

    impl ScriptedScorer {
        fn new(scores: Vec<Option<u8>>) -> Arc<Self> {
            Self::slow(scores, std::time::Duration::ZERO)
        }

        fn slow(scores: Vec<Option<u8>>, delay: std::time::Duration) -> Arc<Self> {
            Arc::new(Self {
                scores,
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    impl RegionScorer for ScriptedScorer {
        fn score(&self, _: &Mat, _: &Mat) -> Result<u8> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.scores[i].ok_or_else(|| InspectError::Internal("scripted failure".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<ScanState>,
        progress: Vec<u8>,
        cell_updates: Vec<GridCell>,
        cancel_after_cell: Option<(usize, CancellationToken)>,
    }

    impl ScanObserver for Recorder {
        fn on_state(&mut self, state: ScanState) {
            self.states.push(state);
        }

        fn on_progress(&mut self, progress: u8, _label: &str) {
            self.progress.push(progress);
        }

        fn on_cell(&mut self, cell: &GridCell) {
            self.cell_updates.push(cell.clone());
            if let Some((id, token)) = &self.cancel_after_cell {
                if cell.id == *id && matches!(cell.status, CellStatus::Ok | CellStatus::Defect) {
                    token.cancel();
                }
            }
        }
    }

    fn config(per_axis: i32) -> ScanConfig {
        ScanConfig {
            grid: GridStrategy::FixedCellCount { per_axis },
            ..ScanConfig::default()
        }
    }

    fn textured() -> opencv::Result<Mat> {
        block_noise(400, 400, 8, 60, 120, 42)
    }

    #[test]
    fn test_search_window_clamps_origin_only() {
        let rect = search_window_rect(Rect::new(0, 400, 200, 200), 0.3);
        assert_eq!(rect, Rect::new(0, 340, 320, 320));
        let far = search_window_rect(Rect::new(800, 800, 200, 200), 0.3);
        assert_eq!(far, Rect::new(740, 740, 320, 320));
    }

    #[test]
    fn test_scripted_scores_classify_and_fuse() -> anyhow::Result<()> {
        let img = textured()?;
        // 2x2 grid: cells 0 and 1 share a border; 85 sits exactly on the threshold.
        let scorer = ScriptedScorer::new(vec![Some(40), Some(60), Some(99), Some(85)]);
        let scanner = GridScanner::with_parts(config(2), Box::new(IdentityRegistrar), scorer);
        let mut recorder = Recorder::default();

        let outcome = scanner.run(&img, &img, &CancellationToken::new(), &mut recorder)?;
        let ScanOutcome::Completed(report) = outcome else {
            panic!("scan did not complete");
        };

        let statuses: Vec<_> = report.cells.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![CellStatus::Defect, CellStatus::Defect, CellStatus::Ok, CellStatus::Ok]
        );
        assert_eq!(report.defects.len(), 1);
        assert_eq!(report.defects[0].rect, Rect::new(0, 0, 400, 200));
        assert_eq!(report.defects[0].id, 1);
        assert_eq!(recorder.states.last(), Some(&ScanState::Done));
        assert!(recorder.progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(recorder.progress.last(), Some(&100));
        Ok(())
    }

    #[test]
    fn test_abort_after_third_cell_stops_mutation() -> anyhow::Result<()> {
        let img = textured()?;
        let scorer = ScriptedScorer::new(vec![Some(10); 16]);
        let scanner = GridScanner::with_parts(config(4), Box::new(IdentityRegistrar), scorer.clone());
        let token = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_after_cell: Some((2, token.clone())),
            ..Recorder::default()
        };

        let outcome = scanner.run(&img, &img, &token, &mut recorder)?;

        assert!(matches!(outcome, ScanOutcome::Aborted));
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 3);
        assert!(recorder.cell_updates.iter().all(|c| c.id <= 2));
        assert_eq!(recorder.states.last(), Some(&ScanState::Aborted));
        assert!(!recorder.states.contains(&ScanState::Fusing));
        Ok(())
    }

    #[test]
    fn test_cancelled_before_start() -> anyhow::Result<()> {
        let img = textured()?;
        let scanner = GridScanner::with_parts(config(2), Box::new(IdentityRegistrar), ScriptedScorer::new(vec![]));
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(scanner.run(&img, &img, &token, &mut ())?, ScanOutcome::Aborted));
        Ok(())
    }

    #[test]
    fn test_missing_images() -> anyhow::Result<()> {
        let scanner = GridScanner::new(&InspectionConfig::default())?;
        let outcome = scanner.run(&Mat::default(), &textured()?, &CancellationToken::new(), &mut ())?;
        assert!(matches!(outcome, ScanOutcome::MissingImages));
        Ok(())
    }

    #[test]
    fn test_failing_cell_is_skipped() -> anyhow::Result<()> {
        let img = textured()?;
        let scorer = ScriptedScorer::new(vec![Some(95), None, Some(95), Some(95)]);
        let scanner = GridScanner::with_parts(config(2), Box::new(IdentityRegistrar), scorer);

        let ScanOutcome::Completed(report) = scanner.run(&img, &img, &CancellationToken::new(), &mut ())? else {
            panic!("scan did not complete");
        };
        assert_eq!(report.cells[1].status, CellStatus::Unscored);
        assert_eq!(report.unscored_cells, 1);
        assert!(report.defects.is_empty());
        Ok(())
    }

    #[test]
    fn test_non_fatal_registration_error_scans_originals() -> anyhow::Result<()> {
        let img = textured()?;
        let scanner = GridScanner::with_parts(
            config(2),
            Box::new(FailingRegistrar(|| InspectError::Registration("no overlap".to_string()))),
            ScriptedScorer::new(vec![Some(90); 4]),
        );
        let ScanOutcome::Completed(report) = scanner.run(&img, &img, &CancellationToken::new(), &mut ())? else {
            panic!("scan did not complete");
        };
        assert_eq!(report.registration_tier, None);
        assert_eq!(report.crop, Rect::new(0, 0, 400, 400));
        assert_eq!(report.cells.len(), 4);
        Ok(())
    }

    #[test]
    fn test_missing_capability_is_fatal() -> anyhow::Result<()> {
        let img = textured()?;
        let scanner = GridScanner::with_parts(
            config(2),
            Box::new(FailingRegistrar(|| InspectError::CapabilityUnavailable("no ORB".to_string()))),
            ScriptedScorer::new(vec![]),
        );
        let result = scanner.run(&img, &img, &CancellationToken::new(), &mut ());
        assert!(matches!(result, Err(InspectError::CapabilityUnavailable(_))));
        Ok(())
    }

    #[test]
    fn test_parallel_workers_match_sequential() -> anyhow::Result<()> {
        let reference = textured()?;
        let test = with_patch(&reference, Rect::new(130, 30, 40, 40), 255.0)?;
        let registrar = || Box::new(IdentityRegistrar);

        let sequential = GridScanner::with_parts(config(4), registrar(), Arc::new(NccScorer::default()));
        let parallel = GridScanner::with_parts(
            ScanConfig {
                worker_count: 3,
                ..config(4)
            },
            registrar(),
            Arc::new(NccScorer::default()),
        );

        let token = CancellationToken::new();
        let (ScanOutcome::Completed(a), ScanOutcome::Completed(b)) = (
            sequential.run(&reference, &test, &token, &mut ())?,
            parallel.run(&reference, &test, &token, &mut ())?,
        ) else {
            panic!("scan did not complete");
        };
        assert_eq!(a.cells, b.cells);
        assert_eq!(a.defects, b.defects);
        assert_eq!(a.defects.len(), 1);
        assert_eq!(a.defects[0].rect, Rect::new(100, 0, 100, 100));
        Ok(())
    }

    #[test]
    fn test_parallel_abort_stops_dispatch() -> anyhow::Result<()> {
        let img = textured()?;
        let scorer = ScriptedScorer::slow(vec![Some(10); 16], std::time::Duration::from_millis(25));
        let scanner = GridScanner::with_parts(
            ScanConfig {
                worker_count: 3,
                ..config(4)
            },
            Box::new(IdentityRegistrar),
            scorer.clone(),
        );
        let token = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_after_cell: Some((2, token.clone())),
            ..Recorder::default()
        };

        let outcome = scanner.run(&img, &img, &token, &mut recorder)?;

        assert!(matches!(outcome, ScanOutcome::Aborted));
        assert!(scorer.calls.load(Ordering::SeqCst) < 16);
        assert_eq!(recorder.states.last(), Some(&ScanState::Aborted));
        assert!(!recorder.states.contains(&ScanState::Fusing));

        // The commit that cancelled is the last cell update observed.
        let last = recorder.cell_updates.last().expect("cell updates");
        assert_eq!(last.id, 2);
        assert_eq!(last.status, CellStatus::Defect);

        // Every cell is committed at most once.
        let mut committed: Vec<usize> = recorder
            .cell_updates
            .iter()
            .filter(|c| c.status != CellStatus::Analyzing)
            .map(|c| c.id)
            .collect();
        let count = committed.len();
        committed.sort_unstable();
        committed.dedup();
        assert_eq!(committed.len(), count);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = InspectionConfig::default();
        config.scorer.blur_kernel = 4;
        assert!(matches!(GridScanner::new(&config), Err(InspectError::Config(_))));
    }

    #[test]
    fn test_spawned_scan_streams_events() -> anyhow::Result<()> {
        let img = textured()?;
        let scanner = GridScanner::with_parts(config(2), Box::new(IdentityRegistrar), Arc::new(NccScorer::default()));
        let handle = scanner.spawn(img.try_clone()?, img);

        let events: Vec<ScanEvent> = handle.events.iter().collect();
        let outcome = handle.wait()?;

        assert!(matches!(outcome, ScanOutcome::Completed(ref r) if r.defects.is_empty()));
        assert!(events.contains(&ScanEvent::State(ScanState::Done)));
        assert_eq!(events.iter().filter(|e| matches!(e, ScanEvent::Grid(_))).count(), 1);
        Ok(())
    }
}
