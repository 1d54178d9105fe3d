// Copyright @yucwang 2026

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::accumulator::Accumulator;
use crate::core::error::RenderError;
use crate::core::presenter::Presenter;
use crate::core::sample_source::SampleSource;
use crate::dispatch::{Completion, Dispatcher, DispatcherConfig, ShutdownMode, WorkRequest};

use super::renderer::Renderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    /// Number of samples merged before the session ends.
    pub samples: u32,
    pub workers: usize,
    /// Upper bound on requests dispatched but not yet completed.
    pub in_flight: usize,
    /// Present after every this many merges (and always after the last one).
    pub present_every: u32,
    /// Lost requests re-dispatched over the whole session before giving up.
    pub max_retries: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let workers = DispatcherConfig::default().workers;
        Self {
            width: 320,
            height: 200,
            samples: 64,
            workers,
            in_flight: workers * 2,
            present_every: 1,
            max_retries: 3,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::Settings(format!("image size {}x{} is empty", self.width, self.height)));
        }
        if self.samples == 0 {
            return Err(RenderError::Settings(String::from("samples must be at least 1")));
        }
        if self.present_every == 0 {
            return Err(RenderError::Settings(String::from("present_every must be at least 1")));
        }
        if self.in_flight == 0 {
            return Err(RenderError::Settings(String::from("in_flight must be at least 1")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub merged: u32,
    pub lost: u32,
    pub retried: u32,
    pub presented: u32,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub accumulator: Accumulator,
    pub stats: RenderStats,
}

/// Renders by averaging samples produced on a worker pool, presenting the
/// running estimate as it improves.
pub struct ProgressiveRenderer {
    settings: RenderSettings,
    source: Arc<dyn SampleSource>,
    show_progress: bool,
}

impl ProgressiveRenderer {
    pub fn new(settings: RenderSettings, source: Arc<dyn SampleSource>) -> Self {
        Self { settings, source, show_progress: false }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(self.settings.samples as u64);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} samples")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress
    }

    fn run(
        &self,
        dispatcher: &mut Dispatcher,
        accumulator: &mut Accumulator,
        presenter: &mut dyn Presenter,
        progress: &ProgressBar,
        stats: &mut RenderStats,
    ) -> Result<(), RenderError> {
        let settings = &self.settings;
        let work = WorkRequest::new(settings.width, settings.height)?;
        let mut to_dispatch = settings.samples;

        loop {
            while to_dispatch > 0 && dispatcher.pending() < settings.in_flight {
                dispatcher.dispatch(work)?;
                to_dispatch -= 1;
            }

            let completion = match dispatcher.next() {
                Some(completion) => completion,
                None => break,
            };

            match completion {
                Completion::Completed { request, buffer } => {
                    accumulator.merge(&buffer)?;
                    stats.merged += 1;
                    progress.inc(1);
                    log::debug!("merged {} ({} samples)", request, accumulator.sample_count());

                    if stats.merged % settings.present_every == 0 || stats.merged == settings.samples {
                        presenter.display(&accumulator.to_display_image()?)?;
                        stats.presented += 1;
                    }
                }
                Completion::Lost(lost) => {
                    stats.lost += 1;
                    if stats.retried >= settings.max_retries {
                        return Err(RenderError::RetriesExhausted { retries: stats.retried, last: lost });
                    }
                    stats.retried += 1;
                    to_dispatch += 1;
                    log::warn!("{}, retrying ({}/{})", lost, stats.retried, settings.max_retries);
                }
            }
        }
        Ok(())
    }
}

impl Renderer for ProgressiveRenderer {
    fn render(&self, presenter: &mut dyn Presenter) -> Result<RenderOutcome, RenderError> {
        self.settings.validate()?;
        let start = Instant::now();
        log::info!(
            "rendering {}x{} with {} samples from {}",
            self.settings.width,
            self.settings.height,
            self.settings.samples,
            self.source.describe()
        );

        let mut accumulator = Accumulator::new(self.settings.width, self.settings.height)?;
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&self.source),
            DispatcherConfig { workers: self.settings.workers },
        )?;
        let progress = self.progress_bar();
        let mut stats = RenderStats::default();

        let result = self.run(&mut dispatcher, &mut accumulator, presenter, &progress, &mut stats);
        progress.finish_and_clear();
        match result {
            Ok(()) => {
                dispatcher.shutdown(ShutdownMode::Drain);
            }
            Err(err) => {
                dispatcher.shutdown(ShutdownMode::Cancel);
                return Err(err);
            }
        }

        stats.elapsed = start.elapsed();
        log::info!(
            "finished {} samples in {:.2?} ({} lost, {} frames presented)",
            stats.merged,
            stats.elapsed,
            stats.lost,
            stats.presented
        );
        Ok(RenderOutcome { accumulator, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{LostReason, PresentError};
    use crate::math::buffer::{DisplayImage, SampleBuffer};
    use crate::presenters::LatestFramePresenter;
    use crate::sources::ConstantSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(samples: u32, workers: usize) -> RenderSettings {
        RenderSettings {
            width: 4,
            height: 3,
            samples,
            workers,
            in_flight: workers * 2,
            present_every: 1,
            max_retries: 2,
        }
    }

    /// Returns 1.0 on even calls and 0.0 on odd ones.
    struct Alternating {
        calls: AtomicUsize,
    }

    impl SampleSource for Alternating {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let value = if call % 2 == 0 { 1.0 } else { 0.0 };
            vec![value; (width * height * 4) as usize]
        }
    }

    /// Panics on the listed calls.
    struct Flaky {
        calls: AtomicUsize,
        failing: Vec<usize>,
    }

    impl SampleSource for Flaky {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&call) {
                panic!("flaky call {}", call);
            }
            vec![0.5; (width * height * 4) as usize]
        }
    }

    struct Counting {
        sizes: Vec<(u32, u32)>,
    }

    impl Presenter for Counting {
        fn display(&mut self, image: &DisplayImage) -> Result<(), PresentError> {
            self.sizes.push((image.width(), image.height()));
            Ok(())
        }
    }

    #[test]
    fn test_progressive_render_averages_all_samples() {
        let source = Arc::new(ConstantSource::new([0.25, 0.5, 1.0, 1.0]));
        let renderer = ProgressiveRenderer::new(settings(10, 3), source);
        let mut presenter = LatestFramePresenter::new();

        let outcome = renderer.render(&mut presenter).unwrap();
        assert_eq!(outcome.accumulator.sample_count(), 10);
        assert_eq!(outcome.stats.merged, 10);
        assert_eq!(outcome.stats.presented, 10);
        assert_eq!(presenter.frames(), 10);

        let frame = presenter.latest().unwrap();
        assert_eq!(frame.pixel(3, 2), Some([64, 128, 255, 255]));
    }

    #[test]
    fn test_final_average_is_order_independent() {
        let source = Arc::new(Alternating { calls: AtomicUsize::new(0) });
        let renderer = ProgressiveRenderer::new(settings(8, 4), source);
        let outcome = renderer.render(&mut LatestFramePresenter::new()).unwrap();
        let average = outcome.accumulator.average().unwrap();
        assert!(average.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_present_every_still_shows_last_frame() {
        let source = Arc::new(ConstantSource::new([1.0; 4]));
        let mut config = settings(7, 2);
        config.present_every = 3;
        let mut presenter = Counting { sizes: Vec::new() };
        let outcome = ProgressiveRenderer::new(config, source).render(&mut presenter).unwrap();
        // After merges 3, 6 and 7.
        assert_eq!(outcome.stats.presented, 3);
        assert_eq!(presenter.sizes, vec![(4, 3); 3]);
    }

    #[test]
    fn test_lost_samples_are_redispatched() {
        let source = Arc::new(Flaky { calls: AtomicUsize::new(0), failing: vec![1] });
        let outcome = ProgressiveRenderer::new(settings(5, 1), source)
            .render(&mut LatestFramePresenter::new())
            .unwrap();
        assert_eq!(outcome.accumulator.sample_count(), 5);
        assert_eq!(outcome.stats.lost, 1);
        assert_eq!(outcome.stats.retried, 1);
    }

    #[test]
    fn test_retry_budget_is_enforced() {
        let source = Arc::new(Flaky { calls: AtomicUsize::new(0), failing: (0..100).collect() });
        let err = ProgressiveRenderer::new(settings(2, 1), source)
            .render(&mut LatestFramePresenter::new())
            .unwrap_err();
        match err {
            RenderError::RetriesExhausted { retries, last } => {
                assert_eq!(retries, 2);
                assert!(matches!(last.reason, LostReason::Panicked(_)));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let source = Arc::new(ConstantSource::new([0.0; 4]));
        let mut config = settings(0, 1);
        assert!(config.validate().is_err());
        config.samples = 1;
        config.width = 0;
        let err = ProgressiveRenderer::new(config, source).render(&mut LatestFramePresenter::new());
        assert!(matches!(err, Err(RenderError::Settings(_))));
        assert!(RenderSettings::default().validate().is_ok());
    }
}
