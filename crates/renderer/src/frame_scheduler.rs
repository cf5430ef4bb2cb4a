//! Frame scheduling across N frames in flight.
//!
//! [`FrameScheduler::run_frame`] drives one iteration of the loop:
//!
//! ```text
//! 1. wait_for_slot     block on the slot's fence (bounds CPU lookahead to N)
//! 2. acquire           image index, signals the slot's image-available semaphore
//!                      out of date -> recreate, return; nothing below runs
//! 3. reset_slot        reset the fence and command buffer (only after 2 succeeded)
//! 4. record            render pass, binds, one indexed draw
//! 5. submit            wait image-available, signal render-finished + fence
//! 6. present           wait render-finished
//! 7. advance           slot = (slot + 1) % N
//!    recreate          if present was not clean or the surface was resized
//! ```
//!
//! The GPU side sits behind [`FrameBackend`] and the window behind
//! [`DrawableSurface`], so the ordering rules are testable without a device.

use tracing::{debug, warn};
use vkframe_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::error::RendererResult;

/// The window as seen by the frame loop.
pub trait DrawableSurface {
    /// Current drawable size in pixels; zero in either dimension while minimized.
    fn drawable_size(&self) -> (u32, u32);

    /// Returns and clears the externally raised resize flag.
    fn take_resized(&mut self) -> bool;

    /// Blocks until the platform delivers more events.
    ///
    /// Returns `false` once the window is closing, so callers stop waiting.
    fn wait_events(&mut self) -> bool;
}

/// Blocks on platform events until the drawable size is non-zero.
///
/// Returns `None` if the platform closes while the surface is still
/// minimized; nothing should be rebuilt then.
pub fn wait_for_drawable(surface: &mut dyn DrawableSurface) -> Option<(u32, u32)> {
    loop {
        match surface.drawable_size() {
            (0, _) | (_, 0) => {
                debug!("Drawable size is zero, waiting for events");
                if !surface.wait_events() {
                    return None;
                }
            }
            size => return Some(size),
        }
    }
}

/// GPU operations the scheduler sequences. `slot` is always `< frames_in_flight`.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()>;

    /// Requests the next presentable image, signaling the slot's
    /// image-available semaphore.
    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome>;

    /// Unsignals the slot's fence and resets its command buffer.
    fn reset_slot(&mut self, slot: usize) -> RendererResult<()>;

    /// Records the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()>;

    /// Submits the slot's command buffer to the graphics queue.
    fn submit(&mut self, slot: usize) -> RendererResult<()>;

    /// Presents `image_index` once the slot's rendering has finished.
    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome>;

    /// Rebuilds everything sized to the surface.
    fn recreate(&mut self, surface: &mut dyn DrawableSurface) -> RendererResult<()>;
}

/// What one iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented. `recreated` is set when the
    /// chain was rebuilt after the present.
    Presented { image_index: u32, recreated: bool },
    /// Acquire reported an out-of-date chain; it was rebuilt and nothing was
    /// rendered. The same slot is used next iteration.
    Recreated,
}

/// Round-robin frame slot scheduler.
#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    current_slot: usize,
}

impl FrameScheduler {
    /// Creates a scheduler cycling through `frames_in_flight` slots (at least 1).
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_slot: 0,
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next iteration will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Runs one iteration of the frame loop.
    ///
    /// # Errors
    ///
    /// Any backend error is fatal and returned as-is. Out-of-date and
    /// suboptimal surfaces are handled here and never returned.
    pub fn run_frame<B, S>(&mut self, backend: &mut B, surface: &mut S) -> RendererResult<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
        S: DrawableSurface,
    {
        let slot = self.current_slot;

        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire(slot)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date at acquire, recreating");
                backend.recreate(surface)?;
                return Ok(FrameOutcome::Recreated);
            }
        };

        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        let resized = surface.take_resized();
        self.current_slot = (slot + 1) % self.frames_in_flight;

        let recreated = presented.needs_recreate() || resized;
        if recreated {
            match presented {
                PresentOutcome::OutOfDate => warn!("Swapchain out of date at present"),
                PresentOutcome::Suboptimal => debug!("Swapchain suboptimal at present"),
                PresentOutcome::Presented => debug!("Surface resized"),
            }
            backend.recreate(surface)?;
        }

        Ok(FrameOutcome::Presented {
            image_index,
            recreated,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use super::DrawableSurface;

    /// Window stand-in whose size changes only through queued events.
    pub struct MockSurface {
        pub size: (u32, u32),
        pub resized: bool,
        /// Sizes delivered by successive `wait_events` calls; once empty the
        /// window reports that it is closing.
        pub pending_sizes: VecDeque<(u32, u32)>,
        pub waits: usize,
    }

    impl MockSurface {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                resized: false,
                pending_sizes: VecDeque::new(),
                waits: 0,
            }
        }
    }

    impl DrawableSurface for MockSurface {
        fn drawable_size(&self) -> (u32, u32) {
            self.size
        }

        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }

        fn wait_events(&mut self) -> bool {
            self.waits += 1;
            match self.pending_sizes.pop_front() {
                Some(size) => {
                    self.size = size;
                    true
                }
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use ash::vk;

    use super::mock::MockSurface;
    use super::*;
    use crate::recorder::mock::{RecordingRecorder, draw_inputs};
    use crate::recorder::record_draw;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Backend that logs calls, models one fence per slot, and records a
    /// real draw sequence into a [`RecordingRecorder`].
    struct MockBackend {
        calls: Vec<Call>,
        acquire_results: VecDeque<AcquireOutcome>,
        present_results: VecDeque<PresentOutcome>,
        fence_signaled: Vec<bool>,
        next_image: u32,
        image_count: u32,
        index_count: u32,
        extent: vk::Extent2D,
        recorder: RecordingRecorder,
    }

    impl MockBackend {
        fn new(frames: usize) -> Self {
            Self {
                calls: Vec::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                fence_signaled: vec![true; frames],
                next_image: 0,
                image_count: 3,
                index_count: 3,
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                recorder: RecordingRecorder::default(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()> {
            assert!(
                self.fence_signaled[slot],
                "waited on slot {} whose fence can never signal",
                slot
            );
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            let outcome = self.acquire_results.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Ready {
                    image_index,
                    suboptimal: false,
                }
            });
            Ok(outcome)
        }

        fn reset_slot(&mut self, slot: usize) -> RendererResult<()> {
            assert!(
                self.fence_signaled[slot],
                "slot {} reset while its previous submission was pending",
                slot
            );
            self.fence_signaled[slot] = false;
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            record_draw(
                &mut self.recorder,
                &draw_inputs(self.extent, self.index_count),
            );
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RendererResult<()> {
            self.calls.push(Call::Submit(slot));
            // The GPU finishes instantly.
            self.fence_signaled[slot] = true;
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .present_results
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recreate(&mut self, surface: &mut dyn DrawableSurface) -> RendererResult<()> {
            let Some((width, height)) = wait_for_drawable(surface) else {
                return Ok(());
            };
            self.extent = vk::Extent2D { width, height };
            self.calls.push(Call::Recreate);
            Ok(())
        }
    }

    #[test]
    fn test_single_frame_records_one_draw_and_presents_once() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        let mut surface = MockSurface::new(800, 600);

        let outcome = scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                recreated: false
            }
        );
        assert_eq!(backend.recorder.draw_counts(), vec![3]);
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 1);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_date_acquire_recreates_without_submit_or_present() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut surface = MockSurface::new(800, 600);

        let outcome = scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
        );
        assert!(backend.recorder.commands.is_empty());
        // The fence was never reset, so the retry can wait on it again.
        assert!(backend.fence_signaled[0]);
        assert_eq!(scheduler.current_slot(), 0);

        scheduler.run_frame(&mut backend, &mut surface).unwrap();
        assert_eq!(backend.count(|c| matches!(c, Call::Wait(0))), 2);
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 1);
    }

    #[test]
    fn test_fence_is_waited_before_reset_every_frame() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        let mut surface = MockSurface::new(800, 600);

        for _ in 0..5 {
            scheduler.run_frame(&mut backend, &mut surface).unwrap();
        }

        for (i, call) in backend.calls.iter().enumerate() {
            if let Call::Reset(slot) = call {
                let last_wait = backend.calls[..i]
                    .iter()
                    .rposition(|c| matches!(c, Call::Wait(_)))
                    .expect("reset without a preceding wait");
                assert_eq!(backend.calls[last_wait], Call::Wait(*slot));
                assert_eq!(backend.calls[last_wait + 1], Call::Acquire(*slot));
            }
        }
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        let mut surface = MockSurface::new(800, 600);

        let mut slots = Vec::new();
        for _ in 0..4 {
            slots.push(scheduler.current_slot());
            scheduler.run_frame(&mut backend, &mut surface).unwrap();
        }

        assert_eq!(slots, vec![0, 1, 0, 1]);
        assert_eq!(scheduler.current_slot(), 0);
    }

    #[test]
    fn test_suboptimal_present_presents_then_recreates() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.present_results.push_back(PresentOutcome::Suboptimal);
        let mut surface = MockSurface::new(800, 600);

        let outcome = scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 0,
                recreated: true
            }
        );
        let present = backend
            .calls
            .iter()
            .position(|c| matches!(c, Call::Present(..)))
            .unwrap();
        let recreate = backend
            .calls
            .iter()
            .position(|c| *c == Call::Recreate)
            .unwrap();
        assert!(present < recreate);
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquire_results.push_back(AcquireOutcome::Ready {
            image_index: 2,
            suboptimal: true,
        });
        let mut surface = MockSurface::new(800, 600);

        let outcome = scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                image_index: 2,
                recreated: false
            }
        );
        assert_eq!(backend.count(|c| *c == Call::Submit(0)), 1);
    }

    #[test]
    fn test_out_of_date_present_recreates() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.present_results.push_back(PresentOutcome::OutOfDate);
        let mut surface = MockSurface::new(800, 600);

        scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
    }

    #[test]
    fn test_resize_flag_triggers_recreate_after_present() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        let mut surface = MockSurface::new(800, 600);
        surface.resized = true;
        surface.size = (1024, 768);

        scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert!(!surface.resized);
        assert_eq!(
            backend.extent,
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );

        // The next frame draws at the new size with no further rebuild.
        scheduler.run_frame(&mut backend, &mut surface).unwrap();
        assert_eq!(backend.count(|c| *c == Call::Recreate), 1);
    }

    #[test]
    fn test_minimized_surface_blocks_recreate_until_visible() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut surface = MockSurface::new(0, 0);
        surface.pending_sizes.extend([(0, 0), (0, 0), (640, 480)]);

        scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(surface.waits, 3);
        assert_eq!(
            backend.extent,
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_closing_while_minimized_skips_rebuild() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquire_results.push_back(AcquireOutcome::OutOfDate);
        let mut surface = MockSurface::new(0, 0);

        let outcome = scheduler.run_frame(&mut backend, &mut surface).unwrap();

        assert_eq!(outcome, FrameOutcome::Recreated);
        assert_eq!(surface.waits, 1);
        assert_eq!(backend.calls, vec![Call::Wait(0), Call::Acquire(0)]);
        assert_eq!(
            backend.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_wait_for_drawable_returns_at_once_when_visible() {
        let mut surface = MockSurface::new(800, 600);
        assert_eq!(wait_for_drawable(&mut surface), Some((800, 600)));
        assert_eq!(surface.waits, 0);
    }

    #[test]
    fn test_wait_for_drawable_blocks_on_either_zero_dimension() {
        let mut surface = MockSurface::new(1024, 0);
        surface.pending_sizes.extend([(0, 768), (0, 0), (1024, 768)]);

        assert_eq!(wait_for_drawable(&mut surface), Some((1024, 768)));
        assert_eq!(surface.waits, 3);
    }

    #[test]
    fn test_wait_for_drawable_gives_up_when_closing() {
        let mut surface = MockSurface::new(0, 0);
        surface.pending_sizes.push_back((0, 0));

        assert_eq!(wait_for_drawable(&mut surface), None);
        assert_eq!(surface.waits, 2);
    }

    #[test]
    fn test_zero_frames_in_flight_is_clamped() {
        assert_eq!(FrameScheduler::new(0).frames_in_flight(), 1);
    }
}
