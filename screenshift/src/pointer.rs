/*!
Pointer sources and the sampler turning them into a pixel target.
*/

use mouse_position::mouse_position::Mouse;
use shared::{sample_pointer_offset, DisplayRegion, Point};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Where the pointer is and which displays it can be on.
///
/// Implemented by whatever owns the windowing system; the control loop only
/// ever asks for the current values.
pub trait PointerSource: Send {
    /// Current pointer location in global coordinates, if known
    fn pointer_position(&self) -> Option<Point>;

    /// Bounds of every known display
    fn display_regions(&self) -> &[DisplayRegion];
}

/// Produces the raw pixel target for the next command
pub struct PointerSampler<P> {
    source: P,
}

impl<P: PointerSource> PointerSampler<P> {
    pub fn new(source: P) -> Self {
        Self { source }
    }

    /// Offset of the pointer from the midpoint of its display, 0 if unknown
    pub fn sample(&self) -> f64 {
        match self.source.pointer_position() {
            Some(pointer) => sample_pointer_offset(pointer, self.source.display_regions()),
            None => 0.0,
        }
    }
}

/// Pointer position handed over from another thread, typically the GUI.
///
/// Only the latest position is kept.
pub struct SharedPointer {
    position: watch::Receiver<Option<Point>>,
    regions: Vec<DisplayRegion>,
}

/// Writing half of a [`SharedPointer`]
#[derive(Debug)]
pub struct PointerFeed {
    tx: watch::Sender<Option<Point>>,
}

impl PointerFeed {
    pub fn update(&self, position: Point) {
        self.tx.send_replace(Some(position));
    }

    /// Pointer left every known display
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl SharedPointer {
    pub fn new(regions: Vec<DisplayRegion>) -> (PointerFeed, Self) {
        let (tx, position) = watch::channel(None);
        (PointerFeed { tx }, Self { position, regions })
    }
}

impl PointerSource for SharedPointer {
    fn pointer_position(&self) -> Option<Point> {
        *self.position.borrow()
    }

    fn display_regions(&self) -> &[DisplayRegion] {
        &self.regions
    }
}

/// The operating system's pointer, queried on every sample.
///
/// Display bounds come from configuration.
pub struct SystemPointer {
    regions: Vec<DisplayRegion>,
}

impl SystemPointer {
    pub fn new(regions: Vec<DisplayRegion>) -> Self {
        Self { regions }
    }
}

/// Global pointer location from a platform query, if it succeeded
fn mouse_location(mouse: Mouse) -> Option<Point> {
    match mouse {
        Mouse::Position { x, y } => Some(Point::new(x as f64, y as f64)),
        Mouse::Error => None,
    }
}

impl PointerSource for SystemPointer {
    fn pointer_position(&self) -> Option<Point> {
        mouse_location(Mouse::get_mouse_position())
    }

    fn display_regions(&self) -> &[DisplayRegion] {
        &self.regions
    }
}

/// Synthetic pointer sweeping across the first display and back.
///
/// Stands in for the windowing system when running without one.
pub struct SweepPointer {
    regions: Vec<DisplayRegion>,
    period: Duration,
    started: Instant,
}

impl SweepPointer {
    pub fn new(regions: Vec<DisplayRegion>, period: Duration) -> Self {
        Self {
            regions,
            period,
            started: Instant::now(),
        }
    }

    /// Position at `elapsed` into the sweep: left edge, right edge, left edge
    pub fn position_at(&self, elapsed: Duration) -> Option<Point> {
        let region = self.regions.first()?;
        let period = self.period.as_secs_f64();
        if period <= 0.0 {
            return Some(Point::new(region.x + region.width / 2.0, region.y + region.height / 2.0));
        }

        let phase = (elapsed.as_secs_f64() % period) / period;
        let triangle = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
        // Stay inside the half-open bounds
        let x = region.x + triangle * (region.width - 1.0).max(0.0);
        Some(Point::new(x, region.y + region.height / 2.0))
    }
}

impl PointerSource for SweepPointer {
    fn pointer_position(&self) -> Option<Point> {
        self.position_at(self.started.elapsed())
    }

    fn display_regions(&self) -> &[DisplayRegion] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Vec<DisplayRegion> {
        vec![DisplayRegion::new(0.0, 0.0, 1920.0, 1080.0).unwrap()]
    }

    #[test]
    fn test_shared_pointer_tracks_latest_update() {
        let (feed, source) = SharedPointer::new(screen());
        let sampler = PointerSampler::new(source);
        assert_eq!(sampler.sample(), 0.0);

        feed.update(Point::new(100.0, 10.0));
        feed.update(Point::new(1460.0, 10.0));
        assert_eq!(sampler.sample(), 500.0);

        feed.clear();
        assert_eq!(sampler.sample(), 0.0);
    }

    #[test]
    fn test_pointer_outside_displays_samples_zero() {
        let (feed, source) = SharedPointer::new(screen());
        let sampler = PointerSampler::new(source);
        feed.update(Point::new(2500.0, 10.0));
        assert_eq!(sampler.sample(), 0.0);
    }

    #[test]
    fn test_system_pointer_location() {
        assert_eq!(
            mouse_location(Mouse::Position { x: 1460, y: -20 }),
            Some(Point::new(1460.0, -20.0))
        );
        assert_eq!(mouse_location(Mouse::Error), None);

        let system = SystemPointer::new(screen());
        assert_eq!(system.display_regions(), screen().as_slice());
    }

    #[test]
    fn test_sweep_covers_the_display() {
        let sweep = SweepPointer::new(screen(), Duration::from_secs(4));

        let start = sweep.position_at(Duration::ZERO).unwrap();
        assert_eq!(start.x, 0.0);

        let middle = sweep.position_at(Duration::from_secs(1)).unwrap();
        assert!((middle.x - 959.5).abs() < 1e-9);

        let far = sweep.position_at(Duration::from_secs(2)).unwrap();
        assert_eq!(far.x, 1919.0);
        assert!(screen()[0].contains(far));

        let back = sweep.position_at(Duration::from_secs(4)).unwrap();
        assert_eq!(back.x, 0.0);
    }

    #[test]
    fn test_sweep_without_displays() {
        let sweep = SweepPointer::new(Vec::new(), Duration::from_secs(4));
        assert!(sweep.pointer_position().is_none());
        assert_eq!(PointerSampler::new(sweep).sample(), 0.0);
    }
}
