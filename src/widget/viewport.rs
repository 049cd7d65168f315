//! Visual viewport tracking
//!
//! On narrow screens the on-screen keyboard shrinks the visible area, so the
//! expanded widget sizes itself to the live viewport instead of the window.

use tokio::sync::watch;

/// Visible area of the page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// Distance from the layout viewport top (non-zero while a keyboard pans)
    pub offset_top: f64,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            offset_top: 0.0,
        }
    }

    #[must_use]
    pub const fn with_offset_top(mut self, offset_top: f64) -> Self {
        self.offset_top = offset_top;
        self
    }

    #[must_use]
    pub fn is_narrow(&self, breakpoint: f64) -> bool {
        self.width < breakpoint
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 800.0)
    }
}

/// Source of viewport measurements
pub trait ViewportObserver: Send + Sync {
    /// Latest measurement
    fn current(&self) -> Viewport;

    /// Subscribe to changes
    fn watch(&self) -> watch::Receiver<Viewport>;
}

/// Viewport fed by whoever owns the real measurements
#[derive(Debug)]
pub struct SharedViewport {
    tx: watch::Sender<Viewport>,
}

impl SharedViewport {
    #[must_use]
    pub fn new(initial: Viewport) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new measurement; unchanged values are not re-announced
    pub fn update(&self, viewport: Viewport) {
        self.tx.send_if_modified(|current| {
            if *current == viewport {
                false
            } else {
                *current = viewport;
                true
            }
        });
    }
}

impl Default for SharedViewport {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl ViewportObserver for SharedViewport {
    fn current(&self) -> Viewport {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<Viewport> {
        self.tx.subscribe()
    }
}
