//! Expand/collapse state of the widget
//!
//! The widget starts as a collapsed prompt bar. Anything that shows intent to
//! chat expands it; only the explicit close action, offered on narrow
//! viewports, collapses it again.

use super::viewport::Viewport;
use crate::config::WidgetConfig;

/// Presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Collapsed,
    Expanded,
}

/// What caused the widget to expand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandTrigger {
    MessageAppended,
    InputFocused,
    InputClicked,
    VoiceCapture,
}

/// Geometry the front-end should render
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShellLayout {
    /// Inline prompt bar of fixed height
    Bar { height: f64 },
    /// Inline conversation panel (wide viewports)
    Panel,
    /// Full-screen overlay sized to the visual viewport
    Overlay { height: f64, top: f64 },
}

/// Expand/collapse state machine
#[derive(Debug, Clone)]
pub struct Shell {
    mode: UiMode,
    narrow_breakpoint: f64,
    collapsed_height: f64,
}

impl Shell {
    #[must_use]
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            mode: UiMode::Collapsed,
            narrow_breakpoint: config.narrow_breakpoint,
            collapsed_height: config.collapsed_height,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> UiMode {
        self.mode
    }

    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.mode == UiMode::Expanded
    }

    /// Expand; returns true if the mode changed
    pub fn expand(&mut self, trigger: ExpandTrigger) -> bool {
        if self.is_expanded() {
            return false;
        }
        tracing::debug!(?trigger, "widget expanded");
        self.mode = UiMode::Expanded;
        true
    }

    /// Whether the close action is offered
    #[must_use]
    pub fn can_close(&self, viewport: &Viewport) -> bool {
        self.is_expanded() && viewport.is_narrow(self.narrow_breakpoint)
    }

    /// Collapse via the explicit close action; returns true if the mode changed
    pub fn close(&mut self, viewport: &Viewport) -> bool {
        if !self.can_close(viewport) {
            return false;
        }
        tracing::debug!("widget collapsed");
        self.mode = UiMode::Collapsed;
        true
    }

    /// Whether the layout follows the visual viewport right now
    #[must_use]
    pub fn tracks_viewport(&self, viewport: &Viewport) -> bool {
        self.can_close(viewport)
    }

    #[must_use]
    pub fn layout(&self, viewport: &Viewport) -> ShellLayout {
        match self.mode {
            UiMode::Collapsed => ShellLayout::Bar {
                height: self.collapsed_height,
            },
            UiMode::Expanded if viewport.is_narrow(self.narrow_breakpoint) => {
                ShellLayout::Overlay {
                    height: viewport.height,
                    top: viewport.offset_top,
                }
            }
            UiMode::Expanded => ShellLayout::Panel,
        }
    }
}
