use crate::sanitize::sanitize_selected_text;

/// Cap on passively captured selections, in characters. Longer selections are
/// dropped; the per-request cap of 1000 characters is enforced when the
/// selection is attached to a query.
pub const MAX_CAPTURED_SELECTION: usize = 500;

/// Where the current page selection comes from.
///
/// The host page adapts its selection API behind this trait; headless
/// environments plug in [`NoSelection`] and the observer degrades to a no-op.
pub trait SelectionSource {
    fn current_selection(&self) -> Option<String>;
}

/// Selection source for environments without a page (tests, prerendering).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelection;

impl SelectionSource for NoSelection {
    fn current_selection(&self) -> Option<String> {
        None
    }
}

/// Captures reader-highlighted text on pointer-release and touch-end events.
///
/// Only one observation session is active per instance: repeated `start`
/// calls are idempotent and `stop` without `start` is a no-op.
pub struct TextSelectionObserver<S> {
    source: S,
    callback: Box<dyn FnMut(String)>,
    observing: bool,
}

impl<S: SelectionSource> TextSelectionObserver<S> {
    pub fn new(source: S, callback: impl FnMut(String) + 'static) -> Self {
        TextSelectionObserver {
            source,
            callback: Box::new(callback),
            observing: false,
        }
    }

    pub fn start(&mut self) {
        self.observing = true;
    }

    pub fn stop(&mut self) {
        self.observing = false;
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Host hook for pointer-release events.
    pub fn pointer_released(&mut self) {
        self.capture();
    }

    /// Host hook for touch-end events.
    pub fn touch_ended(&mut self) {
        self.capture();
    }

    fn capture(&mut self) {
        if !self.observing {
            return;
        }
        let Some(raw) = self.source.current_selection() else {
            return;
        };
        let text = sanitize_selected_text(&raw);
        if text.is_empty() || text.chars().count() > MAX_CAPTURED_SELECTION {
            return;
        }
        (self.callback)(text);
    }
}
