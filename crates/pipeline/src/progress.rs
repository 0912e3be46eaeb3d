//! Progress reporting seam between the pipelines and their caller.

use deid_model::ProgressEvent;

/// Receives progress events. Closures taking a [`ProgressEvent`] implement
/// it.
pub trait ProgressSink {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent),
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event.
pub fn no_progress(_event: ProgressEvent) {}

#[cfg(test)]
mod tests {
    use super::*;
    use deid_model::ProgressPhase;
    use std::cell::RefCell;

    #[test]
    fn test_closure_receives_events() {
        let seen = RefCell::new(Vec::new());
        let sink = |event: ProgressEvent| seen.borrow_mut().push(event.current);
        sink.report(ProgressEvent::new(ProgressPhase::Encoding, 1, 3, "a"));
        sink.report(ProgressEvent::new(ProgressPhase::Encoding, 2, 3, "b"));
        assert_eq!(*seen.borrow(), vec![1, 2]);
        no_progress.report(ProgressEvent::new(ProgressPhase::Completed, 0, 0, ""));
    }
}
