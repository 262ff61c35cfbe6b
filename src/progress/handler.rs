//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while the heal loop runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started for a source
    Started { source: String, run_id: String },

    /// Intent extraction finished
    IntentExtracted {
        language: String,
        entry_point: Option<String>,
        port: Option<u16>,
        scan_time: Duration,
    },

    /// A new propose/build/validate cycle began
    AttemptStarted { attempt: u32, max_attempts: u32 },

    /// The architect returned a definition
    DefinitionProposed {
        attempt: u32,
        stages: usize,
        response_time: Duration,
    },

    /// The architect failed for this attempt
    GenerationFailed { attempt: u32, error: String },

    BuildStarted { attempt: u32, image_ref: String },

    BuildComplete {
        attempt: u32,
        success: bool,
        build_time: Duration,
    },

    ValidationStarted { attempt: u32 },

    ValidationComplete {
        attempt: u32,
        passed: bool,
        reason: Option<String>,
    },

    /// Loop ended with a tagged image
    Completed {
        attempts: u32,
        image_ref: String,
        total_time: Duration,
    },

    /// Loop ended without an image
    Failed { attempts: u32, error: String },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::Started {
            source: "/test".to_string(),
            run_id: "abc".to_string(),
        });
        handler.on_progress(&ProgressEvent::AttemptStarted {
            attempt: 1,
            max_attempts: 3,
        });
        handler.on_progress(&ProgressEvent::Completed {
            attempts: 1,
            image_ref: "app:latest".to_string(),
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::ValidationStarted { attempt: 2 };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("ValidationStarted"));
        assert!(debug_str.contains("attempt: 2"));
    }
}
