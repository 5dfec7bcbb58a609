//! Named log categories attached to indexing log lines as `log_event`.

/// Closed set of log categories emitted by the consumer and the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    EntityNotFound,
    Unauthorized,
    IndexUpdateFailed,
    IndexRemoveFailed,
    Timeout,
    ContextFailed,
    MalformedMessage,
    SweepStarted,
    SweepCompleted,
    SweepSkipped,
    StampFailed,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEvent::EntityNotFound => "entity_not_found",
            LogEvent::Unauthorized => "unauthorized",
            LogEvent::IndexUpdateFailed => "index_update_failed",
            LogEvent::IndexRemoveFailed => "index_remove_failed",
            LogEvent::Timeout => "timeout",
            LogEvent::ContextFailed => "context_failed",
            LogEvent::MalformedMessage => "malformed_message",
            LogEvent::SweepStarted => "sweep_started",
            LogEvent::SweepCompleted => "sweep_completed",
            LogEvent::SweepSkipped => "sweep_skipped",
            LogEvent::StampFailed => "stamp_failed",
        }
    }
}

impl std::fmt::Display for LogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
