use std::fmt;

/// The semantic error categories from spec §7. These are kinds, not
/// concrete Rust types per source-system — every failure in the sync path
/// is classified into one of these so the scheduler can record
/// `metadata.error_type` verbatim without inspecting the error's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed connector config, missing required field, unknown connector.
    Config,
    /// Connection check returned FAILED, subprocess failed to start.
    Connect,
    /// Unparseable message, missing expected CATALOG/SPEC.
    Protocol,
    /// Subprocess or DB statement exceeded its budget.
    Timeout,
    /// A batch insert failed both initial and fallback attempts.
    Write,
    /// Version mismatch or corrupted persisted state.
    State,
    /// PII/quality/lineage failure: caught, recorded, never fails the sync.
    Advisory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Connect => "ConnectError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Write => "WriteError",
            ErrorKind::State => "StateError",
            ErrorKind::Advisory => "AdvisoryError",
        };
        write!(f, "{s}")
    }
}

/// An error bubbling up from the sync path, carrying the context spec §7
/// requires the scheduler to record verbatim: which source/stream/run it
/// happened in and which orchestrator step raised it.
#[derive(Debug, Clone)]
pub struct ElError {
    pub kind: ErrorKind,
    pub message: String,
    pub source_id: Option<String>,
    pub stream: Option<String>,
    pub run_id: Option<String>,
    pub step: Option<&'static str>,
}

impl ElError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ElError {
            kind,
            message: message.into(),
            source_id: None,
            stream: None,
            run_id: None,
            step: None,
        }
    }

    pub fn with_context(
        mut self,
        source_id: &str,
        stream: &str,
        run_id: &str,
        step: &'static str,
    ) -> Self {
        self.source_id = Some(source_id.to_string());
        self.stream = Some(stream.to_string());
        self.run_id = Some(run_id.to_string());
        self.step = Some(step);
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Config, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Connect, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Protocol, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Timeout, message)
    }

    pub fn write(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Write, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::State, message)
    }

    pub fn advisory(message: impl Into<String>) -> Self {
        ElError::new(ErrorKind::Advisory, message)
    }
}

impl fmt::Display for ElError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let (Some(source_id), Some(stream)) = (&self.source_id, &self.stream) {
            write!(f, " (source={source_id}, stream={stream}")?;
            if let Some(run_id) = &self.run_id {
                write!(f, ", run_id={run_id}")?;
            }
            if let Some(step) = &self.step {
                write!(f, ", step={step}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for ElError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_when_present() {
        let err = ElError::write("batch insert failed").with_context(
            "src-1",
            "users",
            "run-1",
            "raw_land",
        );
        let s = err.to_string();
        assert!(s.contains("WriteError"));
        assert!(s.contains("source=src-1"));
        assert!(s.contains("step=raw_land"));
    }

    #[test]
    fn display_omits_context_when_absent() {
        let err = ElError::config("missing field");
        assert_eq!(err.to_string(), "ConfigError: missing field");
    }
}
