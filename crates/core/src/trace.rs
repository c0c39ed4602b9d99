//! Trace metadata for scheduling calls
//!
//! Carried through acquire/execute calls purely for logging; never affects
//! admission or ordering decisions.

/// Correlation metadata attached to an accelerator request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// Owning user session, if any.
    pub session_id: Option<String>,
    /// Utterance sequence number within the session.
    pub utterance_index: Option<u64>,
    /// External job identifier (e.g. a scheduler job id).
    pub job_id: Option<String>,
}

impl TraceContext {
    /// Empty trace for callers outside any session.
    pub fn none() -> Self {
        Self::default()
    }

    /// Trace for an utterance within a session.
    pub fn for_utterance(session_id: impl Into<String>, utterance_index: u64) -> Self {
        Self {
            session_id: Some(session_id.into()),
            utterance_index: Some(utterance_index),
            job_id: None,
        }
    }

    /// Attach an external job id.
    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

impl std::fmt::Display for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut wrote = false;
        if let Some(s) = &self.session_id {
            write!(f, "session={}", s)?;
            wrote = true;
        }
        if let Some(i) = self.utterance_index {
            write!(f, "{}utterance={}", if wrote { " " } else { "" }, i)?;
            wrote = true;
        }
        if let Some(j) = &self.job_id {
            write!(f, "{}job={}", if wrote { " " } else { "" }, j)?;
            wrote = true;
        }
        if !wrote {
            f.write_str("-")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trace_displays_dash() {
        assert_eq!(TraceContext::none().to_string(), "-");
    }

    #[test]
    fn test_utterance_trace_display() {
        let trace = TraceContext::for_utterance("s1", 3).with_job("job-9");
        assert_eq!(trace.to_string(), "session=s1 utterance=3 job=job-9");
    }
}
