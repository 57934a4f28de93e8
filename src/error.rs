use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Stream `{locator}` is unavailable: {reason}")]
    StreamUnavailable { locator: String, reason: String },

    #[error("Stream ended after {consecutive_failures} consecutive failed reads")]
    StreamEnded { consecutive_failures: u32 },

    #[error("Frame read failed: {0}")]
    FrameRead(String),

    #[error("Model inference failed: {0}")]
    ModelInference(String),

    #[error("Assignment is degenerate: {0}")]
    AssignmentDegenerate(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Output sink closed: {0}")]
    Sink(String),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Per-frame failures the pipeline recovers from locally.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::FrameRead(_) | Error::ModelInference(_) | Error::AssignmentDegenerate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::ModelInference("oom".into()).is_transient());
        assert!(Error::AssignmentDegenerate("empty".into()).is_transient());
        assert!(!Error::StreamEnded {
            consecutive_failures: 3
        }
        .is_transient());
        assert!(!Error::StreamUnavailable {
            locator: "rtsp://cam".into(),
            reason: "refused".into()
        }
        .is_transient());
    }
}
