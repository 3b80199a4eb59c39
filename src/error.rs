pub type FlowResult<T> = Result<T, FlowError>;

#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    #[error("{stage} shader compile failed: {log}")]
    ShaderCompile { stage: &'static str, log: String },

    #[error("program link failed: {0}")]
    ProgramLink(String),

    #[error("gpu resource error: {0}")]
    Resource(String),

    #[error("point pass used before setup")]
    NotReady,

    #[error("renderer is busy with another call")]
    Busy,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_are_stable() {
        let err = FlowError::ShaderCompile {
            stage: "vertex",
            log: "0:1: syntax error".into(),
        };
        assert_eq!(err.to_string(), "vertex shader compile failed: 0:1: syntax error");
        assert!(FlowError::ProgramLink("x".into())
            .to_string()
            .contains("program link failed:"));
        assert!(FlowError::resource("x").to_string().contains("gpu resource error:"));
    }

    #[test]
    fn test_io_preserves_source() {
        let err = FlowError::from(std::io::Error::other("boom"));
        assert!(err.to_string().contains("boom"));
    }
}
