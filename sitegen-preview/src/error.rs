use thiserror::Error;

pub type PreviewResult<T> = Result<T, PreviewError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Unknown style property '{name}'. Expected one of: padding, margin, backgroundColor, color, fontSize")]
    UnknownStyleProperty { name: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PreviewError {
    fn from(err: std::io::Error) -> Self {
        PreviewError::Io(err.to_string())
    }
}
