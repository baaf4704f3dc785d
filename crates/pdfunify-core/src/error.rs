use lopdf::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnifyError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Object {missing:?} referenced from {referenced_by:?} does not exist in the source")]
    GraphIntegrityError {
        missing: ObjectId,
        referenced_by: ObjectId,
    },

    #[error("Failed to render graphic: {0}")]
    RenderError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Precondition violated: {0}")]
    PreconditionError(String),

    #[error("Invalid input: {0}")]
    InputError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, UnifyError>;
