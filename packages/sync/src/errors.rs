use massing_common::{Classify, ErrorKind};
use massing_document::DocumentError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Desync: server is at {expected:#010x}, batch assumed {actual:#010x}")]
    Desync { expected: u32, actual: u32 },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Client {0} is not connected")]
    UnknownClient(u8),

    #[error("Every client slot is taken")]
    ServerFull,

    #[error("Server task is gone")]
    ChannelClosed,

    #[error("Missed {0} broadcast records")]
    Lagged(u64),
}

impl Classify for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Desync { .. } | SyncError::Lagged(_) => ErrorKind::Desync,
            SyncError::Document(err) => err.kind(),
            SyncError::UnknownClient(_) | SyncError::ServerFull => ErrorKind::Validation,
            SyncError::ChannelClosed => ErrorKind::InvariantViolation,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_errors_keep_their_kind() {
        let err: SyncError = DocumentError::ObjectNotFound(7).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(SyncError::Desync { expected: 1, actual: 2 }.kind(), ErrorKind::Desync);
    }
}
