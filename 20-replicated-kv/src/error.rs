use thiserror::Error;

/// Why a request could not be driven to commitment on this node.
///
/// Every variant is remedied the same way by the caller: retry, possibly
/// against another server. On the wire they all become `wrong_leader`.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("this server is not the leader")]
    WrongLeader,

    #[error("timed out waiting for log index {index} to commit")]
    Timeout { index: u64 },

    #[error("failed to encode command: {0}")]
    Codec(#[from] bincode::Error),
}

impl KvError {
    /// Whether the caller should retry elsewhere.
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::WrongLeader | KvError::Timeout { .. } => true,
            KvError::Codec(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_index() {
        let err = KvError::Timeout { index: 7 };
        assert_eq!(err.to_string(), "timed out waiting for log index 7 to commit");
        assert!(err.is_retryable());
    }

    #[test]
    fn wrong_leader_is_retryable() {
        assert!(KvError::WrongLeader.is_retryable());
    }
}
