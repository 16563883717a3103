use serde::{Deserialize, Serialize};

/// What a replicated command does once it is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Get,
    Put,
    Append,
}

/// The two write operations a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutAppendOp {
    Put,
    Append,
}

impl From<PutAppendOp> for OpKind {
    fn from(op: PutAppendOp) -> Self {
        match op {
            PutAppendOp::Put => OpKind::Put,
            PutAppendOp::Append => OpKind::Append,
        }
    }
}

/// Commands that flow through the replicated log.
///
/// `Get` commands carry an empty value; they go through the log only so the
/// read is ordered after every write committed before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub key: String,
    pub value: String,
    pub kind: OpKind,
}

impl Command {
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            kind: OpKind::Get,
        }
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: OpKind::Put,
        }
    }

    pub fn append(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: OpKind::Append,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_carries_no_value() {
        let cmd = Command::get("k");
        assert_eq!(cmd.kind, OpKind::Get);
        assert!(cmd.value.is_empty());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Command::decode(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn encoded_append_decodes_to_same_command() {
        let cmd = Command::append("x", "b");
        let bytes = cmd.encode().unwrap();
        assert_eq!(Command::decode(&bytes).unwrap(), cmd);
    }
}
