use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid relayer private key")]
    InvalidPrivateKey(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("failed to submit transaction: {0}")]
    Submission(String),

    #[error("RPC call failed: {0}")]
    Rpc(String),
}
