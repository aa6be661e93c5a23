/// Errors from digest computation.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// The underlying stream failed before reaching end of input.
    #[error("read error after {bytes_read} bytes: {source}")]
    Read {
        bytes_read: u64,
        #[source]
        source: std::io::Error,
    },

    /// A zero chunk size would never make progress.
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),
}
