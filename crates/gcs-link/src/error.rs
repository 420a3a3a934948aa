use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid endpoint `{0}`: expected udp:HOST:PORT")]
    Endpoint(String),

    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Sending before any datagram has arrived: the vehicle's address is
    /// only learned from inbound traffic.
    #[error("no vehicle peer discovered yet")]
    NoPeer,

    #[error("mavlink encode: {0}")]
    Encode(#[from] mavlink::error::MessageWriteError),
}
