use crate::device::DeviceError;
use crate::state::SessionState;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to acquire microphone: {0}")]
    Device(#[from] DeviceError),
    #[error("failed to open transport: {0}")]
    Handshake(#[source] TransportError),
    #[error("connect attempt cancelled")]
    Cancelled,
    #[error("session is busy ({0})")]
    Busy(SessionState),
    #[error("session driver stopped")]
    DriverStopped,
    #[error("failed to get stats")]
    StatsUnavailable,
}
