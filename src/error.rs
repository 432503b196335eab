//! Error types for linkguard.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (with the `defmt` feature) for efficient
//! on-target logging.

use crate::link::LinkState;

/// Failure reported by the Radio Link Interface for a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// No command buffer could be allocated.
    CommandBuffer,
    /// The controller did not answer within the command timeout.
    Timeout,
    /// Raw status code returned by the controller / SoftDevice.
    Command(u32),
    /// The connection handle could not be resolved (link is gone).
    NotConnected,
    /// The controller does not implement this command.
    Unsupported,
    /// A radio procedure is already in progress.
    Busy,
    /// A parameter was rejected before it reached the controller.
    InvalidParam,
}

/// Link-quality features whose setup can fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feature {
    PathLossReporting,
    TxPowerReports,
    AutonomousPowerControl,
    InitialTxPower,
}

/// Connection-level failures.  These drive the lifecycle back to discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// Connection establishment failed with an HCI status code.
    Failed(u8),
    /// The link came up but its handle could not be resolved.
    HandleUnresolved,
    /// Discovery / advertising could not be started.
    DiscoveryFailed(RadioError),
}

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A command exchange failed; the operation was abandoned for this cycle.
    Transport(RadioError),
    /// Establishing or keeping the link failed.
    Connection(ConnectionError),
    /// Setting up a feature failed; the link stays usable without it.
    Configuration(Feature, RadioError),
    /// The operation is not valid in the current lifecycle state.
    InvalidState(LinkState),
}

// Convenience conversions

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Error::Transport(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}
