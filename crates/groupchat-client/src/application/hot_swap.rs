//! In-place transport rebuild for a connected channel.
//!
//! A swap replaces the channel's sockets and receiver threads while the
//! channel object, its member identity, its view and its receiver stay as
//! they are.  Nobody leaves or rejoins the group.
//!
//! # Paths
//!
//! - **Native** – the transport advertises [`Transport::supports_reconnect`]:
//!   the address cache is reset and [`Transport::reconnect`] does the rest.
//! - **Staged** – otherwise the steps run one by one, teardown strictly before
//!   rebuild so two socket sets never hold the same port:
//!
//! ```text
//! stop_threads → destroy_sockets → reset address cache → create_sockets → start_threads
//! ```
//!
//! A failed step stops the sequence.  The channel is left in place (possibly
//! with a dead transport) so the next swap or an explicit close can recover.

use std::fmt;
use std::sync::Arc;

use groupchat_core::{AddressCache, Channel, Transport, TransportError};
use thiserror::Error;
use tracing::{debug, error, info};

/// Which swap path ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPath {
    Native,
    Staged,
}

/// One step of a swap, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    StopThreads,
    DestroySockets,
    CreateSockets,
    StartThreads,
    Reconnect,
}

impl fmt::Display for SwapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapStep::StopThreads => "stop threads",
            SwapStep::DestroySockets => "destroy sockets",
            SwapStep::CreateSockets => "create sockets",
            SwapStep::StartThreads => "start threads",
            SwapStep::Reconnect => "reconnect",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`HotSwap::swap`].
#[derive(Debug, Error)]
pub enum SwapError {
    /// Only a connected channel has a transport worth rebuilding.
    #[error("channel is not connected")]
    NotConnected,

    /// A step failed; later steps did not run.
    #[error("transport swap failed at {step}: {source}")]
    Step {
        step: SwapStep,
        #[source]
        source: TransportError,
    },
}

/// Rebuilds a channel's transport in place.
pub struct HotSwap {
    address_cache: Arc<dyn AddressCache>,
}

impl HotSwap {
    /// Creates a strategy that resets `address_cache` between teardown and
    /// rebuild.
    pub fn new(address_cache: Arc<dyn AddressCache>) -> Self {
        Self { address_cache }
    }

    /// Swaps `channel`'s transport, preferring the native path.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::NotConnected`] for a disconnected channel, or
    /// [`SwapError::Step`] naming the step that failed.
    pub fn swap(&self, channel: &mut Channel) -> Result<SwapPath, SwapError> {
        if !channel.is_connected() {
            return Err(SwapError::NotConnected);
        }
        let cluster = channel.cluster_name().to_string();
        let transport = channel.transport_mut();

        let path = if transport.supports_reconnect() {
            self.native(transport)?;
            SwapPath::Native
        } else {
            self.staged(transport)?;
            SwapPath::Staged
        };

        info!(
            cluster = %cluster,
            ?path,
            addr = ?channel.transport().local_address(),
            "transport swapped"
        );
        Ok(path)
    }

    fn native(&self, transport: &mut dyn Transport) -> Result<(), SwapError> {
        debug!("swap: resetting address cache");
        self.address_cache.reset();
        run_step(SwapStep::Reconnect, || transport.reconnect())
    }

    fn staged(&self, transport: &mut dyn Transport) -> Result<(), SwapError> {
        run_step(SwapStep::StopThreads, || transport.stop_threads())?;
        run_step(SwapStep::DestroySockets, || transport.destroy_sockets())?;
        debug!("swap: resetting address cache");
        self.address_cache.reset();
        run_step(SwapStep::CreateSockets, || transport.create_sockets())?;
        run_step(SwapStep::StartThreads, || transport.start_threads())
    }
}

fn run_step(
    step: SwapStep,
    op: impl FnOnce() -> Result<(), TransportError>,
) -> Result<(), SwapError> {
    debug!("swap: {step}");
    op().map_err(|source| {
        error!("swap step '{step}' failed: {source:?}");
        SwapError::Step { step, source }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
