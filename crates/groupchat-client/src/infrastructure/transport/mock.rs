//! Recording transport for tests.
//!
//! `RecordingTransport` opens no sockets.  Every lifecycle call is appended
//! to a call log shared through a [`TransportControl`], which tests keep
//! to inspect what happened and in what order:
//!
//! ```ignore
//! let control = TransportControl::new();
//! let factory = RecordingTransportFactory::new(control.clone());
//! let hot_swap = HotSwap::new(Arc::new(control.clone()));
//! let manager = ChannelManager::new(settings, Arc::new(factory), hot_swap);
//!
//! manager.connect_or_refresh("ANDROID", &events);
//! manager.connect_or_refresh("ANDROID", &events);
//!
//! assert_eq!(control.transports_created(), 1);
//! assert!(control.calls().contains(&TransportCall::StopThreads));
//! ```
//!
//! # Failure injection
//!
//! [`TransportControl::fail_on`] makes the named call return an error (after
//! it has been recorded) until [`TransportControl::clear_failures`].
//!
//! The control also implements [`AddressCache`], logging
//! [`TransportCall::ResetAddressCache`] in the same call log, so the
//! position of the cache reset within a swap can be asserted.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use groupchat_core::{AddressCache, Transport, TransportError, UpHandler};

use crate::application::channel_manager::TransportFactory;

/// One recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCall {
    /// The factory built a transport.
    NewTransport,
    SetUpHandler,
    CreateSockets,
    DestroySockets,
    StartThreads,
    StopThreads,
    Reconnect,
    Send,
    ResetAddressCache,
}

#[derive(Default)]
struct ControlState {
    calls: Vec<TransportCall>,
    fail_on: HashSet<TransportCall>,
    sent: Vec<Vec<u8>>,
    handler: Option<Arc<dyn UpHandler>>,
    created: usize,
    supports_reconnect: bool,
}

/// Shared view into every transport built from the same control.
#[derive(Clone, Default)]
pub struct TransportControl {
    state: Arc<Mutex<ControlState>>,
}

impl TransportControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: TransportCall) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.fail_on.contains(&call) {
            return Err(TransportError::Failed(format!("injected {call:?} failure")));
        }
        Ok(())
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Makes `call` fail from now on.
    pub fn fail_on(&self, call: TransportCall) {
        self.state().fail_on.insert(call);
    }

    pub fn clear_failures(&self) {
        self.state().fail_on.clear();
    }

    /// Whether transports built from here advertise native reconnect.
    pub fn set_supports_reconnect(&self, supported: bool) {
        self.state().supports_reconnect = supported;
    }

    /// Frames passed to `send`, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    /// Number of transports the factory has built.
    pub fn transports_created(&self) -> usize {
        self.state().created
    }

    /// Delivers `datagram` to the most recently installed up handler, as if
    /// it had arrived from the network.  Returns the handler's reply.
    pub fn inject(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        let handler = self.state().handler.clone()?;
        handler.deliver(datagram)
    }
}

impl AddressCache for TransportControl {
    fn reset(&self) {
        self.state().calls.push(TransportCall::ResetAddressCache);
    }
}

/// A [`Transport`] that only records.
pub struct RecordingTransport {
    control: TransportControl,
}

impl RecordingTransport {
    pub fn new(control: TransportControl) -> Self {
        Self { control }
    }
}

impl Transport for RecordingTransport {
    fn set_up_handler(&mut self, handler: Arc<dyn UpHandler>) {
        let mut state = self.control.state();
        state.calls.push(TransportCall::SetUpHandler);
        state.handler = Some(handler);
    }

    fn create_sockets(&mut self) -> Result<(), TransportError> {
        self.control.record(TransportCall::CreateSockets)
    }

    fn destroy_sockets(&mut self) -> Result<(), TransportError> {
        self.control.record(TransportCall::DestroySockets)
    }

    fn start_threads(&mut self) -> Result<(), TransportError> {
        self.control.record(TransportCall::StartThreads)
    }

    fn stop_threads(&mut self) -> Result<(), TransportError> {
        self.control.record(TransportCall::StopThreads)
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        self.control.record(TransportCall::Send)?;
        self.control.state().sent.push(frame.to_vec());
        Ok(())
    }

    fn local_address(&self) -> Option<SocketAddr> {
        None
    }

    fn supports_reconnect(&self) -> bool {
        self.control.state().supports_reconnect
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        self.control.record(TransportCall::Reconnect)
    }
}

/// Builds [`RecordingTransport`]s sharing one [`TransportControl`].
pub struct RecordingTransportFactory {
    control: TransportControl,
}

impl RecordingTransportFactory {
    pub fn new(control: TransportControl) -> Self {
        Self { control }
    }
}

impl TransportFactory for RecordingTransportFactory {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.control.record(TransportCall::NewTransport)?;
        self.control.state().created += 1;
        Ok(Box::new(RecordingTransport::new(self.control.clone())))
    }
}
