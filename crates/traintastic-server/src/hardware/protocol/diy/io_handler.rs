//! IO handler strategies
//!
//! A kernel talks to its device through a pluggable [`IoHandler`]: a real TCP
//! connection or the loopback simulation. Handlers run on the kernel thread;
//! a TCP handler additionally owns a reader thread that feeds decoded
//! messages back into the kernel queue.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::trace;

use traintastic_core::Result;

use crate::hardware::protocol::diy::kernel::KernelHandle;
use crate::hardware::protocol::diy::messages::{
    DiyMessage, FeatureFlags, InputState, OutputState,
};

// ----------------------------------------------------------------------------
// IO Handler Trait
// ----------------------------------------------------------------------------

/// Transport strategy of a kernel.
pub trait IoHandler: Send {
    /// Open the transport; receives the kernel handle for feeding inbound
    /// messages and reporting transport failures.
    fn start(&mut self, kernel: KernelHandle) -> Result<()>;

    /// Transmit one message.
    fn send(&mut self, message: &DiyMessage) -> Result<()>;

    /// Close the transport and stop any helper threads.
    fn stop(&mut self);

    fn is_simulation(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------
// TCP
// ----------------------------------------------------------------------------

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP transport to a TraintasticDIY device.
pub struct TcpIoHandler {
    address: String,
    stream: Option<TcpStream>,
    reader: Option<JoinHandle<()>>,
}

impl TcpIoHandler {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            stream: None,
            reader: None,
        }
    }
}

impl IoHandler for TcpIoHandler {
    fn start(&mut self, kernel: KernelHandle) -> Result<()> {
        let addrs: Vec<_> = std::net::ToSocketAddrs::to_socket_addrs(&self.address)?.collect();
        let addr = addrs
            .first()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::AddrNotAvailable))?;
        let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;

        let read_half = stream.try_clone()?;
        self.stream = Some(stream);
        self.reader = Some(
            std::thread::Builder::new()
                .name("diy-io-rx".to_owned())
                .spawn(move || read_loop(read_half, kernel))
                .expect("spawn io reader thread"),
        );
        Ok(())
    }

    fn send(&mut self, message: &DiyMessage) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))?;
        stream.write_all(&message.encode())?;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn read_loop(mut stream: TcpStream, kernel: KernelHandle) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                kernel.transport_failed("connection closed by device".to_owned());
                return;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                loop {
                    match DiyMessage::decode(&buffer) {
                        Ok(Some((message, used))) => {
                            trace!("rx {} bytes", used);
                            buffer.drain(..used);
                            kernel.post_received(message);
                        }
                        Ok(None) => break,
                        Err(err) => {
                            kernel.transport_failed(err.to_string());
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                kernel.transport_failed(err.to_string());
                return;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Simulation
// ----------------------------------------------------------------------------

/// Loopback transport: answers the handshake with canned replies and echoes
/// state requests against its own value arrays.
#[derive(Default)]
pub struct SimulationIoHandler {
    kernel: Option<KernelHandle>,
    inputs: HashMap<u16, InputState>,
    outputs: HashMap<u16, OutputState>,
}

impl SimulationIoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn reply(&self, message: DiyMessage) {
        if let Some(kernel) = &self.kernel {
            kernel.post_received(message);
        }
    }
}

impl IoHandler for SimulationIoHandler {
    fn start(&mut self, kernel: KernelHandle) -> Result<()> {
        self.kernel = Some(kernel);
        Ok(())
    }

    fn send(&mut self, message: &DiyMessage) -> Result<()> {
        match message {
            DiyMessage::GetInfo => self.reply(DiyMessage::Info("TraintasticDIY simulation".into())),
            DiyMessage::GetFeatures => self.reply(DiyMessage::Features(FeatureFlags::full())),
            DiyMessage::GetInputState(address) => {
                let state = self.inputs.get(address).copied().unwrap_or_default();
                self.reply(DiyMessage::SetInputState(*address, state));
            }
            DiyMessage::GetOutputState(address) => {
                let state = self.outputs.get(address).copied().unwrap_or_default();
                self.reply(DiyMessage::SetOutputState(*address, state));
            }
            DiyMessage::SetOutputState(address, state) => {
                self.outputs.insert(*address, *state);
                self.reply(DiyMessage::SetOutputState(*address, *state));
            }
            DiyMessage::Heartbeat
            | DiyMessage::Info(_)
            | DiyMessage::Features(_)
            | DiyMessage::SetInputState(..) => {}
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.kernel = None;
    }

    fn is_simulation(&self) -> bool {
        true
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::protocol::diy::config::DiyConfig;
    use crate::hardware::protocol::diy::kernel::Kernel;

    fn test_handle() -> (Kernel, KernelHandle) {
        let kernel = Kernel::new(DiyConfig::default(), true);
        let handle = kernel.handle();
        (kernel, handle)
    }

    #[test]
    fn test_simulation_answers_handshake() {
        let (_kernel, handle) = test_handle();
        let mut io = SimulationIoHandler::new();
        io.start(handle).unwrap();
        io.send(&DiyMessage::GetFeatures).unwrap();
        // The reply landed in the kernel queue; it is consumed by the kernel
        // thread in production, here we only check the send path succeeded.
    }

    #[test]
    fn test_simulation_echoes_output_state() {
        let (_kernel, handle) = test_handle();
        let mut io = SimulationIoHandler::new();
        io.start(handle).unwrap();
        io.send(&DiyMessage::SetOutputState(9, OutputState::True))
            .unwrap();
        assert_eq!(io.outputs.get(&9), Some(&OutputState::True));
    }
}
