//! TraintasticDIY kernel
//!
//! The kernel owns a dedicated thread multiplexing its task queue with the
//! heartbeat timer. Protocol behaviour lives in [`KernelState`], a pure state
//! machine producing [`KernelAction`]s, so the feature gate, the idempotent
//! per-address caches and the heartbeat contract are testable without a
//! thread or a transport. The driver applies actions: outbound messages go to
//! the IO handler, everything else is handed to the [`KernelEvents`] sink,
//! which posts onto the main loop.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, warn};

use traintastic_core::Result;

use crate::hardware::clock::{Clock, SystemClock};
use crate::hardware::protocol::diy::config::DiyConfig;
use crate::hardware::protocol::diy::io_handler::IoHandler;
use crate::hardware::protocol::diy::messages::{
    DiyMessage, FeatureFlags, InputState, OutputState,
};

/// Lowest valid IO address.
pub const IO_ADDRESS_MIN: u16 = 1;
/// Highest valid IO address.
pub const IO_ADDRESS_MAX: u16 = u16::MAX;

// ----------------------------------------------------------------------------
// Kernel Events
// ----------------------------------------------------------------------------

/// Sink for kernel-originated notifications; implementations post onto the
/// main loop. The kernel holds no object references, only this sink and a
/// log id.
pub trait KernelEvents: Send {
    fn started(&self);
    fn info(&self, text: String);
    fn input_changed(&self, address: u16, state: InputState);
    fn output_changed(&self, address: u16, state: OutputState);
    /// Feature handshake completed; the controller primes the state caches.
    fn features_received(&self, flags: FeatureFlags);
    fn transport_failed(&self, reason: String);

    // Power-model callbacks; the DIY wire has no matching opcodes, kernels
    // for stations that broadcast power state override these.
    fn emergency_stop(&self) {}
    fn go(&self) {}
    fn track_power_changed(&self, _on: bool) {}
}

// ----------------------------------------------------------------------------
// Kernel State
// ----------------------------------------------------------------------------

/// Effect requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelAction {
    Send(DiyMessage),
    Started,
    Info(String),
    InputChanged { address: u16, state: InputState },
    OutputChanged { address: u16, state: OutputState },
    FeaturesReceived(FeatureFlags),
}

/// Protocol state of one kernel instance.
pub struct KernelState {
    config: DiyConfig,
    simulation: bool,
    feature_flags_set: bool,
    feature_flags: FeatureFlags,
    input_values: HashMap<u16, InputState>,
    output_values: HashMap<u16, OutputState>,
    heartbeat_deadline: Instant,
}

impl KernelState {
    pub fn new(config: DiyConfig, simulation: bool, now: Instant) -> Self {
        let heartbeat_deadline = now + config.heartbeat_timeout;
        Self {
            config,
            simulation,
            feature_flags_set: false,
            feature_flags: FeatureFlags::none(),
            input_values: HashMap::new(),
            output_values: HashMap::new(),
            heartbeat_deadline,
        }
    }

    pub fn set_config(&mut self, config: DiyConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &DiyConfig {
        &self.config
    }

    pub fn has_feature_input(&self) -> bool {
        self.feature_flags_set && self.feature_flags.has_input()
    }

    pub fn has_feature_output(&self) -> bool {
        self.feature_flags_set && self.feature_flags.has_output()
    }

    pub fn heartbeat_deadline(&self) -> Instant {
        self.heartbeat_deadline
    }

    fn restart_heartbeat(&mut self, now: Instant) {
        self.heartbeat_deadline = now + self.config.heartbeat_timeout;
    }

    /// Begin the session: reset the feature handshake and emit the opening
    /// `GetInfo`/`GetFeatures` exchange.
    pub fn start(&mut self, now: Instant) -> Vec<KernelAction> {
        self.feature_flags_set = false;
        self.feature_flags = FeatureFlags::none();
        self.restart_heartbeat(now);
        vec![
            KernelAction::Send(DiyMessage::GetInfo),
            KernelAction::Send(DiyMessage::GetFeatures),
            KernelAction::Started,
        ]
    }

    /// Dispatch one received message. Every receive counts as liveness.
    pub fn receive(&mut self, message: DiyMessage, now: Instant) -> Vec<KernelAction> {
        self.restart_heartbeat(now);

        match message {
            DiyMessage::Heartbeat => Vec::new(),

            DiyMessage::SetInputState(address, state) => {
                if !self.has_feature_input() {
                    return Vec::new();
                }
                if !(IO_ADDRESS_MIN..=IO_ADDRESS_MAX).contains(&address) {
                    return Vec::new();
                }
                if self.input_values.get(&address) == Some(&state) {
                    return Vec::new();
                }
                self.input_values.insert(address, state);
                vec![KernelAction::InputChanged { address, state }]
            }

            DiyMessage::SetOutputState(address, state) => {
                if !self.has_feature_output() {
                    return Vec::new();
                }
                if !(IO_ADDRESS_MIN..=IO_ADDRESS_MAX).contains(&address) {
                    return Vec::new();
                }
                if self.output_values.get(&address) == Some(&state) {
                    return Vec::new();
                }
                self.output_values.insert(address, state);
                vec![KernelAction::OutputChanged { address, state }]
            }

            DiyMessage::Features(flags) => {
                self.feature_flags_set = true;
                self.feature_flags = flags;
                vec![KernelAction::FeaturesReceived(flags)]
            }

            DiyMessage::Info(text) => vec![KernelAction::Info(text)],

            DiyMessage::GetInfo
            | DiyMessage::GetFeatures
            | DiyMessage::GetInputState(_)
            | DiyMessage::GetOutputState(_) => {
                // Request opcodes are never valid inbound.
                warn!(opcode = ?message.op_code(), "protocol violation, dropped");
                Vec::new()
            }
        }
    }

    /// The heartbeat timer fired: transmit one heartbeat and rearm.
    pub fn heartbeat_expired(&mut self, now: Instant) -> Vec<KernelAction> {
        self.restart_heartbeat(now);
        vec![KernelAction::Send(DiyMessage::Heartbeat)]
    }

    /// Inject a synthetic input edge through the receive path. An address
    /// never seen before toggles to true; a known address toggles its cached
    /// value.
    pub fn simulate_input_change(&mut self, address: u16, now: Instant) -> Vec<KernelAction> {
        if !self.simulation {
            return Vec::new();
        }
        let state = match self.input_values.get(&address) {
            Some(InputState::True) => InputState::False,
            _ => InputState::True,
        };
        self.receive(DiyMessage::SetInputState(address, state), now)
    }
}

// ----------------------------------------------------------------------------
// Kernel Driver
// ----------------------------------------------------------------------------

enum KernelTask {
    Send(DiyMessage),
    Received(DiyMessage),
    SetConfig(DiyConfig),
    SimulateInputChange(u16),
    TransportFailed(String),
    Stop,
}

/// Cloneable handle onto a kernel's task queue.
#[derive(Clone)]
pub struct KernelHandle {
    tx: mpsc::Sender<KernelTask>,
}

impl KernelHandle {
    /// Queue a message for transmission; emitted in post order.
    pub fn post_send(&self, message: DiyMessage) {
        let _ = self.tx.send(KernelTask::Send(message));
    }

    /// Feed a received message into the kernel (called by IO handlers).
    pub fn post_received(&self, message: DiyMessage) {
        let _ = self.tx.send(KernelTask::Received(message));
    }

    /// Report a broken transport (called by IO handlers).
    pub fn transport_failed(&self, reason: String) {
        let _ = self.tx.send(KernelTask::TransportFailed(reason));
    }
}

/// One TraintasticDIY kernel instance: dedicated thread, IO handler strategy,
/// heartbeat timer and per-address state caches.
pub struct Kernel {
    tx: mpsc::Sender<KernelTask>,
    rx: Option<mpsc::Receiver<KernelTask>>,
    thread: Option<JoinHandle<()>>,
    io_handler: Option<Box<dyn IoHandler>>,
    events: Option<Box<dyn KernelEvents>>,
    clock: Arc<dyn Clock>,
    config: DiyConfig,
    simulation: bool,
    log_id: String,
    started: bool,
}

impl Kernel {
    pub fn new(config: DiyConfig, simulation: bool) -> Self {
        Self::with_clock(config, simulation, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DiyConfig, simulation: bool, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Some(rx),
            thread: None,
            io_handler: None,
            events: None,
            clock,
            config,
            simulation,
            log_id: String::new(),
            started: false,
        }
    }

    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    /// Install the transport strategy; required before [`start`](Self::start).
    pub fn set_io_handler(&mut self, handler: Box<dyn IoHandler>) {
        assert!(self.io_handler.is_none(), "io handler already set");
        self.io_handler = Some(handler);
    }

    /// Install the main-loop event sink; required before [`start`](Self::start).
    pub fn set_events(&mut self, events: Box<dyn KernelEvents>) {
        self.events = Some(events);
    }

    pub fn set_log_id(&mut self, log_id: impl Into<String>) {
        self.log_id = log_id.into();
    }

    /// Swap in a new config snapshot between messages.
    pub fn set_config(&self, config: DiyConfig) {
        let _ = self.tx.send(KernelTask::SetConfig(config));
    }

    /// Spawn the kernel thread, start the IO handler, run the feature
    /// handshake and arm the heartbeat. Double start and start without an IO
    /// handler are programming errors.
    pub fn start(&mut self) -> Result<()> {
        assert!(!self.started, "kernel already started");
        let io_handler = self.io_handler.take().expect("io handler set before start");
        let events = self.events.take().expect("event sink set before start");
        let rx = self.rx.take().expect("kernel thread already consumed queue");

        let mut runner = KernelRunner {
            state: KernelState::new(self.config.clone(), self.simulation, self.clock.now()),
            io_handler,
            events,
            clock: self.clock.clone(),
            log_id: self.log_id.clone(),
        };
        let handle = self.handle();

        self.thread = Some(
            std::thread::Builder::new()
                .name(format!("diy-kernel {}", self.log_id))
                .spawn(move || runner.run(rx, handle))
                .expect("spawn kernel thread"),
        );
        self.started = true;
        Ok(())
    }

    /// Stop the kernel synchronously: cancel the timer, stop the IO handler,
    /// drain and join. Pending outbound messages may be discarded.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        let _ = self.tx.send(KernelTask::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.started = false;
    }

    /// Translate an output intent; fire-and-forget, the new state is
    /// confirmed by the next inbound `SetOutputState`.
    pub fn set_output(&self, address: u16, value: bool) -> bool {
        self.handle().post_send(DiyMessage::SetOutputState(
            address,
            if value {
                OutputState::True
            } else {
                OutputState::False
            },
        ));
        true
    }

    /// Toggle a simulated input; no effect on real transports.
    pub fn simulate_input_change(&self, address: u16) {
        if self.simulation {
            let _ = self.tx.send(KernelTask::SimulateInputChange(address));
        }
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Kernel Thread
// ----------------------------------------------------------------------------

struct KernelRunner {
    state: KernelState,
    io_handler: Box<dyn IoHandler>,
    events: Box<dyn KernelEvents>,
    clock: Arc<dyn Clock>,
    log_id: String,
}

impl KernelRunner {
    fn run(&mut self, rx: mpsc::Receiver<KernelTask>, handle: KernelHandle) {
        if let Err(err) = self.io_handler.start(handle) {
            self.events.transport_failed(err.to_string());
            return;
        }

        let actions = self.state.start(self.clock.now());
        if self.apply(actions).is_err() {
            self.io_handler.stop();
            return;
        }

        loop {
            let timeout = self
                .state
                .heartbeat_deadline()
                .saturating_duration_since(self.clock.now());
            let step = match rx.recv_timeout(timeout) {
                Ok(KernelTask::Send(message)) => self.transmit(&message),
                Ok(KernelTask::Received(message)) => {
                    self.log_rx(&message);
                    let actions = self.state.receive(message, self.clock.now());
                    self.apply(actions)
                }
                Ok(KernelTask::SetConfig(config)) => {
                    self.state.set_config(config);
                    Ok(())
                }
                Ok(KernelTask::SimulateInputChange(address)) => {
                    let actions = self.state.simulate_input_change(address, self.clock.now());
                    self.apply(actions)
                }
                Ok(KernelTask::TransportFailed(reason)) => {
                    self.events.transport_failed(reason);
                    Err(())
                }
                Ok(KernelTask::Stop) => Err(()),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let actions = self.state.heartbeat_expired(self.clock.now());
                    self.apply(actions)
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(()),
            };
            if step.is_err() {
                break;
            }
        }

        self.io_handler.stop();
    }

    fn apply(&mut self, actions: Vec<KernelAction>) -> std::result::Result<(), ()> {
        for action in actions {
            match action {
                KernelAction::Send(message) => self.transmit(&message)?,
                KernelAction::Started => self.events.started(),
                KernelAction::Info(text) => self.events.info(text),
                KernelAction::InputChanged { address, state } => {
                    self.events.input_changed(address, state);
                }
                KernelAction::OutputChanged { address, state } => {
                    self.events.output_changed(address, state);
                }
                KernelAction::FeaturesReceived(flags) => self.events.features_received(flags),
            }
        }
        Ok(())
    }

    fn transmit(&mut self, message: &DiyMessage) -> std::result::Result<(), ()> {
        match self.io_handler.send(message) {
            Ok(()) => {
                self.log_tx(message);
                Ok(())
            }
            Err(err) => {
                self.events.transport_failed(err.to_string());
                Err(())
            }
        }
    }

    fn should_log(&self, message: &DiyMessage) -> bool {
        let config = self.state.config();
        config.debug_log_rx_tx
            && (*message != DiyMessage::Heartbeat || config.debug_log_heartbeat)
    }

    fn log_rx(&self, message: &DiyMessage) {
        if self.should_log(message) {
            debug!(id = %self.log_id, "RX {message}");
        }
    }

    fn log_tx(&self, message: &DiyMessage) {
        if self.should_log(message) {
            debug!(id = %self.log_id, "TX {message}");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::clock::VirtualClock;
    use std::time::Duration;

    fn started_state(clock: &VirtualClock) -> KernelState {
        let config = DiyConfig {
            heartbeat_timeout: Duration::from_millis(50),
            ..DiyConfig::default()
        };
        let mut state = KernelState::new(config, true, clock.now());
        let actions = state.start(clock.now());
        assert_eq!(
            actions,
            vec![
                KernelAction::Send(DiyMessage::GetInfo),
                KernelAction::Send(DiyMessage::GetFeatures),
                KernelAction::Started,
            ]
        );
        state
    }

    fn receive_features(state: &mut KernelState, clock: &VirtualClock, flags: FeatureFlags) {
        let actions = state.receive(DiyMessage::Features(flags), clock.now());
        assert_eq!(actions, vec![KernelAction::FeaturesReceived(flags)]);
    }

    #[test]
    fn test_feature_gate_blocks_until_features() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);

        // Before the Features reply: dropped silently.
        let actions = state.receive(
            DiyMessage::SetInputState(100, InputState::True),
            clock.now(),
        );
        assert!(actions.is_empty());

        receive_features(&mut state, &clock, FeatureFlags::full());

        // Same frame again: exactly one update now.
        let actions = state.receive(
            DiyMessage::SetInputState(100, InputState::True),
            clock.now(),
        );
        assert_eq!(
            actions,
            vec![KernelAction::InputChanged {
                address: 100,
                state: InputState::True,
            }]
        );
    }

    #[test]
    fn test_input_cache_is_idempotent() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::full());

        let frame = DiyMessage::SetInputState(7, InputState::False);
        assert_eq!(state.receive(frame.clone(), clock.now()).len(), 1);
        assert!(state.receive(frame, clock.now()).is_empty());
        assert_eq!(
            state
                .receive(DiyMessage::SetInputState(7, InputState::True), clock.now())
                .len(),
            1
        );
    }

    #[test]
    fn test_output_without_feature_is_dropped() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::new([0x01, 0, 0, 0]));

        let actions = state.receive(
            DiyMessage::SetOutputState(9, OutputState::True),
            clock.now(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_address_below_range_is_dropped() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::full());

        let actions = state.receive(DiyMessage::SetInputState(0, InputState::True), clock.now());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_heartbeat_liveness() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);

        // 49 ms idle: timer not expired yet.
        clock.advance(Duration::from_millis(49));
        assert!(clock.now() < state.heartbeat_deadline());

        // Inbound heartbeat counts as liveness and rearms.
        assert!(state
            .receive(DiyMessage::Heartbeat, clock.now())
            .is_empty());
        clock.advance(Duration::from_millis(49));
        assert!(clock.now() < state.heartbeat_deadline());

        // 51 ms more: expired, exactly one heartbeat transmitted.
        clock.advance(Duration::from_millis(51));
        assert!(clock.now() >= state.heartbeat_deadline());
        let actions = state.heartbeat_expired(clock.now());
        assert_eq!(actions, vec![KernelAction::Send(DiyMessage::Heartbeat)]);
        assert!(clock.now() < state.heartbeat_deadline());
    }

    #[test]
    fn test_any_receive_restarts_heartbeat() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::full());

        clock.advance(Duration::from_millis(40));
        state.receive(DiyMessage::SetInputState(1, InputState::True), clock.now());
        clock.advance(Duration::from_millis(40));
        // 80 ms since start but only 40 ms since last receive.
        assert!(clock.now() < state.heartbeat_deadline());
    }

    #[test]
    fn test_simulate_unknown_address_toggles_to_true() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::full());

        let actions = state.simulate_input_change(42, clock.now());
        assert_eq!(
            actions,
            vec![KernelAction::InputChanged {
                address: 42,
                state: InputState::True,
            }]
        );
        let actions = state.simulate_input_change(42, clock.now());
        assert_eq!(
            actions,
            vec![KernelAction::InputChanged {
                address: 42,
                state: InputState::False,
            }]
        );
    }

    #[test]
    fn test_simulate_disabled_without_simulation() {
        let clock = VirtualClock::new();
        let mut state = KernelState::new(DiyConfig::default(), false, clock.now());
        state.start(clock.now());
        receive_features(&mut state, &clock, FeatureFlags::full());
        assert!(state.simulate_input_change(42, clock.now()).is_empty());
    }

    #[test]
    fn test_request_opcode_inbound_is_dropped() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        assert!(state.receive(DiyMessage::GetInfo, clock.now()).is_empty());
        assert!(state
            .receive(DiyMessage::GetInputState(5), clock.now())
            .is_empty());
    }

    #[test]
    fn test_info_is_reported() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        let actions = state.receive(DiyMessage::Info("hello".into()), clock.now());
        assert_eq!(actions, vec![KernelAction::Info("hello".into())]);
    }

    #[test]
    fn test_restart_resets_feature_handshake() {
        let clock = VirtualClock::new();
        let mut state = started_state(&clock);
        receive_features(&mut state, &clock, FeatureFlags::full());
        assert!(state.has_feature_input());

        state.start(clock.now());
        assert!(!state.has_feature_input());
        assert!(state
            .receive(DiyMessage::SetInputState(1, InputState::True), clock.now())
            .is_empty());
    }
}
