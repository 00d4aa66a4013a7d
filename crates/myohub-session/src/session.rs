//! Device session actor
//!
//! One `tokio::select!` loop owns the session state machine, the
//! sensor/hub registry, the signal conditioner and the write scheduler.
//! Operator commands arrive over an mpsc channel, link activity over
//! another; session events go out over a broadcast channel for
//! downstream consumers (scoring, UI).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use myohub_core::{
    validate_channel, ClipDevice, HardwareAddress, HubDevice, LedState, MyoResult, CHANNEL_COUNT,
};
use myohub_processing::{ConditionerConfig, SignalConditioner};
use myohub_protocol::command::{HubCommand, CMD_STOP_MEASUREMENT};
use myohub_protocol::telemetry::{self, TelemetryEvent};

use crate::config::SessionConfig;
use crate::link::{LinkEvent, LinkTransport};
use crate::scheduler::WriteScheduler;

/// Cap on missing-data requests issued for one sequence gap
const MAX_GAP_REQUESTS: u32 = 16;

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Scanning,
    Connecting,
    Ready,
    Measuring,
}

/// A hub seen while scanning
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub address: HardwareAddress,
    pub name: Option<String>,
}

/// Which sensor a detach request targets
#[derive(Debug, Clone, PartialEq)]
pub enum DetachTarget {
    /// A specific sensor by hardware address
    Address(HardwareAddress),
    /// The most recently attached sensor
    MostRecent,
}

/// Operator commands accepted by the session actor
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Begin scanning for hubs, optionally filtered by name
    StartScan { name_filter: Option<String> },
    /// End the scan phase early
    StopScan,
    /// Connect to one previously discovered hub
    Connect { address: HardwareAddress },
    /// Tear the session down
    Disconnect,
    /// Enable or disable attach mode for new sensors
    SetAttachMode(bool),
    /// Promote the pending candidate into the registry
    ConfirmCandidate,
    /// Discard the pending candidate
    CancelCandidate,
    /// Remove a sensor, immediately or by re-staging it as a candidate
    Detach { target: DetachTarget, restage: bool },
    /// Begin a measurement run
    StartMeasuring,
    /// End the measurement run; `restarting` skips the grace delay
    StopMeasuring { restarting: bool },
    /// Rename the hub
    RenameHub(String),
    /// Ask for a battery report
    RequestBattery,
    /// Ask for connectivity info on all sensors
    RequestConnectivityInfo,
    /// Forget the pairing in one hub slot
    DeletePairing { slot: u8 },
    /// Forget every pairing, locally and on the hub
    DeleteAllPairings,
    /// Power the hub off
    PowerOffHub,
    /// Power one sensor off
    PowerOffSensor { address: HardwareAddress },
}

/// Events emitted by the session actor
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    PeerDiscovered(DiscoveredPeer),
    CandidateStaged { address: HardwareAddress, channel: u8 },
    CandidateDiscarded { address: HardwareAddress },
    SensorAttached(ClipDevice),
    SensorDetached { address: HardwareAddress },
    HubBattery { volts: f32, low: bool },
    ClipBattery { address: HardwareAddress, channel: u8, volts: f32, low: bool },
    ConnectivityChanged { address: HardwareAddress, connected: bool },
    MeasurementStarted { run: Uuid },
    MeasurementStopped { run: Uuid },
    /// A new rolling average for one channel, the scoring input
    Average { channel: usize, value: u16 },
}

/// Stop-confirmation polling in progress
#[derive(Debug)]
struct StopPoll {
    next_due: Instant,
    run: Uuid,
}

/// The device session actor
pub struct DeviceSession<T: LinkTransport> {
    config: SessionConfig,
    state: SessionState,
    transport: T,

    // Communication channels
    link_rx: mpsc::Receiver<LinkEvent>,
    command_rx: mpsc::Receiver<SessionCommand>,
    command_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,

    // Scan phase
    peers: Vec<DiscoveredPeer>,
    name_filter: Option<String>,
    scan_deadline: Option<Instant>,
    connecting_to: Option<DiscoveredPeer>,

    // Registry
    hub: Option<HubDevice>,
    registry: HashMap<HardwareAddress, ClipDevice>,
    attach_order: Vec<HardwareAddress>,
    candidate: Option<ClipDevice>,
    attach_mode: bool,

    // Measurement
    conditioner: SignalConditioner,
    last_sequence: Option<u32>,
    run_id: Option<Uuid>,
    stop_poll: Option<StopPoll>,

    scheduler: WriteScheduler,
}

impl<T: LinkTransport> DeviceSession<T> {
    /// Create a session over an established event queue and transport
    pub fn new(transport: T, link_rx: mpsc::Receiver<LinkEvent>, config: SessionConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let scheduler = WriteScheduler::new(config.write_spacing());

        DeviceSession {
            config,
            state: SessionState::Disconnected,
            transport,
            link_rx,
            command_rx,
            command_tx,
            event_tx,
            peers: Vec::new(),
            name_filter: None,
            scan_deadline: None,
            connecting_to: None,
            hub: None,
            registry: HashMap::new(),
            attach_order: Vec::new(),
            candidate: None,
            attach_mode: false,
            conditioner: SignalConditioner::new(ConditionerConfig::default()),
            last_sequence: None,
            run_id: None,
            stop_poll: None,
            scheduler,
        }
    }

    /// Sender for operator commands
    pub fn command_handle(&self) -> mpsc::Sender<SessionCommand> {
        self.command_tx.clone()
    }

    /// New receiver for session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The actor loop; runs until both input channels close
    pub async fn run(&mut self) -> MyoResult<()> {
        info!("device session started");

        loop {
            let next_write = self.scheduler.next_due();
            let stop_due = self.stop_poll.as_ref().map(|poll| poll.next_due);
            let scan_due = self.scan_deadline;

            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("command channel closed");
                            break;
                        }
                    }
                }

                event = self.link_rx.recv() => {
                    match event {
                        Some(event) => self.handle_link_event(event),
                        None => {
                            debug!("link event channel closed");
                            break;
                        }
                    }
                }

                _ = sleep_until(next_write.unwrap_or_else(Instant::now)),
                    if next_write.is_some() =>
                {
                    self.flush_due_writes();
                }

                _ = sleep_until(stop_due.unwrap_or_else(Instant::now)),
                    if stop_due.is_some() =>
                {
                    self.poll_stop();
                }

                _ = sleep_until(scan_due.unwrap_or_else(Instant::now)),
                    if scan_due.is_some() =>
                {
                    info!("scan timeout reached");
                    self.finish_scan();
                }
            }
        }

        Ok(())
    }

    // ---- outbound path ----

    /// Queue a command, reporting whether it was actually accepted;
    /// a silent no-op when the link is not ready
    fn send(&mut self, command: HubCommand) -> bool {
        self.send_after(Duration::ZERO, command)
    }

    fn send_after(&mut self, delay: Duration, command: HubCommand) -> bool {
        if !self.transport.is_ready() {
            warn!(command = ?command.id(), "link not ready, dropping outbound command");
            return false;
        }
        self.scheduler.schedule_after(delay, command.to_frame());
        true
    }

    fn flush_due_writes(&mut self) {
        let now = Instant::now();
        while let Some(frame) = self.scheduler.pop_due(now) {
            self.write_now(&frame);
        }
    }

    /// Write one frame immediately, bypassing the spacing queue
    fn write_now(&mut self, frame: &str) {
        if !self.transport.is_ready() {
            warn!("link not ready, dropping frame");
            return;
        }
        if let Err(e) = self.transport.send_frame(frame) {
            warn!("frame write failed: {}", e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore the error when nobody is subscribed.
        let _ = self.event_tx.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(?state, "session state changed");
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    // ---- operator commands ----

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartScan { name_filter } => self.start_scan(name_filter),
            SessionCommand::StopScan => {
                if self.state == SessionState::Scanning {
                    self.finish_scan();
                }
            }
            SessionCommand::Connect { address } => self.connect(address),
            SessionCommand::Disconnect => self.handle_disconnect(),
            SessionCommand::SetAttachMode(enabled) => {
                debug!(enabled, "attach mode changed");
                self.attach_mode = enabled;
            }
            SessionCommand::ConfirmCandidate => self.confirm_candidate(),
            SessionCommand::CancelCandidate => self.cancel_candidate(),
            SessionCommand::Detach { target, restage } => self.detach(target, restage),
            SessionCommand::StartMeasuring => self.start_measuring(),
            SessionCommand::StopMeasuring { restarting } => self.stop_measuring(restarting),
            SessionCommand::RenameHub(name) => {
                // The local record only follows a rename that actually
                // went out; a dropped frame must not desync it.
                if self.send(HubCommand::RenameDevice { name: name.clone() }) {
                    if let Some(hub) = &mut self.hub {
                        hub.name = name;
                    }
                }
            }
            SessionCommand::RequestBattery => {
                self.send(HubCommand::RequestBattery);
            }
            SessionCommand::RequestConnectivityInfo => {
                self.send(HubCommand::RequestConnectivityInfo);
            }
            SessionCommand::DeletePairing { slot } => {
                self.send(HubCommand::DeletePairing { slot });
            }
            SessionCommand::DeleteAllPairings => {
                self.send(HubCommand::DeleteAllPairings);
                for address in self.attach_order.drain(..).collect::<Vec<_>>() {
                    self.registry.remove(&address);
                    self.emit(SessionEvent::SensorDetached { address });
                }
            }
            SessionCommand::PowerOffHub => {
                self.send(HubCommand::PowerOffHub);
            }
            SessionCommand::PowerOffSensor { address } => {
                self.send(HubCommand::PowerOffSensor { address });
            }
        }
    }

    fn start_scan(&mut self, name_filter: Option<String>) {
        if self.state != SessionState::Disconnected {
            warn!(state = ?self.state, "scan requested outside Disconnected");
            return;
        }
        self.peers.clear();
        self.name_filter = name_filter;
        self.scan_deadline = Some(Instant::now() + self.config.scan_timeout());
        self.set_state(SessionState::Scanning);
    }

    fn finish_scan(&mut self) {
        self.scan_deadline = None;
        if self.state == SessionState::Scanning {
            info!(peers = self.peers.len(), "scan finished");
            self.set_state(SessionState::Disconnected);
        }
    }

    fn connect(&mut self, address: HardwareAddress) {
        if !matches!(self.state, SessionState::Disconnected | SessionState::Scanning) {
            warn!(state = ?self.state, "connect requested in invalid state");
            return;
        }
        let peer = self
            .peers
            .iter()
            .find(|peer| peer.address == address)
            .cloned()
            .unwrap_or(DiscoveredPeer { address, name: None });
        info!(peer = %peer.address, "connecting");
        self.connecting_to = Some(peer);
        self.scan_deadline = None;
        self.set_state(SessionState::Connecting);
    }

    fn handle_disconnect(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        info!("session disconnecting");
        // No writes may leave after this point.
        self.scheduler.clear();
        self.stop_poll = None;
        self.scan_deadline = None;
        self.connecting_to = None;
        self.hub = None;
        // A pending candidate cannot survive the link: its blink LED
        // state is gone and confirmation after a reconnect would admit
        // a sensor nobody is looking at.
        if let Some(candidate) = self.candidate.take() {
            self.emit(SessionEvent::CandidateDiscarded { address: candidate.address });
        }
        for clip in self.registry.values_mut() {
            clip.connected = false;
        }
        self.set_state(SessionState::Disconnected);
    }

    // ---- attach / detach ----

    fn stage_candidate(&mut self, mut clip: ClipDevice) {
        // Exactly one LED-off for a previously pending candidate before
        // the new one is staged.
        if let Some(previous) = self.candidate.take() {
            self.send(HubCommand::SetLed {
                address: previous.address.clone(),
                state: LedState::Off,
            });
            self.emit(SessionEvent::CandidateDiscarded { address: previous.address });
        }
        clip.led = LedState::Blink;
        self.send(HubCommand::SetLed {
            address: clip.address.clone(),
            state: LedState::Blink,
        });
        self.emit(SessionEvent::CandidateStaged {
            address: clip.address.clone(),
            channel: clip.channel,
        });
        self.candidate = Some(clip);
    }

    fn confirm_candidate(&mut self) {
        let Some(mut clip) = self.candidate.take() else {
            debug!("confirm with no pending candidate");
            return;
        };
        clip.led = LedState::Steady;
        self.send(HubCommand::SetLed {
            address: clip.address.clone(),
            state: LedState::Steady,
        });
        info!(sensor = %clip.address, channel = clip.channel, "sensor attached");
        self.attach_order.push(clip.address.clone());
        self.emit(SessionEvent::SensorAttached(clip.clone()));
        self.registry.insert(clip.address.clone(), clip);
    }

    fn cancel_candidate(&mut self) {
        let Some(clip) = self.candidate.take() else {
            debug!("cancel with no pending candidate");
            return;
        };
        self.send(HubCommand::SetLed {
            address: clip.address.clone(),
            state: LedState::Off,
        });
        self.emit(SessionEvent::CandidateDiscarded { address: clip.address });
    }

    fn detach(&mut self, target: DetachTarget, restage: bool) {
        let address = match target {
            DetachTarget::Address(address) => address,
            DetachTarget::MostRecent => match self.attach_order.last().cloned() {
                Some(address) => address,
                None => {
                    warn!("detach requested with empty registry");
                    return;
                }
            },
        };
        let Some(clip) = self.registry.remove(&address) else {
            warn!(sensor = %address, "detach of unknown sensor");
            return;
        };
        self.attach_order.retain(|a| *a != address);
        info!(sensor = %address, "sensor detached");
        self.emit(SessionEvent::SensorDetached { address: address.clone() });

        if restage {
            self.stage_candidate(clip);
        } else {
            self.send(HubCommand::SetLed { address, state: LedState::Off });
        }
    }

    // ---- measurement ----

    fn start_measuring(&mut self) {
        if self.state != SessionState::Ready {
            warn!(state = ?self.state, "start measuring outside Ready");
            return;
        }
        if self.registry.is_empty() {
            warn!("start measuring with no attached sensors");
            return;
        }

        let mut attached = [false; CHANNEL_COUNT];
        for clip in self.registry.values() {
            if (clip.channel as usize) < CHANNEL_COUNT {
                attached[clip.channel as usize] = true;
            }
        }

        self.conditioner.reset();
        self.last_sequence = None;
        let run = Uuid::new_v4();
        self.run_id = Some(run);
        self.send(HubCommand::StartMeasuring { attached });
        self.set_state(SessionState::Measuring);
        info!(%run, "measurement started");
        self.emit(SessionEvent::MeasurementStarted { run });
    }

    fn stop_measuring(&mut self, restarting: bool) {
        if self.state != SessionState::Measuring {
            warn!(state = ?self.state, "stop measuring outside Measuring");
            return;
        }
        if self.stop_poll.is_some() {
            debug!("stop already polling");
            return;
        }
        let delay = if restarting {
            Duration::ZERO
        } else {
            self.config.stop_grace()
        };
        let run = self.run_id.unwrap_or_else(Uuid::new_v4);
        debug!(%run, restarting, "stop polling begins");
        self.stop_poll = Some(StopPoll { next_due: Instant::now() + delay, run });
    }

    /// One stop-poll tick: issue the stop command and re-arm
    fn poll_stop(&mut self) {
        let frame = HubCommand::StopMeasuring.to_frame();
        self.write_now(&frame);
        if let Some(poll) = &mut self.stop_poll {
            poll.next_due = Instant::now() + self.config.stop_poll_interval();
        }
    }

    // ---- inbound link events ----

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => self.handle_connected(),
            LinkEvent::Disconnected => self.handle_disconnect(),
            LinkEvent::PeerDiscovered { address, name } => {
                self.handle_peer_discovered(address, name)
            }
            LinkEvent::Frame(wire) => match telemetry::decode_frame(&wire) {
                Ok(event) => self.handle_telemetry(event),
                // Malformed frames are logged and dropped, never fatal.
                Err(e) => debug!("dropping malformed frame: {}", e),
            },
        }
    }

    fn handle_connected(&mut self) {
        if self.state != SessionState::Connecting {
            debug!(state = ?self.state, "link up outside Connecting");
            return;
        }
        let name = self
            .connecting_to
            .as_ref()
            .and_then(|peer| peer.name.clone())
            .unwrap_or_else(|| "MyoHub".to_string());
        info!(hub = %name, "link established");
        self.hub = Some(HubDevice::new(name));
        self.set_state(SessionState::Ready);

        self.send(HubCommand::RequestConnectivityInfo);

        // Registered sensors get a steady LED, in attach order.
        for address in self.attach_order.clone() {
            if let Some(clip) = self.registry.get_mut(&address) {
                clip.led = LedState::Steady;
                clip.connected = true;
            }
            self.send(HubCommand::SetLed { address, state: LedState::Steady });
        }
    }

    fn handle_peer_discovered(&mut self, address: HardwareAddress, name: Option<String>) {
        if self.state != SessionState::Scanning {
            return;
        }
        if let Some(filter) = &self.name_filter {
            let matches = name.as_deref().is_some_and(|n| n.contains(filter.as_str()));
            if !matches {
                return;
            }
        }
        if self.peers.iter().any(|peer| peer.address == address) {
            return;
        }
        let peer = DiscoveredPeer { address, name };
        debug!(peer = %peer.address, "hub discovered");
        self.peers.push(peer.clone());
        self.emit(SessionEvent::PeerDiscovered(peer));
    }

    // ---- inbound telemetry ----

    fn handle_telemetry(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::SampleBatch { sequence, frames } => {
                self.handle_sample_batch(sequence, frames)
            }
            TelemetryEvent::BatteryReport { clip_codes, hub_code } => {
                self.handle_battery_report(clip_codes, hub_code)
            }
            TelemetryEvent::Discovery { address, slot, battery_code } => {
                self.handle_discovery(address, slot, battery_code)
            }
            TelemetryEvent::Connectivity { address, connected } => {
                self.handle_connectivity(address, connected)
            }
            TelemetryEvent::Ack { command, success } => self.handle_ack(command, success),
        }
    }

    fn handle_sample_batch(&mut self, sequence: u32, frames: Vec<[u16; CHANNEL_COUNT]>) {
        if self.state != SessionState::Measuring {
            debug!(sequence, "sample batch outside Measuring");
            return;
        }

        if let Some(last) = self.last_sequence {
            if sequence <= last {
                debug!(sequence, last, "duplicate or stale sample batch");
                return;
            }
            let gap = sequence - last - 1;
            if gap > 0 {
                warn!(sequence, last, gap, "sample sequence gap");
                for missing in (last + 1)..(last + 1 + gap.min(MAX_GAP_REQUESTS)) {
                    self.send(HubCommand::RequestMissingData { sequence: missing });
                }
            }
        }
        self.last_sequence = Some(sequence);

        for frame in &frames {
            for (channel, value) in self.conditioner.push_frame(frame) {
                self.emit(SessionEvent::Average { channel, value });
            }
        }
    }

    fn handle_battery_report(&mut self, clip_codes: Vec<u8>, hub_code: u8) {
        if let Some(hub) = &mut self.hub {
            hub.set_battery(hub_code);
            let (volts, low) = (hub.battery_volts.unwrap_or_default(), hub.low_battery);
            self.emit(SessionEvent::HubBattery { volts, low });
        }
        for (channel, code) in clip_codes.into_iter().enumerate() {
            let Some(clip) = self
                .registry
                .values_mut()
                .find(|clip| clip.channel as usize == channel)
            else {
                continue;
            };
            clip.set_battery(code);
            let event = SessionEvent::ClipBattery {
                address: clip.address.clone(),
                channel: clip.channel,
                volts: clip.battery_volts.unwrap_or_default(),
                low: clip.low_battery,
            };
            self.emit(event);
        }
    }

    fn handle_discovery(&mut self, address: HardwareAddress, slot: u8, battery_code: u8) {
        if let Some(clip) = self.registry.get_mut(&address) {
            clip.set_battery(battery_code);
            clip.connected = true;
            return;
        }
        if let Some(candidate) = &mut self.candidate {
            if candidate.address == address {
                candidate.set_battery(battery_code);
                return;
            }
        }
        if !self.attach_mode {
            debug!(sensor = %address, "discovery ignored, attach mode off");
            return;
        }
        if !matches!(self.state, SessionState::Ready | SessionState::Measuring) {
            debug!(sensor = %address, state = ?self.state, "discovery outside active session");
            return;
        }
        if let Err(e) = validate_channel(slot as usize) {
            warn!(sensor = %address, slot, "discovery with out-of-range slot: {}", e);
            return;
        }
        let mut clip = ClipDevice::new(address, slot);
        clip.set_battery(battery_code);
        self.stage_candidate(clip);
    }

    fn handle_connectivity(&mut self, address: HardwareAddress, connected: bool) {
        if let Some(clip) = self.registry.get_mut(&address) {
            clip.connected = connected;
            self.emit(SessionEvent::ConnectivityChanged { address, connected });
        } else {
            debug!(sensor = %address, "connectivity change for unknown sensor");
        }
    }

    fn handle_ack(&mut self, command: u8, success: bool) {
        if !success {
            warn!("hub reported failure for command 0x{:02X}", command);
        }
        if command == CMD_STOP_MEASUREMENT {
            if let Some(poll) = self.stop_poll.take() {
                info!(run = %poll.run, "stop confirmed");
                self.run_id = None;
                self.set_state(SessionState::Ready);
                self.emit(SessionEvent::MeasurementStopped { run: poll.run });
            }
        }
    }
}

/// Spawn a session actor in the background, returning its handles
pub fn spawn_session<T: LinkTransport + 'static>(
    transport: T,
    link_rx: mpsc::Receiver<LinkEvent>,
    config: SessionConfig,
) -> (
    mpsc::Sender<SessionCommand>,
    broadcast::Receiver<SessionEvent>,
    tokio::task::JoinHandle<()>,
) {
    let mut session = DeviceSession::new(transport, link_rx, config);
    let command_tx = session.command_handle();
    let event_rx = session.subscribe();

    let task = tokio::spawn(async move {
        if let Err(e) = session.run().await {
            error!("device session error: {}", e);
        }
    });

    (command_tx, event_rx, task)
}
