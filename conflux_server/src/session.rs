//! Per-client session driver.
//!
//! Each connected client gets one `Session` on its own thread, driving a
//! seven-state machine over its reply socket: receive the meta-data
//! handshake, bind produced and consumed attributes into the registry, then
//! alternate data frames until the client closes, re-binds, or the hub
//! shuts down. All registry access happens in short lock windows with no
//! socket I/O under the lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use conflux_core::attribute::Attribute;
use conflux_core::convert::{ConversionTable, UnitSystem};
use conflux_core::error::CoreError;
use conflux_core::hub::Hub;
use conflux_core::mailbox::MergeState;
use conflux_core::meta::{self, RequestMetaData, ResponseMetaData};
use conflux_core::registry::{EntryId, ProducerBinding, Registry};
use conflux_env::{ReplySocket, TransportError};

/// Pause between polls of a condition another session will satisfy.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Waiting conditions log at most once per this interval.
const LOG_THROTTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Meta(#[from] CoreError),
}

/// The session state machine's states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    ReceiveRequestMetaData,
    BindObjects,
    SendResponseMetaData,
    ReceiveSendData,
    BindSendData,
    BindReceiveData,
    SendReceiveData,
}

/// A bound value slot: a registry entry axis plus the factor between the
/// client's unit frame and canonical SI. Stable for one bind cycle.
#[derive(Debug, Clone, Copy)]
struct Binding {
    entry: EntryId,
    axis: usize,
    scale: f64,
}

pub struct Session<S: ReplySocket> {
    socket: S,
    endpoint: String,
    hub: Arc<Hub>,
    state: SessionState,

    simulation_name: String,
    request_simulation_name: String,
    world_name: String,
    request: RequestMetaData,
    response: ResponseMetaData,
    send_objects: BTreeMap<String, Vec<Attribute>>,
    receive_objects: BTreeMap<String, Vec<Attribute>>,

    send_bindings: Vec<Binding>,
    recv_bindings: Vec<Binding>,
    send_buf: Vec<f64>,
    recv_buf: Vec<f64>,
    conversion: ConversionTable,
    time_unit_scale: f64,
    receive_primed: bool,
}

impl<S: ReplySocket> Session<S> {
    pub fn new(socket: S, hub: Arc<Hub>) -> Session<S> {
        let endpoint = socket.endpoint().to_string();
        hub.set_needs_cleanup(&endpoint, false);
        info!("[{}] session bound", endpoint);
        Session {
            socket,
            endpoint,
            hub,
            state: SessionState::ReceiveRequestMetaData,
            simulation_name: String::new(),
            request_simulation_name: String::new(),
            world_name: String::new(),
            request: RequestMetaData::default(),
            response: ResponseMetaData::default(),
            send_objects: BTreeMap::new(),
            receive_objects: BTreeMap::new(),
            send_bindings: Vec::new(),
            recv_bindings: Vec::new(),
            send_buf: Vec::new(),
            recv_buf: Vec::new(),
            conversion: ConversionTable::default(),
            time_unit_scale: 1.0,
            receive_primed: false,
        }
    }

    /// Drives the state machine until the hub shuts down or the session
    /// becomes unrecoverable.
    pub fn run(mut self) {
        while !self.hub.shutdown.is_triggered() {
            let step = match self.state {
                SessionState::ReceiveRequestMetaData => self.receive_request_meta_data(),
                SessionState::BindObjects => self.bind_objects(),
                SessionState::SendResponseMetaData => self.send_response_meta_data(),
                SessionState::ReceiveSendData => self.receive_send_data(),
                SessionState::BindSendData => self.bind_send_data(),
                SessionState::BindReceiveData => self.bind_receive_data(),
                SessionState::SendReceiveData => self.send_receive_data(),
            };
            match step {
                Ok(next) => self.state = next,
                Err(SessionError::Transport(e)) => {
                    info!("[{}] {}, hub prepares to close", self.endpoint, e);
                    self.hub.shutdown.trigger();
                }
                Err(SessionError::Meta(e)) => {
                    error!("[{}] aborting session: {}", self.endpoint, e);
                    break;
                }
            }
        }
        self.finalize();
    }

    /// Blocks on the socket in timeout slices, watching the shutdown token
    /// between slices. `None` means shutdown was observed first.
    fn recv_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            if self.hub.shutdown.is_triggered() {
                return Ok(None);
            }
            if let Some(payload) = self.socket.recv()? {
                return Ok(Some(payload));
            }
        }
    }

    fn receive_request_meta_data(&mut self) -> Result<SessionState, SessionError> {
        self.send_buf = vec![0.0];
        self.recv_buf = vec![0.0];
        self.receive_primed = false;

        self.hub.set_needs_cleanup(&self.endpoint, false);
        let Some(payload) = self.recv_message()? else {
            return Ok(SessionState::ReceiveRequestMetaData);
        };
        self.hub.set_needs_cleanup(&self.endpoint, true);

        match RequestMetaData::from_payload(&payload) {
            Some(request) => {
                self.request = request;
                self.hub.set_needs_cleanup(&self.endpoint, false);
                Ok(SessionState::BindObjects)
            }
            // Keep-alive probe: broadcast with whatever is already bound.
            None => Ok(SessionState::BindReceiveData),
        }
    }

    fn bind_objects(&mut self) -> Result<SessionState, SessionError> {
        self.init_response_meta_data()?;
        let hub = Arc::clone(&self.hub);

        {
            let mut registry = hub.registry.lock().unwrap();
            self.bind_send_objects(&mut registry)?;
            self.receive_objects = registry.expand_receive(&self.world_name, &self.request.receive)?;
        }

        self.wait_for_objects();

        {
            let mut registry = hub.registry.lock().unwrap();
            self.bind_receive_objects(&mut registry);
        }

        Ok(SessionState::SendResponseMetaData)
    }

    /// Resolves the simulation identity, the conversion table and the
    /// response skeleton from the request.
    fn init_response_meta_data(&mut self) -> Result<(), SessionError> {
        match self.request.name.clone() {
            None => {
                if self.simulation_name.is_empty() {
                    return Err(CoreError::MissingSimulationName(self.endpoint.clone()).into());
                }
            }
            Some(name) => {
                self.request_simulation_name = name;
                if self.request_simulation_name != self.simulation_name
                    && !self.simulation_name.is_empty()
                    && self.hub.mailbox.contains(&self.request_simulation_name)
                {
                    // Another session owns this simulation name: merge our
                    // declarations into its slot and let it renegotiate.
                    let slot = self.hub.mailbox.slot(&self.request_simulation_name);
                    slot.merge_request(&self.request);
                    debug!(
                        "[{}] merged meta data into [{}]: {:?}",
                        self.endpoint,
                        self.request_simulation_name,
                        slot.doc()
                    );
                    slot.set_state(MergeState::WaitForOtherSimulation);
                    self.request.world = slot.doc().world;
                    self.request.receive.clear();
                } else {
                    self.simulation_name = self.request_simulation_name.clone();
                }
            }
        }
        self.hub.mailbox.reset(&self.simulation_name, self.request.clone());

        self.world_name = self.request.world.clone().unwrap_or_else(|| "world".to_string());
        let units = UnitSystem::from_request(&self.request)?;
        self.conversion = ConversionTable::build(&units);
        self.time_unit_scale = units.time;

        let world_time = self.hub.registry.lock().unwrap().world_time(&self.world_name);
        self.response = ResponseMetaData {
            world: self.world_name.clone(),
            angle_unit: self.request.angle_unit.clone().unwrap_or_else(|| "rad".into()),
            length_unit: self.request.length_unit.clone().unwrap_or_else(|| "m".into()),
            mass_unit: self.request.mass_unit.clone().unwrap_or_else(|| "kg".into()),
            time_unit: self.request.time_unit.clone().unwrap_or_else(|| "s".into()),
            handedness: units.handedness.name().to_string(),
            time: world_time * self.time_unit_scale,
            ..ResponseMetaData::default()
        };
        Ok(())
    }

    /// Binds every produced attribute into the registry, starting with the
    /// world time slot, and echoes current values into the response.
    fn bind_send_objects(&mut self, registry: &mut Registry) -> Result<(), SessionError> {
        let send_objects = meta::parse_attribute_map(&self.request.send)?;

        let time_entry = registry.time_entry(&self.world_name);
        self.send_bindings.push(Binding {
            entry: time_entry,
            axis: 0,
            scale: self.conversion.scale(Attribute::Time)[0],
        });

        for (object, attributes) in &send_objects {
            for attribute in attributes {
                let scales = self.conversion.scale(*attribute);
                let binding =
                    registry.bind_producer(&self.world_name, object, *attribute, &self.endpoint);
                let entry = binding.entry();
                let echo: Vec<f64> = match binding {
                    // Fresh entries echo their raw canonical defaults.
                    ProducerBinding::Created(_) => registry.entry(entry).values.clone(),
                    ProducerBinding::Effort(_) | ProducerBinding::Resumed(_) => {
                        if matches!(binding, ProducerBinding::Resumed(_)) {
                            info!(
                                "[{}] continue state [{} - {}]",
                                self.endpoint, object, attribute
                            );
                        }
                        registry
                            .entry(entry)
                            .values
                            .iter()
                            .zip(scales)
                            .map(|(value, scale)| value * scale)
                            .collect()
                    }
                };
                for axis in 0..registry.entry(entry).values.len() {
                    self.send_bindings.push(Binding { entry, axis, scale: scales[axis] });
                }
                self.response
                    .send
                    .entry(object.clone())
                    .or_default()
                    .insert(attribute.name().to_string(), echo);
            }
        }
        self.send_objects = send_objects;
        Ok(())
    }

    /// Polls until every consumed (object, attribute) pair has been declared
    /// by some producer.
    fn wait_for_objects(&self) {
        let mut last_log = Instant::now();
        loop {
            if self.hub.shutdown.is_triggered() {
                return;
            }
            let missing = {
                let registry = self.hub.registry.lock().unwrap();
                self.receive_objects.iter().find_map(|(object, attributes)| {
                    attributes
                        .iter()
                        .find(|attribute| {
                            registry.lookup(&self.world_name, object, **attribute).is_none()
                        })
                        .map(|attribute| (object.clone(), *attribute))
                })
            };
            let Some((object, attribute)) = missing else { return };
            if last_log.elapsed() >= LOG_THROTTLE {
                info!(
                    "[{}] waiting for [{}][{}] to be declared",
                    self.endpoint, object, attribute
                );
                last_log = Instant::now();
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Binds every consumed attribute with reciprocal scales and echoes the
    /// current values into the response.
    fn bind_receive_objects(&mut self, registry: &mut Registry) {
        let receive_objects = std::mem::take(&mut self.receive_objects);

        let time_entry = registry.time_entry(&self.world_name);
        self.recv_bindings.push(Binding {
            entry: time_entry,
            axis: 0,
            scale: self.conversion.scale(Attribute::Time)[0],
        });

        for (object, attributes) in &receive_objects {
            for attribute in attributes {
                let Some(entry) = registry.lookup(&self.world_name, object, *attribute) else {
                    continue; // guaranteed present by wait_for_objects
                };
                let arity = if attribute.is_effort() {
                    registry.mark_written(&self.world_name, object, *attribute);
                    3
                } else {
                    registry.entry(entry).values.len()
                };
                let scales = self.conversion.scale(*attribute);
                let mut echo = Vec::with_capacity(arity);
                for axis in 0..arity {
                    let scale = 1.0 / scales[axis];
                    self.recv_bindings.push(Binding { entry, axis, scale });
                    echo.push(registry.entry(entry).values[axis] * scale);
                }
                self.response
                    .receive
                    .entry(object.clone())
                    .or_default()
                    .insert(attribute.name().to_string(), echo);
            }
        }
        self.receive_objects = receive_objects;
    }

    fn send_response_meta_data(&mut self) -> Result<SessionState, SessionError> {
        let send_size = self.send_bindings.len();
        let recv_size = self.recv_bindings.len();

        if self.hub.shutdown.is_triggered() {
            self.response.time = -1.0;
        }

        let payload = self.response.to_payload();
        self.socket.send(&payload).map_err(SessionError::Transport)?;

        self.send_buf = vec![0.0; send_size];
        self.recv_buf = vec![0.0; recv_size];

        if send_size <= 1 && recv_size <= 1 {
            // Nothing left to exchange: a pure query bound only the time
            // slot, and a clean close cleared both vectors. Either way the
            // session returns to the handshake.
            self.send_bindings.clear();
            self.recv_bindings.clear();
            Ok(SessionState::ReceiveRequestMetaData)
        } else {
            self.hub.set_needs_cleanup(&self.endpoint, true);
            Ok(SessionState::ReceiveSendData)
        }
    }

    fn receive_send_data(&mut self) -> Result<SessionState, SessionError> {
        self.hub.set_needs_cleanup(&self.endpoint, false);
        let Some(payload) = self.recv_message()? else {
            return Ok(SessionState::ReceiveSendData);
        };
        self.hub.set_needs_cleanup(&self.endpoint, true);

        let byte0 = payload.first().copied().unwrap_or(0);
        let byte1 = payload.get(1).copied().unwrap_or(0);
        // Wire-compatible copy gate: frames opening an object or closing one
        // at byte 1 never reach the scratch buffer.
        if byte0 != b'{' && byte1 != b'}' {
            for (slot, chunk) in self.send_buf.iter_mut().zip(payload.chunks_exact(8)) {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                *slot = f64::from_le_bytes(bytes);
            }
        }

        if byte0 == b'{' {
            if meta::is_empty_object(&payload) {
                info!("[{}] received close signal", self.endpoint);
                self.send_bindings.clear();
                self.recv_bindings.clear();
                return Ok(SessionState::SendResponseMetaData);
            }
            if let Ok(serde_json::Value::Object(members)) =
                serde_json::from_slice::<serde_json::Value>(&payload)
            {
                if !members.is_empty() {
                    if let Ok(request) =
                        serde_json::from_value(serde_json::Value::Object(members))
                    {
                        self.request = request;
                        self.send_bindings.clear();
                        self.recv_bindings.clear();
                        return Ok(SessionState::BindObjects);
                    }
                }
            }
        }

        if self.send_buf.first().copied().unwrap_or(0.0).is_nan() {
            // Pull-only frame: skip the write phase and broadcast.
            return Ok(SessionState::BindReceiveData);
        }
        Ok(SessionState::BindSendData)
    }

    fn bind_send_data(&mut self) -> Result<SessionState, SessionError> {
        {
            let mut registry = self.hub.registry.lock().unwrap();
            for (index, (binding, value)) in
                self.send_bindings.iter().zip(&self.send_buf).enumerate()
            {
                if index == 0 && (value.is_nan() || *value < 0.0) {
                    // World time only moves on explicit non-negative stamps.
                    continue;
                }
                registry.entry_mut(binding.entry).values[binding.axis] = value * binding.scale;
            }
        }

        if self.request_simulation_name != self.simulation_name
            && self.hub.mailbox.contains(&self.request_simulation_name)
        {
            let slot = self.hub.mailbox.slot(&self.request_simulation_name);
            let mut last_log = Instant::now();
            while !self.hub.shutdown.is_triggered() {
                match slot.state() {
                    MergeState::WaitForSendingData | MergeState::None => break,
                    _ => {
                        if last_log.elapsed() >= LOG_THROTTLE {
                            info!(
                                "[{}] waiting for [{}] to start renegotiating",
                                self.endpoint, self.request_simulation_name
                            );
                            last_log = Instant::now();
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                }
            }
            slot.set_state(MergeState::Done);
        }

        Ok(SessionState::BindReceiveData)
    }

    fn bind_receive_data(&mut self) -> Result<SessionState, SessionError> {
        self.wait_for_receive_data();

        let mut registry = self.hub.registry.lock().unwrap();
        for (object, attributes) in &self.receive_objects {
            for kind in [Attribute::Force, Attribute::Torque] {
                if attributes.contains(&kind) {
                    registry.aggregate_efforts(&self.world_name, object, kind);
                }
            }
        }
        for (slot, binding) in self.recv_buf.iter_mut().zip(&self.recv_bindings) {
            *slot = registry.entry(binding.entry).values[binding.axis] * binding.scale;
        }

        Ok(SessionState::SendReceiveData)
    }

    /// Marks this session's produced attributes as written, then, once per
    /// bind cycle, waits for every consumed attribute to carry producer data.
    fn wait_for_receive_data(&mut self) {
        {
            let mut registry = self.hub.registry.lock().unwrap();
            for (object, attributes) in &self.send_objects {
                for attribute in attributes {
                    registry.mark_written(&self.world_name, object, *attribute);
                }
            }
        }

        if self.receive_primed {
            return;
        }
        for (object, attributes) in &self.receive_objects {
            for attribute in attributes {
                let mut last_log = Instant::now();
                loop {
                    if self.hub.shutdown.is_triggered() {
                        return;
                    }
                    let written = self
                        .hub
                        .registry
                        .lock()
                        .unwrap()
                        .is_written(&self.world_name, object, *attribute);
                    if written {
                        break;
                    }
                    if last_log.elapsed() >= LOG_THROTTLE {
                        info!(
                            "[{}] waiting for data of [{}][{}] to be sent",
                            self.endpoint, object, attribute
                        );
                        last_log = Instant::now();
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
        self.receive_primed = true;
    }

    /// Writes the shutdown/renegotiation sentinel into the time slot and
    /// sends the receive buffer as a little-endian binary frame.
    fn transmit_receive_buffer(&mut self, renegotiating: bool) -> Result<(), TransportError> {
        if self.hub.shutdown.is_triggered() {
            if let Some(first) = self.recv_buf.first_mut() {
                *first = -1.0;
            }
        } else if renegotiating {
            if let Some(first) = self.recv_buf.first_mut() {
                *first = -2.0;
            }
        }
        let frame: Vec<u8> = self.recv_buf.iter().flat_map(|value| value.to_le_bytes()).collect();
        self.socket.send(&frame)
    }

    fn send_receive_data(&mut self) -> Result<SessionState, SessionError> {
        let slot = self
            .hub
            .mailbox
            .get(&self.simulation_name)
            .filter(|slot| slot.state() == MergeState::WaitForOtherSimulation);

        self.transmit_receive_buffer(slot.is_some())
            .map_err(SessionError::Transport)?;

        let Some(slot) = slot else {
            return Ok(SessionState::ReceiveSendData);
        };

        // Another client merged into our simulation name: hand the merged
        // document back and restart the handshake.
        debug!("[{}] renegotiating meta data: {:?}", self.endpoint, slot.doc());
        slot.set_state(MergeState::WaitForSendingData);
        let mut last_log = Instant::now();
        while !self.hub.shutdown.is_triggered() {
            if slot.state() == MergeState::Done {
                break;
            }
            if last_log.elapsed() >= LOG_THROTTLE {
                info!(
                    "[{}] waiting for [{}] to acknowledge the merged meta data",
                    self.endpoint, self.simulation_name
                );
                last_log = Instant::now();
            }
            thread::sleep(POLL_INTERVAL);
        }

        self.send_buf = vec![0.0];
        self.recv_buf = vec![0.0];
        self.receive_primed = false;

        self.hub.set_needs_cleanup(&self.endpoint, false);
        let received = self.recv_message().map_err(SessionError::Transport)?;
        self.hub.set_needs_cleanup(&self.endpoint, true);
        if received.is_some() {
            // The client's own request is superseded by the merged document.
            self.request = slot.doc();
            let merged = serde_json::to_vec(&self.request).unwrap_or_default();
            self.socket.send(&merged).map_err(SessionError::Transport)?;
            slot.set_state(MergeState::None);
        }

        self.send_bindings.clear();
        self.recv_bindings.clear();
        Ok(SessionState::ReceiveRequestMetaData)
    }

    /// Answers any in-flight request so the client does not hang, then
    /// releases the endpoint.
    fn finalize(&mut self) {
        if self.hub.needs_cleanup(&self.endpoint) {
            if !matches!(
                self.state,
                SessionState::ReceiveSendData | SessionState::ReceiveRequestMetaData
            ) {
                if let Err(e) = self.transmit_receive_buffer(false) {
                    warn!("[{}] final frame not delivered: {}", self.endpoint, e);
                }
            }
            info!("[{}] unbinding", self.endpoint);
            if let Err(e) = self.socket.unbind() {
                warn!("[{}] socket could not be unbound: {}", self.endpoint, e);
            }
        }
        self.hub.set_needs_cleanup(&self.endpoint, false);
    }
}
