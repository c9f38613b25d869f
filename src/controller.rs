//! Session owner: ties the transport, codec, registry and dispatcher into
//! one running engine.
//!
//! Startup is connect, sniff, classify; a failed classification aborts the
//! session instead of guessing a dialect. After that two loops run per
//! connection: the inbound loop turns verified frames into registry updates
//! and ack matches, the outbound loop drains the dispatcher's paced packet
//! stream onto the wire. Losing the connection tears both down, reconnects
//! with backoff and resumes with the same queue and registry; in-flight
//! commands keep their attempt counters, nothing is replayed.

use std::sync::{Arc, Mutex};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    codec,
    constants::DETECT_WINDOW_BYTES,
    detect::{self, HardwareGeneration},
    device::{Category, CommandValue, DeviceKey, DeviceState, DeviceSubType, DeviceType},
    dispatch::{CommandReport, DispatchConfig, Dispatcher},
    error::Result,
    registry::Registry,
    transport::{ConnectionState, FrameSink, FrameSource, Transport},
};

#[derive(Debug, Clone)]
pub struct Config {
    /// `COM<n>` or `/dev/tty...` for a local serial device, `host:port`
    /// for a socket bridge.
    pub target: String,
    pub dispatch: DispatchConfig,
}

impl Config {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dispatch: DispatchConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct Controller {
    generation: HardwareGeneration,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<Mutex<Registry>>,
    state_rx: watch::Receiver<ConnectionState>,
    reports: Mutex<Option<mpsc::UnboundedReceiver<CommandReport>>>,
    session: JoinHandle<()>,
}

impl Controller {
    /// Connect to the bus, detect the hardware generation and start the
    /// engine. Blocks until the first connection is up and classification
    /// has finished; a short sniff window is a hard error.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut transport = Transport::new(&config.target);
        let state_rx = transport.state();

        let (mut source, sink) = transport.connect_with_backoff().await;
        let sample = source.sniff(DETECT_WINDOW_BYTES).await;
        let generation = detect::classify(&sample)?;

        let (dispatcher, reports_rx) = Dispatcher::new(config.dispatch);
        let dispatcher = Arc::new(dispatcher);
        let registry = Arc::new(Mutex::new(Registry::new()));

        let session = tokio::spawn(session_loop(
            transport,
            Some((source, sink)),
            generation,
            dispatcher.clone(),
            registry.clone(),
        ));

        Ok(Self {
            generation,
            dispatcher,
            registry,
            state_rx,
            reports: Mutex::new(Some(reports_rx)),
            session,
        })
    }

    pub fn generation(&self) -> HardwareGeneration {
        self.generation
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Change notifications for one outward category.
    pub fn subscribe(&self, category: Category) -> mpsc::UnboundedReceiver<DeviceState> {
        self.registry
            .lock()
            .expect("registry poisoned")
            .subscribe(category)
    }

    /// Terminal command outcomes (acked or dropped). Single consumer; the
    /// second call returns `None`.
    pub fn reports(&self) -> Option<mpsc::UnboundedReceiver<CommandReport>> {
        self.reports.lock().expect("reports poisoned").take()
    }

    pub fn device(&self, key: &DeviceKey) -> Option<DeviceState> {
        self.registry
            .lock()
            .expect("registry poisoned")
            .lookup(key)
            .cloned()
    }

    pub fn devices_in_category(&self, category: Category) -> Vec<DeviceState> {
        self.registry
            .lock()
            .expect("registry poisoned")
            .devices_in_category(category)
    }

    /// Enqueue a command. Returns immediately with the task id; the
    /// outcome arrives on the report channel. Fails only when the device
    /// family has no packet for the request.
    pub fn submit_command(
        &self,
        device_type: DeviceType,
        room_id: u8,
        device_index: u8,
        sub_type: DeviceSubType,
        value: CommandValue,
    ) -> Result<u64> {
        let built = codec::build(
            device_type,
            room_id,
            device_index,
            sub_type,
            &value,
            self.generation,
        )?;
        Ok(self
            .dispatcher
            .submit(device_type, room_id, device_index, sub_type, value, built))
    }

    /// Stop both loops and drop the connection. Queued and in-flight
    /// commands are abandoned without a report.
    pub fn shutdown(&self) {
        self.session.abort();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.session.abort();
    }
}

async fn session_loop(
    mut transport: Transport,
    mut initial: Option<(FrameSource, FrameSink)>,
    generation: HardwareGeneration,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<Mutex<Registry>>,
) {
    loop {
        let (mut source, mut sink) = match initial.take() {
            Some(halves) => halves,
            None => transport.connect_with_backoff().await,
        };

        // Capacity 1 keeps the dispatcher's pacing honest: a packet sits in
        // the channel only while the previous one is still being written.
        let (packet_tx, mut packet_rx) = mpsc::channel::<Vec<u8>>(1);
        let outbound = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(packet_tx).await })
        };

        let lost = loop {
            tokio::select! {
                frame = source.read_frame() => match frame {
                    Ok(frame) => handle_inbound(&frame, generation, &dispatcher, &registry),
                    Err(e) => break e,
                },
                Some(packet) = packet_rx.recv() => {
                    if let Err(e) = sink.send(&packet).await {
                        break e;
                    }
                }
            }
        };

        outbound.abort();
        transport.mark_disconnected();
        warn!(error = %lost, "bus connection lost, reconnecting");
    }
}

fn handle_inbound(
    frame: &crate::message::RawFrame,
    generation: HardwareGeneration,
    dispatcher: &Dispatcher,
    registry: &Mutex<Registry>,
) {
    if let Err(e) = frame.verify_strict() {
        debug!(error = %e, bytes = %hex::encode(frame.as_slice()), "discarding frame");
        return;
    }
    dispatcher.handle_frame(frame);
    let states = codec::parse(frame, generation);
    if states.is_empty() {
        return;
    }
    let mut registry = registry.lock().expect("registry poisoned");
    for state in states {
        registry.apply(state);
    }
}
