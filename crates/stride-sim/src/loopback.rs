//! In-process client/server/proxy session over delayed links.
//!
//! Every message crosses a [`DelayLine`] as a serialized [`WireMessage`], so
//! the session exercises the same envelope a real transport would carry.

use std::sync::Arc;

use stride_config::{Config, ConfigError};
use stride_modifiers::{
    Authority, ClientSync, Level, ModifierCatalog, ModifierError, ModifierEventBuffer, ModifierSet,
    MoveHistory, Predicting, Proxy, ProxySync, Role, ServerSync, WireMessage, deserialize_message,
    serialize_message,
};

use crate::link::DelayLine;
use crate::script::{self, Actor, ResolvedCue, ResolvedZone, Script};

/// Server ticks between replication snapshots sent to the proxy.
const REPLICATE_INTERVAL: u64 = 6;

/// Traffic and protocol counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub acks: u64,
    pub corrections: u64,
    pub corrections_suppressed: u64,
    pub moves_replayed: u64,
    pub client_events: u64,
    pub stalls: u64,
    pub dropped_datagrams: u64,
}

/// Final state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub ticks: u64,
    pub stats: SessionStats,
    pub client_levels: Vec<Level>,
    pub server_levels: Vec<Level>,
    pub proxy_levels: Vec<Level>,
}

impl SessionReport {
    /// Client, server and proxy agree on every effective level.
    pub fn converged(&self) -> bool {
        self.client_levels == self.server_levels && self.proxy_levels == self.server_levels
    }
}

/// A predicting client, its authority, and a proxy watching the same pawn.
pub struct Loopback {
    catalog: Arc<ModifierCatalog>,
    script: Script,
    cues: Vec<ResolvedCue>,
    zones: Vec<ResolvedZone>,
    client_cursor: usize,
    server_cursor: usize,
    client: ClientSync,
    server: ServerSync,
    proxy: ProxySync,
    uplink: DelayLine,
    downlink: DelayLine,
    proxy_link: DelayLine,
    latency: u64,
    max_unacked: usize,
    stalled: bool,
    stats: SessionStats,
}

impl Loopback {
    /// Builds a session from `config`, failing if the catalog is invalid.
    pub fn new(config: &Config, script: Script) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);
        let cues = script.resolve(&catalog);
        let zones = script.resolve_zones(&catalog);
        let history = MoveHistory::new(
            config.network.history_size,
            config.network.resend_important_only,
        );
        let latency = config.simulation.latency_ticks;
        Ok(Self {
            client: ClientSync::new(ModifierSet::<Predicting>::new(catalog.clone()), history),
            server: ServerSync::new(ModifierSet::<Authority>::new(catalog.clone())),
            proxy: ProxySync::new(ModifierSet::<Proxy>::new(catalog.clone())),
            catalog,
            script,
            cues,
            zones,
            client_cursor: 0,
            server_cursor: 0,
            uplink: DelayLine::new(latency),
            downlink: DelayLine::new(latency),
            proxy_link: DelayLine::new(latency),
            latency: u64::from(latency),
            max_unacked: config.network.max_unacked_moves,
            stalled: false,
            stats: SessionStats::default(),
        })
    }

    /// Runs `ticks` scripted ticks, then keeps ticking without new cues
    /// until in-flight traffic has settled.
    pub fn run(&mut self, ticks: u64) -> SessionReport {
        let settle = 2 * self.latency + REPLICATE_INTERVAL + 2;
        let end = ticks + settle;
        for tick in 0..end {
            self.step(tick, tick < ticks);
        }
        tracing::debug!(
            uplink = self.uplink.in_flight(),
            downlink = self.downlink.in_flight(),
            proxy = self.proxy_link.in_flight(),
            "datagrams still in flight"
        );
        self.report(end)
    }

    /// Advances every peer by one tick.
    pub fn step(&mut self, tick: u64, scripted: bool) {
        if scripted {
            self.fire_client_cues(tick);
        }
        let motion = self.script.client_motion(tick);
        if let Some(packet) = self.client.tick(tick, &motion) {
            self.send_up(tick, WireMessage::Moves(packet));
        }

        if scripted {
            self.fire_server_cues(tick);
        }
        for datagram in self.uplink.deliver(tick) {
            self.server_receive(tick, &datagram);
        }
        if tick % REPLICATE_INTERVAL == 0 {
            let snapshot = WireMessage::Replicated(self.server.replicate(tick));
            if let Some(bytes) = encode(&snapshot) {
                self.proxy_link.push(tick, bytes);
            }
        }

        for datagram in self.downlink.deliver(tick) {
            self.client_receive(&datagram);
        }
        for datagram in self.proxy_link.deliver(tick) {
            match deserialize_message(&datagram) {
                Ok(WireMessage::Replicated(snapshot)) => {
                    self.proxy.on_replicated(&snapshot);
                }
                Ok(_) => tracing::warn!("proxy ignoring unexpected message"),
                Err(err) => self.drop_datagram(&err),
            }
        }

        self.log_events(tick);
        self.check_stall(tick);
    }

    fn fire_client_cues(&mut self, tick: u64) {
        while let Some(cue) = self.cues.get(self.client_cursor) {
            if cue.tick > tick {
                break;
            }
            if matches!(cue.actor, Actor::Client(_)) {
                let applied = script::apply_client(self.client.set_mut(), cue);
                tracing::debug!(
                    tick,
                    category = %cue.category,
                    op = ?cue.op,
                    applied,
                    "client cue"
                );
            }
            self.client_cursor += 1;
        }
    }

    fn fire_server_cues(&mut self, tick: u64) {
        while let Some(cue) = self.cues.get(self.server_cursor) {
            if cue.tick > tick {
                break;
            }
            if matches!(cue.actor, Actor::Server(_)) {
                let applied = script::apply_server(self.server.set_mut(), cue);
                tracing::debug!(
                    tick,
                    category = %cue.category,
                    op = ?cue.op,
                    applied,
                    "server cue"
                );
            }
            self.server_cursor += 1;
        }
    }

    fn send_up(&mut self, tick: u64, msg: WireMessage) {
        if let Some(bytes) = encode(&msg) {
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += bytes.len() as u64;
            tracing::trace!(tick, bytes = bytes.len(), "sending moves");
            self.uplink.push(tick, bytes);
        }
    }

    fn server_receive(&mut self, tick: u64, datagram: &[u8]) {
        let packet = match deserialize_message(datagram) {
            Ok(WireMessage::Moves(packet)) => packet,
            Ok(_) => {
                tracing::warn!("server ignoring unexpected message");
                return;
            }
            Err(err) => {
                self.drop_datagram(&err);
                return;
            }
        };
        let move_tick = packet.new.as_ref().map_or(tick, |new| new.tick);
        let motion = self.script.server_motion(move_tick);
        let zones = &self.zones;
        let response = self.server.receive_with(packet, &motion, |set, request| {
            for zone in zones {
                zone.apply(set, request.tick);
            }
        });
        if let Some(response) = response {
            trace_events("server", self.server.events_mut());
            if let Some(bytes) = encode(&response.into()) {
                self.downlink.push(tick, bytes);
            }
        }
    }

    fn client_receive(&mut self, datagram: &[u8]) {
        let msg = match deserialize_message(datagram) {
            Ok(msg) => msg,
            Err(err) => {
                self.drop_datagram(&err);
                return;
            }
        };
        match msg {
            WireMessage::Ack { .. } => self.stats.acks += 1,
            WireMessage::Correction(_) => self.stats.corrections += 1,
            _ => {}
        }
        let script = &self.script;
        let mut replayed = 0;
        self.client.handle_message(msg, |record| {
            replayed += 1;
            script.client_motion(record.tick())
        });
        self.stats.moves_replayed += replayed;
    }

    fn drop_datagram(&mut self, err: &ModifierError) {
        self.stats.dropped_datagrams += 1;
        tracing::warn!(%err, "dropping undecodable datagram");
    }

    fn log_events(&mut self, tick: u64) {
        let catalog = &self.catalog;
        for event in self.client.events_mut().drain() {
            self.stats.client_events += 1;
            let name = catalog.get(event.category).map_or("?", |spec| spec.name.as_str());
            tracing::info!(
                tick,
                category = name,
                kind = ?event.kind,
                old = event.old_level,
                new = event.new_level,
                "client modifier changed"
            );
        }
        trace_events("proxy", self.proxy.events_mut());
    }

    fn check_stall(&mut self, tick: u64) {
        let unacked = self.client.history().len();
        if unacked > self.max_unacked {
            if !self.stalled {
                self.stats.stalls += 1;
                tracing::warn!(
                    tick,
                    unacked,
                    limit = self.max_unacked,
                    "client stalled waiting for acks"
                );
            }
            self.stalled = true;
        } else {
            self.stalled = false;
        }
    }

    fn report(&self, ticks: u64) -> SessionReport {
        SessionReport {
            ticks,
            stats: SessionStats {
                corrections_suppressed: self.server.corrections_suppressed(),
                ..self.stats
            },
            client_levels: effective_levels(self.client.set()),
            server_levels: effective_levels(self.server.set()),
            proxy_levels: effective_levels(self.proxy.set()),
        }
    }
}

fn effective_levels<R: Role>(set: &ModifierSet<R>) -> Vec<Level> {
    set.iter().map(|category| category.effective_level()).collect()
}

fn trace_events(peer: &str, events: &mut ModifierEventBuffer) {
    for event in events.drain() {
        tracing::trace!(peer, category = %event.category, new = event.new_level, "modifier changed");
    }
}

fn encode(msg: &WireMessage) -> Option<Vec<u8>> {
    match serialize_message(msg) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::warn!(%err, "failed to encode message");
            None
        }
    }
}
