//! Datagram transports.
//!
//! The session only needs unreliable, unordered delivery of whole
//! datagrams. [`ChannelTransport`] connects two sessions in one process;
//! [`LinkConditioner`] degrades any transport with seeded latency, jitter
//! and loss so tests and the harness are reproducible.

use std::collections::BTreeMap;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
}

/// Non-blocking datagram transport. `now_ms` is the caller's clock so
/// simulated transports stay deterministic.
pub trait Transport {
    fn send(&mut self, now_ms: u64, datagram: Vec<u8>) -> Result<(), TransportError>;

    /// The next datagram, `Ok(None)` if nothing is ready.
    fn try_recv(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, now_ms: u64, datagram: Vec<u8>) -> Result<(), TransportError> {
        (**self).send(now_ms, datagram)
    }

    fn try_recv(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).try_recv(now_ms)
    }
}

// ============================================================================
// In-process channel
// ============================================================================

#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Two connected endpoints.
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            ChannelTransport { tx: a_tx, rx: a_rx },
            ChannelTransport { tx: b_tx, rx: b_rx },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, _now_ms: u64, datagram: Vec<u8>) -> Result<(), TransportError> {
        self.tx.send(datagram).map_err(|_| TransportError::Closed)
    }

    fn try_recv(&mut self, _now_ms: u64) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

// ============================================================================
// Link conditioner
// ============================================================================

/// Degradation applied to received datagrams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConditions {
    pub latency_ms: u64,
    /// Extra delay drawn uniformly from `0..=jitter_ms`. Jitter larger than
    /// the send interval reorders datagrams.
    pub jitter_ms: u64,
    pub loss_percent: f64,
}

impl LinkConditions {
    pub const PERFECT: LinkConditions = LinkConditions {
        latency_ms: 0,
        jitter_ms: 0,
        loss_percent: 0.0,
    };
}

/// Wraps a transport and delays, drops and reorders what it receives.
pub struct LinkConditioner<T> {
    inner: T,
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    /// Keyed by (deliver_at_ms, arrival order).
    in_flight: BTreeMap<(u64, u64), Vec<u8>>,
    arrivals: u64,
    inner_closed: bool,
    dropped: u64,
}

impl<T: Transport> LinkConditioner<T> {
    pub fn new(inner: T, conditions: LinkConditions, seed: u64) -> Self {
        Self {
            inner,
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            in_flight: BTreeMap::new(),
            arrivals: 0,
            inner_closed: false,
            dropped: 0,
        }
    }

    /// Datagrams discarded as lost so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn conditions(&self) -> LinkConditions {
        self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    fn pull_inner(&mut self, now_ms: u64) {
        while !self.inner_closed {
            match self.inner.try_recv(now_ms) {
                Ok(Some(datagram)) => self.admit(now_ms, datagram),
                Ok(None) => break,
                Err(TransportError::Closed) => self.inner_closed = true,
            }
        }
    }

    fn admit(&mut self, now_ms: u64, datagram: Vec<u8>) {
        if self.conditions.loss_percent > 0.0
            && self.rng.gen_range(0.0..100.0) < self.conditions.loss_percent
        {
            self.dropped += 1;
            return;
        }
        let jitter = if self.conditions.jitter_ms > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ms)
        } else {
            0
        };
        let deliver_at = now_ms + self.conditions.latency_ms + jitter;
        self.in_flight.insert((deliver_at, self.arrivals), datagram);
        self.arrivals += 1;
    }
}

impl<T: Transport> Transport for LinkConditioner<T> {
    fn send(&mut self, now_ms: u64, datagram: Vec<u8>) -> Result<(), TransportError> {
        self.inner.send(now_ms, datagram)
    }

    fn try_recv(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>, TransportError> {
        self.pull_inner(now_ms);
        match self.in_flight.first_key_value() {
            Some((&(deliver_at, _), _)) if deliver_at <= now_ms => {
                Ok(self.in_flight.pop_first().map(|(_, datagram)| datagram))
            }
            Some(_) => Ok(None),
            None if self.inner_closed => Err(TransportError::Closed),
            None => Ok(None),
        }
    }
}
