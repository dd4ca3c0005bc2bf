use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// The type of information passed to the statistics counters
#[derive(Debug, Clone, Copy)]
pub enum Stats {
    ReceivedBytes(usize),
    SendBytes(usize),
    ReceivedPkts(usize),
    SendPkts(usize),
    ErrorPkts(usize),
}

pub trait Number {
    fn add(&self, value: usize);
    fn get(&self) -> usize;
}

#[derive(Default)]
pub struct Count(AtomicUsize);

impl Number for Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Transport level counters, shared by every loop in the process.
pub struct Counts<T> {
    pub received_bytes: T,
    pub send_bytes: T,
    pub received_pkts: T,
    pub send_pkts: T,
    pub error_pkts: T,
}

impl<T: Number> Counts<T> {
    /// # Example
    ///
    /// ```
    /// use rtp_stream::statistics::*;
    ///
    /// let counts = Counts {
    ///     received_bytes: Count::default(),
    ///     send_bytes: Count::default(),
    ///     received_pkts: Count::default(),
    ///     send_pkts: Count::default(),
    ///     error_pkts: Count::default(),
    /// };
    ///
    /// counts.add(&Stats::ReceivedBytes(1));
    /// assert_eq!(counts.received_bytes.get(), 1);
    ///
    /// counts.add(&Stats::SendPkts(2));
    /// assert_eq!(counts.send_pkts.get(), 2);
    /// ```
    pub fn add(&self, payload: &Stats) {
        match payload {
            Stats::ReceivedBytes(value) => self.received_bytes.add(*value),
            Stats::SendBytes(value) => self.send_bytes.add(*value),
            Stats::ReceivedPkts(value) => self.received_pkts.add(*value),
            Stats::SendPkts(value) => self.send_pkts.add(*value),
            Stats::ErrorPkts(value) => self.error_pkts.add(*value),
        }
    }
}

impl Default for Counts<Count> {
    fn default() -> Self {
        Self {
            received_bytes: Count::default(),
            send_bytes: Count::default(),
            received_pkts: Count::default(),
            send_pkts: Count::default(),
            error_pkts: Count::default(),
        }
    }
}

#[derive(Default, Clone)]
pub struct Statistics(Arc<Counts<Count>>);

impl Statistics {
    pub fn add(&self, payloads: &[Stats]) {
        for payload in payloads {
            self.0.add(payload);
        }
    }

    pub fn counts(&self) -> &Counts<Count> {
        &self.0
    }
}
