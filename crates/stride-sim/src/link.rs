//! Fixed-latency datagram link between two simulated peers.

use std::collections::VecDeque;

/// One-way link delivering datagrams a fixed number of ticks after they
/// were sent, in send order.
#[derive(Debug, Clone)]
pub struct DelayLine {
    latency: u64,
    in_flight: VecDeque<(u64, Vec<u8>)>,
}

impl DelayLine {
    pub fn new(latency_ticks: u32) -> Self {
        Self {
            latency: u64::from(latency_ticks),
            in_flight: VecDeque::new(),
        }
    }

    /// Queues `datagram` sent at tick `now`.
    pub fn push(&mut self, now: u64, datagram: Vec<u8>) {
        self.in_flight.push_back((now + self.latency, datagram));
    }

    /// Removes and returns every datagram due at or before `now`.
    pub fn deliver(&mut self, now: u64) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        while let Some((due, _)) = self.in_flight.front() {
            if *due > now {
                break;
            }
            if let Some((_, datagram)) = self.in_flight.pop_front() {
                ready.push(datagram);
            }
        }
        ready
    }

    /// Datagrams sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_latency_delivers_same_tick() {
        let mut link = DelayLine::new(0);
        link.push(5, vec![1]);
        assert_eq!(link.deliver(5), vec![vec![1]]);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn test_delivery_waits_for_latency() {
        let mut link = DelayLine::new(3);
        link.push(10, vec![1]);
        link.push(11, vec![2]);
        assert!(link.deliver(12).is_empty());
        assert_eq!(link.deliver(13), vec![vec![1]]);
        assert_eq!(link.in_flight(), 1);
        assert_eq!(link.deliver(20), vec![vec![2]]);
    }

    #[test]
    fn test_send_order_preserved() {
        let mut link = DelayLine::new(1);
        link.push(0, vec![1]);
        link.push(0, vec![2]);
        link.push(0, vec![3]);
        assert_eq!(link.deliver(1), vec![vec![1], vec![2], vec![3]]);
    }
}
