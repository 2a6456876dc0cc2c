use std::collections::HashSet;

use santitham_network::NetAddr;

/// Addresses whose advertised timestamp is older than this are dropped
/// instead of dialed.
pub const MAX_PEER_AGE_SECS: u64 = 10 * 24 * 60 * 60;

/// Candidate peers learned from `addr` messages. Owned by the pool control
/// loop; an address is consumed when it is handed out for dialing.
#[derive(Default)]
pub struct AddrBook {
    entries: HashSet<NetAddr>,
}

impl AddrBook {
    pub fn insert_many(&mut self, addrs: Vec<NetAddr>) -> usize {
        let mut inserted = 0;
        for addr in addrs {
            if self.entries.insert(addr) {
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pops up to `limit` dialable addresses. Entries past the age cutoff
    /// are consumed without being returned.
    pub fn pop_batch(&mut self, limit: usize, now_secs: u64) -> Vec<NetAddr> {
        let mut batch = Vec::new();
        while batch.len() < limit {
            let Some(addr) = self.entries.iter().next().copied() else {
                break;
            };
            self.entries.remove(&addr);
            if now_secs.saturating_sub(u64::from(addr.time)) > MAX_PEER_AGE_SECS {
                continue;
            }
            batch.push(addr);
        }
        batch
    }

    pub fn snapshot(&self) -> Vec<NetAddr> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use santitham_network::Services;

    fn addr(last_octet: u8, time: u32) -> NetAddr {
        let mut ip = [0u8; 16];
        ip[10] = 0xFF;
        ip[11] = 0xFF;
        ip[12..].copy_from_slice(&[192, 0, 2, last_octet]);
        NetAddr {
            time,
            services: Services::NODE_NETWORK,
            ip,
            port: 8333,
        }
    }

    #[test]
    fn duplicates_are_not_inserted() {
        let mut book = AddrBook::default();
        assert_eq!(book.insert_many(vec![addr(1, 100), addr(1, 100), addr(2, 100)]), 2);
        assert_eq!(book.insert_many(vec![addr(1, 100)]), 0);
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn pop_batch_consumes_entries() {
        let mut book = AddrBook::default();
        book.insert_many(vec![addr(1, 100), addr(2, 100), addr(3, 100)]);
        let batch = book.pop_batch(2, 200);
        assert_eq!(batch.len(), 2);
        assert_eq!(book.len(), 1);
        let rest = book.pop_batch(8, 200);
        assert_eq!(rest.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn stale_entries_are_dropped_on_pop() {
        let now = 20 * 24 * 60 * 60;
        let fresh_time = (now - 60) as u32;
        let stale_time = (now - MAX_PEER_AGE_SECS - 1) as u32;

        let mut book = AddrBook::default();
        book.insert_many(vec![addr(1, stale_time), addr(2, fresh_time), addr(3, stale_time)]);
        let batch = book.pop_batch(8, now);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0], addr(2, fresh_time));
        assert!(book.is_empty());
    }
}
