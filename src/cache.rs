//! Fixed-capacity cache of recently seen BTHome devices.
//!
//! The cache holds the latest decoded [`Packet`] for at most `capacity`
//! devices. When a new device arrives while every slot is taken, the entry
//! with the lowest sighting count is replaced; among equally frequent
//! entries the one seen longest ago goes first.
//!
//! One mutex guards the whole table. Writers and readers hold it for the
//! full operation, so [`DeviceCache::iterate`] always sees a consistent
//! table. Lock acquisition is bounded by a timeout so a stalled reader
//! cannot block the scanner forever.

use crate::bthome::Packet;
use crate::mac_address::MacAddress;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Default number of devices kept.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default bound on waiting for the cache lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Entries not refreshed for this long are considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// Errors returned by cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The lock could not be acquired in time; the operation was not applied.
    #[error("Timed out after {0:?} waiting for the device cache lock")]
    LockTimeout(Duration),
}

/// One cached device.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub address: MacAddress,
    /// Signal strength of the latest sighting in dBm.
    pub rssi: i16,
    /// Latest decoded packet.
    pub packet: Packet,
    /// Number of sightings since the entry was created.
    pub frequency: u32,
    pub last_seen: SystemTime,
}

impl CacheEntry {
    /// Whether the entry has not been refreshed for longer than `max_age`.
    ///
    /// A `last_seen` in the future (clock adjustments) counts as fresh.
    pub fn is_stale(&self, now: SystemTime, max_age: Duration) -> bool {
        now.duration_since(self.last_seen)
            .is_ok_and(|age| age > max_age)
    }
}

/// What [`DeviceCache::upsert`] did with a sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The device was already cached; its packet was replaced.
    Updated { slot: usize, frequency: u32 },
    /// The device took a free slot.
    Inserted { slot: usize },
    /// The device replaced `evicted`.
    Evicted { slot: usize, evicted: MacAddress },
}

/// Bounded device cache with least-frequently-used eviction.
#[derive(Debug)]
pub struct DeviceCache {
    slots: Mutex<Vec<Option<CacheEntry>>>,
    lock_timeout: Duration,
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_LOCK_TIMEOUT)
    }
}

impl DeviceCache {
    /// Create a cache holding up to `capacity` devices (at least one).
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of devices kept
    /// * `lock_timeout` - Longest time any operation waits for the lock
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(vec![None; capacity]),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Vec<Option<CacheEntry>>>, CacheError> {
        tokio::time::timeout(self.lock_timeout, self.slots.lock())
            .await
            .map_err(|_| CacheError::LockTimeout(self.lock_timeout))
    }

    /// Record a sighting of `address` now.
    pub async fn upsert(
        &self,
        address: MacAddress,
        rssi: i16,
        packet: Packet,
    ) -> Result<Upsert, CacheError> {
        self.upsert_at(address, rssi, packet, SystemTime::now())
            .await
    }

    /// Record a sighting of `address` at `seen_at`.
    ///
    /// A known address gets its packet replaced and its frequency bumped. A
    /// new address takes a free slot if there is one, otherwise it replaces
    /// the least frequently seen entry.
    pub async fn upsert_at(
        &self,
        address: MacAddress,
        rssi: i16,
        packet: Packet,
        seen_at: SystemTime,
    ) -> Result<Upsert, CacheError> {
        let mut slots = self.lock().await?;

        if let Some((slot, entry)) = slots
            .iter_mut()
            .enumerate()
            .find_map(|(slot, entry)| {
                entry
                    .as_mut()
                    .filter(|entry| entry.address == address)
                    .map(|entry| (slot, entry))
            })
        {
            entry.rssi = rssi;
            entry.packet = packet;
            entry.frequency = entry.frequency.saturating_add(1);
            entry.last_seen = seen_at;
            return Ok(Upsert::Updated {
                slot,
                frequency: entry.frequency,
            });
        }

        // Capacity is at least one, so there is always a slot to take.
        let slot = select_slot(&slots).unwrap_or_default();
        let previous = slots[slot].replace(CacheEntry {
            address,
            rssi,
            packet,
            frequency: 1,
            last_seen: seen_at,
        });

        Ok(match previous {
            Some(evicted) => {
                log::debug!(
                    "Evicted {} (seen {} times) for {address}",
                    evicted.address,
                    evicted.frequency
                );
                Upsert::Evicted {
                    slot,
                    evicted: evicted.address,
                }
            }
            None => Upsert::Inserted { slot },
        })
    }

    /// Call `visit` for every cached device in slot order.
    ///
    /// The lock is held for the whole walk, so all entries come from the
    /// same point in time. Returning `false` from `visit` stops early.
    pub async fn iterate<F>(&self, mut visit: F) -> Result<(), CacheError>
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let slots = self.lock().await?;
        for entry in slots.iter().flatten() {
            if !visit(entry) {
                break;
            }
        }
        Ok(())
    }

    /// Copy of every cached device in slot order.
    pub async fn snapshot(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let slots = self.lock().await?;
        Ok(slots.iter().flatten().cloned().collect())
    }

    /// Copy of the entry for `address`, if cached.
    pub async fn get(&self, address: MacAddress) -> Result<Option<CacheEntry>, CacheError> {
        let slots = self.lock().await?;
        Ok(slots
            .iter()
            .flatten()
            .find(|entry| entry.address == address)
            .cloned())
    }

    /// Number of occupied slots.
    pub async fn len(&self) -> Result<usize, CacheError> {
        let slots = self.lock().await?;
        Ok(slots.iter().flatten().count())
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// Maximum number of devices kept.
    pub async fn capacity(&self) -> Result<usize, CacheError> {
        let slots = self.lock().await?;
        Ok(slots.len())
    }
}

/// Pick the slot for a new device.
///
/// Any empty slot wins outright. Otherwise the entry with the lowest
/// frequency is chosen, ties going to the oldest `last_seen` and then to the
/// lowest index. Returns `None` only for an empty table.
fn select_slot(slots: &[Option<CacheEntry>]) -> Option<usize> {
    let mut victim: Option<(usize, u32, SystemTime)> = None;

    for (index, slot) in slots.iter().enumerate() {
        let Some(entry) = slot else {
            return Some(index);
        };

        let replace = victim.is_none_or(|(_, frequency, last_seen)| {
            entry.frequency < frequency
                || (entry.frequency == frequency && entry.last_seen < last_seen)
        });
        if replace {
            victim = Some((index, entry.frequency, entry.last_seen));
        }
    }

    victim.map(|(index, _, _)| index)
}
