//! # Address Registry
//!
//! Local cache of backend addresses pushed by the load balancer, one bucket
//! per [`AddressType`].
//!
//! The registry is owned by the connection session and only touched from the
//! tick, so it carries no locking of its own. Lookups hand out entries
//! round-robin so repeated queries spread across every known server of a type.

mod address;

pub use address::{AddressType, ServerInformation};

use std::net::SocketAddrV4;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Bucket {
    entries: Vec<ServerInformation>,
    cursor: usize,
}

impl Bucket {
    fn next(&mut self) -> Option<ServerInformation> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.cursor % self.entries.len();
        self.cursor = (index + 1) % self.entries.len();
        Some(self.entries[index])
    }
}

/// Per-type cache of [`ServerInformation`] records.
#[derive(Debug, Default)]
pub struct AddressRegistry {
    buckets: [Bucket; AddressType::STORABLE.len()],
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `info`, overwriting any entry with the same entity in its type bucket.
    ///
    /// Records with a sentinel type are ignored.
    pub fn add(&mut self, info: ServerInformation) {
        let Some(index) = info.address_type.bucket() else {
            return;
        };
        let bucket = &mut self.buckets[index];

        match bucket.entries.iter_mut().find(|e| e.entity == info.entity) {
            Some(existing) => {
                trace!(entity = info.entity, address_type = %info.address_type, "Updating server entry");
                *existing = info;
            }
            None => {
                trace!(entity = info.entity, address_type = %info.address_type, "Adding server entry");
                bucket.entries.push(info);
            }
        }
    }

    /// Returns the next entry for `address_type`, or [`ServerInformation::invalid`]
    /// when nothing of that type is known.
    pub fn get(&mut self, address_type: AddressType) -> ServerInformation {
        self.try_get(address_type)
            .unwrap_or_else(ServerInformation::invalid)
    }

    pub fn try_get(&mut self, address_type: AddressType) -> Option<ServerInformation> {
        let index = address_type.bucket()?;
        self.buckets[index].next()
    }

    /// Socket address of the next server of `address_type`.
    pub fn resolve(&mut self, address_type: AddressType) -> Option<SocketAddrV4> {
        self.try_get(address_type).map(|info| info.socket_addr())
    }

    /// Removes the entry for `entity` in `address_type` if its realm matches.
    pub fn remove(&mut self, address_type: AddressType, entity: u64, realm_id: u8) {
        let Some(index) = address_type.bucket() else {
            return;
        };
        let bucket = &mut self.buckets[index];

        let Some(position) = bucket
            .entries
            .iter()
            .position(|e| e.entity == entity && e.realm_id == realm_id)
        else {
            return;
        };

        bucket.entries.remove(position);
        if position < bucket.cursor {
            bucket.cursor -= 1;
        }
        if bucket.cursor >= bucket.entries.len() {
            bucket.cursor = 0;
        }
        debug!(entity, realm_id, %address_type, "Removed server entry");
    }

    /// Empties every bucket.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.entries.clear();
            bucket.cursor = 0;
        }
    }

    /// Number of entries of `address_type`.
    pub fn len_of(&self, address_type: AddressType) -> usize {
        address_type
            .bucket()
            .map_or(0, |index| self.buckets[index].entries.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cached entry, grouped by type.
    pub fn iter(&self) -> impl Iterator<Item = &ServerInformation> {
        self.buckets.iter().flat_map(|b| b.entries.iter())
    }
}
