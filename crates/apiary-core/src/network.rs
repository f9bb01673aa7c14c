//! Registry of known remote nodes.
//!
//! Populated by node discovery and by inbound frames whose source address
//! has not been seen before. A node's identity is its 64-bit address when
//! known; nodes that only ever reported a 16-bit address are keyed by
//! that until discovery fills the 64-bit one in.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use apiary_proto::{Addr16, Addr64};

use crate::protocol::XbeeProtocol;

/// Role a node plays in its network, as reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Network coordinator.
    Coordinator,
    /// Routing node.
    Router,
    /// Sleepy end device.
    EndDevice,
    /// Unrecognized role value.
    Unknown(u8),
}

impl NodeRole {
    /// Parse from the device-type byte of a discovery record.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Coordinator,
            1 => Self::Router,
            2 => Self::EndDevice,
            other => Self::Unknown(other),
        }
    }
}

/// A remote node known to the local device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    /// 64-bit address ([`Addr64::UNKNOWN`] until discovered).
    pub addr64: Addr64,
    /// 16-bit address ([`Addr16::UNKNOWN`] until discovered or on
    /// protocols without 16-bit addressing).
    pub addr16: Addr16,
    /// Node identifier string (the `NI` parameter), if known.
    pub node_id: Option<String>,
    /// Protocol the node speaks, if known.
    pub protocol: Option<XbeeProtocol>,
    /// Network role reported by discovery, if known.
    pub role: Option<NodeRole>,
    /// Signal strength of the last reception from this node, in -dBm.
    pub rssi: Option<u8>,
}

impl RemoteNode {
    /// Node known only by its addresses.
    #[must_use]
    pub fn new(addr64: Addr64, addr16: Addr16) -> Self {
        Self { addr64, addr16, node_id: None, protocol: None, role: None, rssi: None }
    }

    /// Whether the 64-bit address is known.
    #[must_use]
    pub fn has_addr64(&self) -> bool {
        !self.addr64.is_unknown()
    }

    /// Fill this node's missing fields from `other`.
    ///
    /// Known values are never overwritten by different ones; in
    /// particular a known 64-bit address is permanent. The 16-bit address
    /// is the exception: it is volatile on mesh networks, so a fresher
    /// known value replaces an older one.
    fn merge(&mut self, other: &Self) {
        if self.addr64.is_unknown() && !other.addr64.is_unknown() {
            self.addr64 = other.addr64;
        }
        if !other.addr16.is_unknown() {
            self.addr16 = other.addr16;
        }
        if other.node_id.is_some() {
            self.node_id.clone_from(&other.node_id);
        }
        if other.protocol.is_some() {
            self.protocol = other.protocol;
        }
        if other.role.is_some() {
            self.role = other.role;
        }
        if other.rssi.is_some() {
            self.rssi = other.rssi;
        }
    }
}

impl std::fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr64)?;
        if let Some(id) = &self.node_id {
            write!(f, " ({id})")?;
        }
        Ok(())
    }
}

/// Thread-safe registry of remote nodes, keyed by address.
///
/// Insert-or-merge is a single atomic operation under one lock; lookups
/// by 16-bit address scan the 64-bit map first since nodes migrate there
/// once their full address is learned.
#[derive(Debug, Default)]
pub struct XbeeNetwork {
    inner: Mutex<Maps>,
}

#[derive(Debug, Default)]
struct Maps {
    by_a64: HashMap<Addr64, RemoteNode>,
    by_a16: HashMap<Addr16, RemoteNode>,
}

impl XbeeNetwork {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, merging with any existing record for the same
    /// identity. Returns the canonical post-merge record.
    ///
    /// Re-adding an identical node is a no-op.
    pub fn add(&self, node: RemoteNode) -> RemoteNode {
        let mut maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if node.has_addr64() {
            // A node previously known only by its 16-bit address migrates
            // into the 64-bit map, keeping whatever was learned about it.
            let absorbed = if node.addr16.is_unknown() {
                None
            } else {
                maps.by_a16.remove(&node.addr16)
            };

            let entry = maps
                .by_a64
                .entry(node.addr64)
                .or_insert_with(|| RemoteNode::new(node.addr64, Addr16::UNKNOWN));
            if let Some(absorbed) = absorbed {
                entry.merge(&absorbed);
            }
            entry.merge(&node);
            entry.clone()
        } else {
            // Without a 64-bit address, check whether some node in the
            // 64-bit map already owns this 16-bit address.
            if let Some(existing) =
                maps.by_a64.values_mut().find(|n| !node.addr16.is_unknown() && n.addr16 == node.addr16)
            {
                existing.merge(&node);
                return existing.clone();
            }
            let entry = maps
                .by_a16
                .entry(node.addr16)
                .or_insert_with(|| RemoteNode::new(Addr64::UNKNOWN, node.addr16));
            entry.merge(&node);
            entry.clone()
        }
    }

    /// Remove a node by identity. Returns the removed record, if any.
    pub fn remove(&self, node: &RemoteNode) -> Option<RemoteNode> {
        let mut maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if node.has_addr64() {
            maps.by_a64.remove(&node.addr64)
        } else {
            maps.by_a16.remove(&node.addr16)
        }
    }

    /// Drop every node.
    pub fn clear(&self) {
        let mut maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64.clear();
        maps.by_a16.clear();
    }

    /// Look up a node by 64-bit address.
    #[must_use]
    pub fn get_by_addr64(&self, addr: Addr64) -> Option<RemoteNode> {
        let maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64.get(&addr).cloned()
    }

    /// Look up a node by 16-bit address.
    ///
    /// Scans the 64-bit map first: a fully-identified node keeps its
    /// 16-bit address but is no longer keyed by it.
    #[must_use]
    pub fn get_by_addr16(&self, addr: Addr16) -> Option<RemoteNode> {
        let maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64
            .values()
            .find(|node| node.addr16 == addr)
            .or_else(|| maps.by_a16.get(&addr))
            .cloned()
    }

    /// Look up a node by its node identifier string.
    #[must_use]
    pub fn get_by_node_id(&self, node_id: &str) -> Option<RemoteNode> {
        let maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64
            .values()
            .chain(maps.by_a16.values())
            .find(|node| node.node_id.as_deref() == Some(node_id))
            .cloned()
    }

    /// All known nodes.
    #[must_use]
    pub fn nodes(&self) -> Vec<RemoteNode> {
        let maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64.values().chain(maps.by_a16.values()).cloned().collect()
    }

    /// Number of known nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        let maps = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        maps.by_a64.len() + maps.by_a16.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
