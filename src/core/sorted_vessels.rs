//! Per-asset list of vessels ordered by nominal collateral ratio.
//!
//! Head holds the highest NICR, tail the lowest (riskiest). Inserts take a
//! `(prev, next)` hint and walk from it to the right slot, so a good hint
//! makes the operation O(1). Ordering is always checked against the live
//! NICR reported by a [`NominalIcrSource`].

use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::roles::ProtocolRoles;
use crate::error::{Error, Result};

/// Supplies the current NICR of a listed vessel
pub trait NominalIcrSource {
    /// NICR of `(asset, owner)` including pending rewards
    fn nominal_icr(&self, asset: &Address, owner: &Address) -> Result<u128>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    prev: Option<Address>,
    next: Option<Address>,
}

/// Linked list for one asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VesselList {
    head: Option<Address>,
    tail: Option<Address>,
    nodes: BTreeMap<Address, Node>,
}

impl VesselList {
    /// Number of listed vessels
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Owners from head (highest NICR) to tail
    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let current = cursor?;
            cursor = self.nodes.get(&current).and_then(|n| n.next);
            Some(current)
        })
    }
}

/// Sorted vessel index for every collateral asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedVessels {
    roles: ProtocolRoles,
    lists: BTreeMap<Address, VesselList>,
}

impl SortedVessels {
    /// Create an empty index guarded by `roles`
    pub fn new(roles: ProtocolRoles) -> Self {
        Self {
            roles,
            lists: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert `id` with `nicr`, starting the search at the hint
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        caller: Address,
        asset: Address,
        id: Address,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<()> {
        self.roles.require_vm_or_borrower_ops(caller)?;
        self.insert_unchecked(asset, id, nicr, prev_hint, next_hint, source)
    }

    /// Remove `id` from the list
    pub fn remove(&mut self, caller: Address, asset: Address, id: Address) -> Result<()> {
        self.roles.require_vm_or_borrower_ops(caller)?;
        self.remove_unchecked(asset, id)
    }

    /// Move `id` to the slot matching `new_nicr`
    #[allow(clippy::too_many_arguments)]
    pub fn reinsert(
        &mut self,
        caller: Address,
        asset: Address,
        id: Address,
        new_nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<()> {
        self.roles.require_vm_or_borrower_ops(caller)?;
        if !self.contains(&asset, &id) {
            return Err(Error::InvalidParameter {
                name: "id".into(),
                reason: format!("{} is not in the list", id),
            });
        }
        self.remove_unchecked(asset, id)?;
        self.insert_unchecked(asset, id, new_nicr, prev_hint, next_hint, source)
    }

    fn insert_unchecked(
        &mut self,
        asset: Address,
        id: Address,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<()> {
        if self.contains(&asset, &id) {
            return Err(Error::InvalidParameter {
                name: "id".into(),
                reason: format!("{} is already in the list", id),
            });
        }
        if nicr == 0 {
            return Err(Error::InvalidParameter {
                name: "nicr".into(),
                reason: "must be positive".into(),
            });
        }

        let (prev, next) = if self.valid_insert_position(&asset, nicr, prev_hint, next_hint, source)? {
            (prev_hint, next_hint)
        } else {
            self.find_insert_position(&asset, nicr, prev_hint, next_hint, source)?
        };

        let list = self.lists.entry(asset).or_default();
        list.nodes.insert(id, Node { prev, next });
        match prev {
            Some(p) => link_next(list, p, Some(id))?,
            None => list.head = Some(id),
        }
        match next {
            Some(n) => link_prev(list, n, Some(id))?,
            None => list.tail = Some(id),
        }
        trace!(%asset, %id, nicr, "vessel inserted into sorted list");
        Ok(())
    }

    fn remove_unchecked(&mut self, asset: Address, id: Address) -> Result<()> {
        let list = self.lists.get_mut(&asset).ok_or_else(|| missing(id))?;
        let node = list.nodes.remove(&id).ok_or_else(|| missing(id))?;
        match node.prev {
            Some(p) => link_next(list, p, node.next)?,
            None => list.head = node.next,
        }
        match node.next {
            Some(n) => link_prev(list, n, node.prev)?,
            None => list.tail = node.prev,
        }
        trace!(%asset, %id, "vessel removed from sorted list");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITION SEARCH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether `(prev, next)` is a correct slot for `nicr`
    pub fn valid_insert_position(
        &self,
        asset: &Address,
        nicr: u128,
        prev: Option<Address>,
        next: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<bool> {
        match (prev, next) {
            (None, None) => Ok(self.size(asset) == 0),
            (None, Some(n)) => {
                Ok(self.get_first(asset) == Some(n) && nicr >= source.nominal_icr(asset, &n)?)
            }
            (Some(p), None) => {
                Ok(self.get_last(asset) == Some(p) && nicr <= source.nominal_icr(asset, &p)?)
            }
            (Some(p), Some(n)) => Ok(self.get_next(asset, &p) == Some(n)
                && source.nominal_icr(asset, &p)? >= nicr
                && nicr >= source.nominal_icr(asset, &n)?),
        }
    }

    /// Resolve a correct slot for `nicr` starting from possibly stale hints
    pub fn find_insert_position(
        &self,
        asset: &Address,
        nicr: u128,
        prev_hint: Option<Address>,
        next_hint: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<(Option<Address>, Option<Address>)> {
        let mut prev = prev_hint;
        let mut next = next_hint;

        if let Some(p) = prev {
            if !self.contains(asset, &p) || nicr > source.nominal_icr(asset, &p)? {
                prev = None;
            }
        }
        if let Some(n) = next {
            if !self.contains(asset, &n) || nicr < source.nominal_icr(asset, &n)? {
                next = None;
            }
        }

        match (prev, next) {
            (None, None) => self.descend_list(asset, nicr, self.get_first(asset), source),
            (None, Some(n)) => self.ascend_list(asset, nicr, Some(n), source),
            (Some(p), _) => self.descend_list(asset, nicr, Some(p), source),
        }
    }

    fn descend_list(
        &self,
        asset: &Address,
        nicr: u128,
        start: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<(Option<Address>, Option<Address>)> {
        let start = match start {
            Some(s) => s,
            None => return Ok((None, None)),
        };
        if self.get_first(asset) == Some(start) && nicr >= source.nominal_icr(asset, &start)? {
            return Ok((None, Some(start)));
        }

        let mut prev = Some(start);
        let mut next = self.get_next(asset, &start);
        while let Some(p) = prev {
            if self.valid_insert_position(asset, nicr, prev, next, source)? {
                break;
            }
            prev = self.get_next(asset, &p);
            next = prev.and_then(|p| self.get_next(asset, &p));
        }
        Ok((prev, next))
    }

    fn ascend_list(
        &self,
        asset: &Address,
        nicr: u128,
        start: Option<Address>,
        source: &impl NominalIcrSource,
    ) -> Result<(Option<Address>, Option<Address>)> {
        let start = match start {
            Some(s) => s,
            None => return Ok((None, None)),
        };
        if self.get_last(asset) == Some(start) && nicr <= source.nominal_icr(asset, &start)? {
            return Ok((Some(start), None));
        }

        let mut next = Some(start);
        let mut prev = self.get_prev(asset, &start);
        while let Some(n) = next {
            if self.valid_insert_position(asset, nicr, prev, next, source)? {
                break;
            }
            next = self.get_prev(asset, &n);
            prev = next.and_then(|n| self.get_prev(asset, &n));
        }
        Ok((prev, next))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether `id` is listed for `asset`
    pub fn contains(&self, asset: &Address, id: &Address) -> bool {
        self.lists
            .get(asset)
            .map(|l| l.nodes.contains_key(id))
            .unwrap_or(false)
    }

    /// Number of listed vessels for `asset`
    pub fn size(&self, asset: &Address) -> usize {
        self.lists.get(asset).map(VesselList::len).unwrap_or(0)
    }

    /// Highest-NICR vessel
    pub fn get_first(&self, asset: &Address) -> Option<Address> {
        self.lists.get(asset).and_then(|l| l.head)
    }

    /// Lowest-NICR (riskiest) vessel
    pub fn get_last(&self, asset: &Address) -> Option<Address> {
        self.lists.get(asset).and_then(|l| l.tail)
    }

    /// Neighbour towards the tail
    pub fn get_next(&self, asset: &Address, id: &Address) -> Option<Address> {
        self.node(asset, id).and_then(|n| n.next)
    }

    /// Neighbour towards the head
    pub fn get_prev(&self, asset: &Address, id: &Address) -> Option<Address> {
        self.node(asset, id).and_then(|n| n.prev)
    }

    /// The whole list for `asset`
    pub fn list(&self, asset: &Address) -> Option<&VesselList> {
        self.lists.get(asset)
    }

    fn node(&self, asset: &Address, id: &Address) -> Option<&Node> {
        self.lists.get(asset).and_then(|l| l.nodes.get(id))
    }
}

fn missing(id: Address) -> Error {
    Error::InvalidParameter {
        name: "id".into(),
        reason: format!("{} is not in the list", id),
    }
}

fn link_next(list: &mut VesselList, at: Address, next: Option<Address>) -> Result<()> {
    let node = list
        .nodes
        .get_mut(&at)
        .ok_or_else(|| Error::Internal(format!("dangling sorted-list link to {}", at)))?;
    node.next = next;
    Ok(())
}

fn link_prev(list: &mut VesselList, at: Address, prev: Option<Address>) -> Result<()> {
    let node = list
        .nodes
        .get_mut(&at)
        .ok_or_else(|| Error::Internal(format!("dangling sorted-list link to {}", at)))?;
    node.prev = prev;
    Ok(())
}
