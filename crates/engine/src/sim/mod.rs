//! In-process simulation of the external collaborators: token ledger,
//! lending pool, and swap venue, plus the checkpoint/rollback scope that
//! gives orchestrated operations their all-or-nothing guarantee.

pub mod ledger;
pub mod pool;
pub mod venue;

use std::cell::RefCell;
use std::rc::Rc;

use alloy::primitives::Address;
use tracing::debug;

use crate::scope::AtomicScope;

use ledger::InMemoryLedger;
use pool::{PoolState, SimulatedPool};
use venue::{SimulatedVenue, VenueState};

struct Snapshot {
    ledger: InMemoryLedger,
    pool: PoolState,
    venue: VenueState,
}

/// The simulated execution environment: one ledger shared by a pool and a
/// venue, with snapshot-based atomicity.
pub struct SimEnv {
    ledger: Rc<RefCell<InMemoryLedger>>,
    pool: Rc<RefCell<SimulatedPool>>,
    venue: Rc<RefCell<SimulatedVenue>>,
    snapshots: Vec<Snapshot>,
}

impl SimEnv {
    pub fn new(pool_address: Address, venue_address: Address, premium_bps: u32) -> Self {
        let ledger = Rc::new(RefCell::new(InMemoryLedger::new()));
        let pool = Rc::new(RefCell::new(SimulatedPool::new(
            pool_address,
            premium_bps,
            Rc::clone(&ledger),
        )));
        let venue = Rc::new(RefCell::new(SimulatedVenue::new(
            venue_address,
            Rc::clone(&ledger),
        )));
        Self {
            ledger,
            pool,
            venue,
            snapshots: Vec::new(),
        }
    }

    pub fn ledger(&self) -> Rc<RefCell<InMemoryLedger>> {
        Rc::clone(&self.ledger)
    }

    pub fn pool(&self) -> Rc<RefCell<SimulatedPool>> {
        Rc::clone(&self.pool)
    }

    pub fn venue(&self) -> Rc<RefCell<SimulatedVenue>> {
        Rc::clone(&self.venue)
    }
}

impl AtomicScope for SimEnv {
    fn begin(&mut self) {
        self.snapshots.push(Snapshot {
            ledger: self.ledger.borrow().clone(),
            pool: self.pool.borrow().snapshot_state(),
            venue: self.venue.borrow().snapshot_state(),
        });
        debug!(depth = self.snapshots.len(), "scope begun");
    }

    fn commit(&mut self) {
        self.snapshots.pop().expect("commit without begin");
        debug!(depth = self.snapshots.len(), "scope committed");
    }

    fn revert(&mut self) {
        let snapshot = self.snapshots.pop().expect("revert without begin");
        *self.ledger.borrow_mut() = snapshot.ledger;
        self.pool.borrow_mut().restore_state(snapshot.pool);
        self.venue.borrow_mut().restore_state(snapshot.venue);
        debug!(depth = self.snapshots.len(), "scope reverted");
    }
}
