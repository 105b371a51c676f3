use alloy::primitives::Address;
use tracing::info;

use crate::constants::MAX_FEE_BPS;
use crate::errors::EngineError;

/// Owner-gated administrative state: a single explicit object handed to the
/// orchestrator at construction.
///
/// Ownership moves with a two-step propose/accept protocol so a mistyped
/// address cannot irreversibly misconfigure the engine. The fee is the one
/// owner-settable basis-points parameter the engine carries.
#[derive(Debug, Clone)]
pub struct AdminState {
    owner: Address,
    pending_owner: Option<Address>,
    fee_bps: u32,
}

impl AdminState {
    pub fn new(owner: Address, fee_bps: u32) -> Result<Self, EngineError> {
        if owner.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(EngineError::InvalidFee {
                bps: fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        Ok(Self {
            owner,
            pending_owner: None,
            fee_bps,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn ensure_owner(&self, caller: Address) -> Result<(), EngineError> {
        if caller != self.owner {
            return Err(EngineError::NotOwner { caller });
        }
        Ok(())
    }

    pub fn propose_owner(&mut self, caller: Address, new_owner: Address) -> Result<(), EngineError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        self.pending_owner = Some(new_owner);
        info!(owner = %self.owner, proposed = %new_owner, "ownership transfer proposed");
        Ok(())
    }

    pub fn accept_owner(&mut self, caller: Address) -> Result<(), EngineError> {
        if self.pending_owner != Some(caller) {
            return Err(EngineError::NotPendingOwner { caller });
        }
        self.owner = caller;
        self.pending_owner = None;
        info!(owner = %self.owner, "ownership transfer accepted");
        Ok(())
    }

    pub fn set_fee_bps(&mut self, caller: Address, fee_bps: u32) -> Result<(), EngineError> {
        self.ensure_owner(caller)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(EngineError::InvalidFee {
                bps: fee_bps,
                max: MAX_FEE_BPS,
            });
        }
        self.fee_bps = fee_bps;
        info!(fee_bps, "engine fee updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const OWNER: Address = address!("0000000000000000000000000000000000000001");
    const OTHER: Address = address!("0000000000000000000000000000000000000002");

    #[test]
    fn test_two_step_transfer() {
        let mut admin = AdminState::new(OWNER, 0).unwrap();
        admin.propose_owner(OWNER, OTHER).unwrap();
        // Still the old owner until accepted.
        assert_eq!(admin.owner(), OWNER);
        admin.accept_owner(OTHER).unwrap();
        assert_eq!(admin.owner(), OTHER);
        assert!(admin.ensure_owner(OWNER).is_err());
    }

    #[test]
    fn test_accept_requires_pending() {
        let mut admin = AdminState::new(OWNER, 0).unwrap();
        assert!(matches!(
            admin.accept_owner(OTHER).unwrap_err(),
            EngineError::NotPendingOwner { .. }
        ));
    }

    #[test]
    fn test_propose_gated_and_nonzero() {
        let mut admin = AdminState::new(OWNER, 0).unwrap();
        assert!(matches!(
            admin.propose_owner(OTHER, OTHER).unwrap_err(),
            EngineError::NotOwner { .. }
        ));
        assert!(matches!(
            admin.propose_owner(OWNER, Address::ZERO).unwrap_err(),
            EngineError::ZeroAddress
        ));
    }

    #[test]
    fn test_fee_bounds() {
        let mut admin = AdminState::new(OWNER, 0).unwrap();
        admin.set_fee_bps(OWNER, 50).unwrap();
        assert_eq!(admin.fee_bps(), 50);
        assert!(matches!(
            admin.set_fee_bps(OWNER, MAX_FEE_BPS + 1).unwrap_err(),
            EngineError::InvalidFee { .. }
        ));
        assert!(matches!(
            admin.set_fee_bps(OTHER, 10).unwrap_err(),
            EngineError::NotOwner { .. }
        ));
    }
}
