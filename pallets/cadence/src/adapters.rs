//! Adapter traits for the cadence pallet.
//!
//! Two traits abstract all runtime-specific operations, keeping the pallet
//! fully generic over the ledger and the transport layer that ultimately
//! carries task actions.

use frame::prelude::*;

/// Ledger moves and queries for the native and fungible balances the
/// pallet accounts for (task deposits, agent rewards, refunds).
pub trait AssetOps<AccountId, AssetId, Balance> {
  fn transfer(
    from: &AccountId,
    to: &AccountId,
    asset: AssetId,
    amount: Balance,
  ) -> Result<(), DispatchError>;

  fn balance(who: &AccountId, asset: AssetId) -> Balance;
}

/// The transport/signing boundary. An action's payload is opaque to the
/// scheduler; `submit` hands it to whatever executes it on the ledger.
/// Failures are reported back as the action's outcome and are never
/// retried by the pallet.
pub trait ActionDispatch<AccountId> {
  fn submit(
    owner: &AccountId,
    target: &AccountId,
    payload: &[u8],
    gas_limit: Option<u64>,
  ) -> Result<(), DispatchError>;
}

/// No-op `AssetOps` for configurations where balances are not moved.
impl<AccountId, AssetId, Balance: Default> AssetOps<AccountId, AssetId, Balance> for () {
  fn transfer(_: &AccountId, _: &AccountId, _: AssetId, _: Balance) -> Result<(), DispatchError> {
    Ok(())
  }

  fn balance(_: &AccountId, _: AssetId) -> Balance {
    Balance::default()
  }
}

/// `ActionDispatch` for configurations without a transport layer: every
/// action fails and is recorded as failed.
impl<AccountId> ActionDispatch<AccountId> for () {
  fn submit(
    _: &AccountId,
    _: &AccountId,
    _: &[u8],
    _: Option<u64>,
  ) -> Result<(), DispatchError> {
    Err(DispatchError::Other("ActionDispatch not configured"))
  }
}
