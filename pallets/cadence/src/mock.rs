use crate as pallet_cadence;
use frame::prelude::*;
use polkadot_sdk::{
  frame_support::{
    PalletId, construct_runtime,
    traits::{ConstU32, ConstU64, ConstU128, Get},
  },
  frame_system::EnsureRoot,
  sp_runtime::{
    BuildStorage,
    traits::{BlakeTwo256, IdentityLookup},
  },
};

use alloc::vec;
use core::cell::RefCell;

use crate::{ActionDispatch, AssetOps};
use primitives::{OracleError, ProposalStatus, StateOracle};

type Block = polkadot_sdk::frame_system::mocking::MockBlock<Test>;
pub type AccountId = u64;
pub type Balance = u128;

pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const CHARLIE: AccountId = 3;
pub const DAVE: AccountId = 4;
pub const EVE: AccountId = 5;
/// Funded below the agent minimum.
pub const PAUPER: AccountId = 9;

#[derive(
  Clone,
  Copy,
  Debug,
  Default,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  MaxEncodedLen,
  serde::Serialize,
  serde::Deserialize,
)]
pub enum TestAsset {
  #[default]
  Native,
  Local(u32),
}

construct_runtime!(
  pub enum Test {
    System: polkadot_sdk::frame_system,
    Timestamp: polkadot_sdk::pallet_timestamp,
    Balances: polkadot_sdk::pallet_balances,
    Cadence: pallet_cadence,
  }
);

impl polkadot_sdk::frame_system::Config for Test {
  type BaseCallFilter = polkadot_sdk::frame_support::traits::Everything;
  type BlockWeights = ();
  type BlockLength = ();
  type DbWeight = ();
  type RuntimeOrigin = RuntimeOrigin;
  type RuntimeCall = RuntimeCall;
  type Nonce = u64;
  type Hash = polkadot_sdk::sp_core::H256;
  type Hashing = BlakeTwo256;
  type AccountId = AccountId;
  type Lookup = IdentityLookup<Self::AccountId>;
  type Block = Block;
  type RuntimeEvent = RuntimeEvent;
  type BlockHashCount = polkadot_sdk::frame_support::traits::ConstU64<250>;
  type Version = ();
  type PalletInfo = PalletInfo;
  type AccountData = polkadot_sdk::pallet_balances::AccountData<Balance>;
  type OnNewAccount = ();
  type OnKilledAccount = ();
  type SystemWeightInfo = ();
  type SS58Prefix = ();
  type OnSetCode = ();
  type MaxConsumers = ConstU32<16>;
  type RuntimeTask = ();
  type ExtensionsWeightInfo = ();
  type SingleBlockMigrations = ();
  type MultiBlockMigrator = ();
  type PreInherents = ();
  type PostInherents = ();
  type PostTransactions = ();
}

impl polkadot_sdk::pallet_timestamp::Config for Test {
  type Moment = u64;
  type OnTimestampSet = ();
  type MinimumPeriod = ConstU64<1>;
  type WeightInfo = ();
}

impl polkadot_sdk::pallet_balances::Config for Test {
  type MaxLocks = ConstU32<50>;
  type MaxReserves = ();
  type ReserveIdentifier = [u8; 8];
  type Balance = Balance;
  type RuntimeEvent = RuntimeEvent;
  type DustRemoval = ();
  type ExistentialDeposit = ConstU128<1>;
  type AccountStore = System;
  type WeightInfo = ();
  type FreezeIdentifier = ();
  type MaxFreezes = ();
  type RuntimeHoldReason = RuntimeHoldReason;
  type RuntimeFreezeReason = RuntimeFreezeReason;
  type DoneSlashHandler = ();
}

pub struct CadencePalletId;
impl Get<PalletId> for CadencePalletId {
  fn get() -> PalletId {
    PalletId(*b"py/caden")
  }
}

pub struct NativeAsset;
impl Get<TestAsset> for NativeAsset {
  fn get() -> TestAsset {
    TestAsset::Native
  }
}

pub struct TestAgentFee;
impl Get<Permill> for TestAgentFee {
  fn get() -> Permill {
    Permill::from_percent(5)
  }
}

pub struct TestTreasuryFee;
impl Get<Permill> for TestTreasuryFee {
  fn get() -> Permill {
    Permill::from_percent(2)
  }
}

thread_local! {
  static ASSET_BALANCES: RefCell<alloc::collections::BTreeMap<(AccountId, TestAsset), Balance>> =
    RefCell::new(alloc::collections::BTreeMap::new());

  static DISPATCH_LOG: RefCell<alloc::vec::Vec<(AccountId, AccountId, alloc::vec::Vec<u8>, Option<u64>)>> =
    RefCell::new(alloc::vec::Vec::new());

  static FAILING_TARGETS: RefCell<alloc::collections::BTreeSet<AccountId>> =
    RefCell::new(alloc::collections::BTreeSet::new());

  static ORACLE_BALANCES: RefCell<alloc::collections::BTreeMap<(AccountId, TestAsset), Balance>> =
    RefCell::new(alloc::collections::BTreeMap::new());

  static TOKEN_OWNERS: RefCell<alloc::collections::BTreeMap<(AccountId, alloc::vec::Vec<u8>), AccountId>> =
    RefCell::new(alloc::collections::BTreeMap::new());

  static PROPOSALS: RefCell<alloc::collections::BTreeMap<(AccountId, u64), ProposalStatus>> =
    RefCell::new(alloc::collections::BTreeMap::new());

  static RAW_RESULTS: RefCell<alloc::collections::BTreeMap<AccountId, alloc::vec::Vec<u8>>> =
    RefCell::new(alloc::collections::BTreeMap::new());

  static ORACLE_DOWN: RefCell<alloc::collections::BTreeSet<AccountId>> =
    RefCell::new(alloc::collections::BTreeSet::new());

  static PUBLIC_REGISTRATION: RefCell<bool> = const { RefCell::new(true) };
}

pub fn reset_mock_adapters() {
  ASSET_BALANCES.with(|map| map.borrow_mut().clear());
  DISPATCH_LOG.with(|log| log.borrow_mut().clear());
  FAILING_TARGETS.with(|set| set.borrow_mut().clear());
  ORACLE_BALANCES.with(|map| map.borrow_mut().clear());
  TOKEN_OWNERS.with(|map| map.borrow_mut().clear());
  PROPOSALS.with(|map| map.borrow_mut().clear());
  RAW_RESULTS.with(|map| map.borrow_mut().clear());
  ORACLE_DOWN.with(|set| set.borrow_mut().clear());
  PUBLIC_REGISTRATION.with(|flag| *flag.borrow_mut() = true);
}

pub fn set_asset_balance(who: AccountId, asset: TestAsset, amount: Balance) {
  ASSET_BALANCES.with(|map| {
    map.borrow_mut().insert((who, asset), amount);
  });
}

pub fn get_asset_balance(who: AccountId, asset: TestAsset) -> Balance {
  ASSET_BALANCES.with(|map| map.borrow().get(&(who, asset)).copied().unwrap_or(0))
}

pub fn set_target_failing(target: AccountId) {
  FAILING_TARGETS.with(|set| {
    set.borrow_mut().insert(target);
  });
}

pub fn dispatch_log() -> alloc::vec::Vec<(AccountId, AccountId, alloc::vec::Vec<u8>, Option<u64>)> {
  DISPATCH_LOG.with(|log| log.borrow().clone())
}

pub fn set_oracle_balance(who: AccountId, asset: TestAsset, amount: Balance) {
  ORACLE_BALANCES.with(|map| {
    map.borrow_mut().insert((who, asset), amount);
  });
}

pub fn set_token_owner(collection: AccountId, token: &[u8], owner: AccountId) {
  TOKEN_OWNERS.with(|map| {
    map.borrow_mut().insert((collection, token.to_vec()), owner);
  });
}

pub fn set_proposal_status(dao: AccountId, proposal_id: u64, status: ProposalStatus) {
  PROPOSALS.with(|map| {
    map.borrow_mut().insert((dao, proposal_id), status);
  });
}

pub fn set_raw_result(contract: AccountId, response: &[u8]) {
  RAW_RESULTS.with(|map| {
    map.borrow_mut().insert(contract, response.to_vec());
  });
}

pub fn set_oracle_down(address: AccountId) {
  ORACLE_DOWN.with(|set| {
    set.borrow_mut().insert(address);
  });
}

pub fn set_public_registration(open: bool) {
  PUBLIC_REGISTRATION.with(|flag| *flag.borrow_mut() = open);
}

fn oracle_reachable(address: &AccountId) -> Result<(), OracleError> {
  let down = ORACLE_DOWN.with(|set| set.borrow().contains(address));
  if down { Err(OracleError) } else { Ok(()) }
}

pub struct MockAssetOps;

impl AssetOps<AccountId, TestAsset, Balance> for MockAssetOps {
  fn transfer(
    from: &AccountId,
    to: &AccountId,
    asset: TestAsset,
    amount: Balance,
  ) -> Result<(), DispatchError> {
    match asset {
      TestAsset::Native => {
        use polkadot_sdk::frame_support::traits::Currency;
        <Balances as Currency<AccountId>>::transfer(
          from,
          to,
          amount,
          polkadot_sdk::frame_support::traits::ExistenceRequirement::AllowDeath,
        )
      }
      _ => ASSET_BALANCES.with(|map| {
        let mut map = map.borrow_mut();
        let src = map.get(&(*from, asset)).copied().unwrap_or(0);
        if src < amount {
          return Err(DispatchError::Token(
            polkadot_sdk::sp_runtime::TokenError::FundsUnavailable,
          ));
        }
        map.insert((*from, asset), src - amount);
        let dst = map.get(&(*to, asset)).copied().unwrap_or(0);
        map.insert((*to, asset), dst + amount);
        Ok(())
      }),
    }
  }

  fn balance(who: &AccountId, asset: TestAsset) -> Balance {
    match asset {
      TestAsset::Native => {
        use polkadot_sdk::frame_support::traits::Currency;
        <Balances as Currency<AccountId>>::free_balance(who)
      }
      _ => ASSET_BALANCES.with(|map| map.borrow().get(&(*who, asset)).copied().unwrap_or(0)),
    }
  }
}

/// Records every submission; targets registered via `set_target_failing`
/// report failure.
pub struct MockDispatch;

impl ActionDispatch<AccountId> for MockDispatch {
  fn submit(
    owner: &AccountId,
    target: &AccountId,
    payload: &[u8],
    gas_limit: Option<u64>,
  ) -> Result<(), DispatchError> {
    DISPATCH_LOG.with(|log| {
      log
        .borrow_mut()
        .push((*owner, *target, payload.to_vec(), gas_limit));
    });
    let failing = FAILING_TARGETS.with(|set| set.borrow().contains(target));
    if failing {
      Err(DispatchError::Other("TargetRejected"))
    } else {
      Ok(())
    }
  }
}

pub struct MockOracle;

impl StateOracle<AccountId, TestAsset, Balance> for MockOracle {
  fn balance_of(who: &AccountId, asset: &TestAsset) -> Result<Balance, OracleError> {
    oracle_reachable(who)?;
    Ok(ORACLE_BALANCES.with(|map| map.borrow().get(&(*who, *asset)).copied().unwrap_or(0)))
  }

  fn token_owner(collection: &AccountId, token: &[u8]) -> Result<Option<AccountId>, OracleError> {
    oracle_reachable(collection)?;
    Ok(TOKEN_OWNERS.with(|map| map.borrow().get(&(*collection, token.to_vec())).copied()))
  }

  fn proposal_status(dao: &AccountId, proposal_id: u64) -> Result<ProposalStatus, OracleError> {
    oracle_reachable(dao)?;
    PROPOSALS
      .with(|map| map.borrow().get(&(*dao, proposal_id)).copied())
      .ok_or(OracleError)
  }

  fn query_raw(contract: &AccountId, _request: &[u8]) -> Result<alloc::vec::Vec<u8>, OracleError> {
    oracle_reachable(contract)?;
    RAW_RESULTS
      .with(|map| map.borrow().get(contract).cloned())
      .ok_or(OracleError)
  }
}

pub struct TestPublicRegistration;
impl Get<bool> for TestPublicRegistration {
  fn get() -> bool {
    PUBLIC_REGISTRATION.with(|flag| *flag.borrow())
  }
}

#[cfg(feature = "runtime-benchmarks")]
pub struct MockBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl crate::BenchmarkHelper<AccountId, TestAsset, Balance> for MockBenchmarkHelper {
  fn endow(who: &AccountId) -> Result<(), DispatchError> {
    use polkadot_sdk::frame_support::traits::Currency;
    let _ = <Balances as Currency<AccountId>>::deposit_creating(who, 1_000_000_000_000);
    Ok(())
  }
}

impl pallet_cadence::Config for Test {
  type AssetId = TestAsset;
  type Balance = Balance;
  type NativeAssetId = NativeAsset;
  type AssetOps = MockAssetOps;
  type ActionDispatch = MockDispatch;
  type StateOracle = MockOracle;
  type TimeProvider = Timestamp;
  type PalletId = CadencePalletId;
  type AdminOrigin = EnsureRoot<AccountId>;
  type MinActiveAgents = ConstU32<2>;
  type MaxActiveAgents = ConstU32<8>;
  type MaxPendingAgents = ConstU32<8>;
  type NominationDuration = ConstU64<10>;
  type EjectThreshold = ConstU64<5>;
  type MinAgentBalance = ConstU128<100>;
  type PublicRegistration = TestPublicRegistration;
  type SlotGranularityBlocks = ConstU64<1>;
  type SlotGranularityTime = ConstU64<1000>;
  type MaxTasksPerSlot = ConstU32<16>;
  type MaxActionsPerTask = ConstU32<8>;
  type MaxRulesPerTask = ConstU32<4>;
  type MaxTaskAssets = ConstU32<4>;
  type MinTasksPerAgent = ConstU32<3>;
  type BaseExecutionFee = ConstU128<50>;
  type PerActionFee = ConstU128<10>;
  type AgentFee = TestAgentFee;
  type TreasuryFee = TestTreasuryFee;
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = MockBenchmarkHelper;
  type WeightInfo = ();
}

pub const TEST_INITIAL_BALANCE: Balance = 10_000_000_000_000;

pub fn new_test_ext() -> polkadot_sdk::sp_io::TestExternalities {
  let mut t = polkadot_sdk::frame_system::GenesisConfig::<Test>::default()
    .build_storage()
    .unwrap();

  polkadot_sdk::pallet_balances::GenesisConfig::<Test> {
    balances: vec![
      (ALICE, TEST_INITIAL_BALANCE),
      (BOB, TEST_INITIAL_BALANCE),
      (CHARLIE, TEST_INITIAL_BALANCE),
      (DAVE, TEST_INITIAL_BALANCE),
      (EVE, TEST_INITIAL_BALANCE),
      (PAUPER, 50),
    ],
    dev_accounts: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  let mut ext = polkadot_sdk::sp_io::TestExternalities::new(t);
  ext.execute_with(|| {
    reset_mock_adapters();
  });
  ext
}
