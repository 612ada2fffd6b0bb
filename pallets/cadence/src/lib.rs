//! # Cadence pallet
//!
//! A fee-funded task execution network. Task owners deposit funds and
//! submit schedulable bundles of opaque actions; independent agent
//! accounts register, rotate through a bounded active set, and claim the
//! right to execute due tasks in exchange for a fee debited from the
//! task's deposit.
//!
//! Scheduling is slot-based along two dimensions: block heights for
//! `Once`/`Immediate`/`Block(n)` intervals and unix-time buckets for cron
//! intervals. Rule-gated tasks are kept out of the shared slots and
//! claimed directly by hash once their ready slot arrives. Every claim is
//! a single extrinsic: arbitration, slot removal, fee debit, action
//! dispatch, outcome recording, and rescheduling commit or roll back
//! together. There is no background sweep; agent ejection and slot
//! advancement are detected lazily on claim attempts and the
//! permissionless `tick`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use pallet::*;

pub mod adapters;
pub use adapters::{ActionDispatch, AssetOps};

pub mod balancer;
pub use balancer::{Allowance, BalancerMode};

pub mod weights;
pub use weights::WeightInfo;

#[cfg(test)]
mod mock;

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

#[cfg(feature = "runtime-benchmarks")]
pub trait BenchmarkHelper<AccountId, AssetId, Balance> {
  /// Give `who` enough native balance to register as an agent and fund
  /// task deposits.
  fn endow(who: &AccountId) -> Result<(), polkadot_sdk::sp_runtime::DispatchError>;
}

#[frame::pallet]
pub mod pallet {
  use super::{ActionDispatch, AssetOps, BalancerMode, WeightInfo};
  use crate::balancer;
  use alloc::vec::Vec;
  use frame::prelude::*;
  use polkadot_sdk::{
    frame_support::{
      PalletId,
      traits::{EnsureOrigin, UnixTime},
    },
    sp_runtime::traits::{AccountIdConversion, SaturatedConversion, Zero},
  };
  use primitives::{
    Boundary, Interval, IntervalSpec, Rule, RuleVerdict, SlotKind, StateOracle, evaluate_all,
    next_slot,
  };

  /// Content-addressed task identifier: blake2_256 of the encoded task
  /// definition.
  pub type TaskId = [u8; 32];

  pub type BalanceOf<T> = <T as Config>::Balance;
  pub type AssetIdOf<T> = <T as Config>::AssetId;

  /// Raw cron expression as submitted by a task owner.
  pub type CronExpr = BoundedVec<u8, ConstU32<128>>;
  /// Opaque byte payloads inside rules (token ids, query requests).
  pub type RuleData = BoundedVec<u8, ConstU32<256>>;

  pub type ActionOf<T> = Action<<T as frame_system::Config>::AccountId>;
  pub type RuleOf<T> = Rule<
    <T as frame_system::Config>::AccountId,
    <T as Config>::AssetId,
    <T as Config>::Balance,
    RuleData,
  >;
  pub type TaskOf<T> = Task<
    <T as frame_system::Config>::AccountId,
    <T as Config>::AssetId,
    <T as Config>::Balance,
    <T as Config>::MaxActionsPerTask,
    <T as Config>::MaxRulesPerTask,
  >;
  pub type TaskBalanceOf<T> =
    TaskBalance<<T as Config>::AssetId, <T as Config>::Balance, <T as Config>::MaxTaskAssets>;
  pub type AgentOf<T> = Agent<<T as frame_system::Config>::AccountId, BlockNumberFor<T>>;
  pub type ReplyEntryOf<T> = ReplyEntry<<T as frame_system::Config>::AccountId>;

  /// An agent is in exactly one of these states. Only `Active` agents may
  /// claim slots; `Nominated` agents hold a pending promotion they must
  /// confirm via `check_in_agent`.
  #[derive(
    Clone,
    Copy,
    Debug,
    Decode,
    DecodeWithMemTracking,
    Encode,
    Eq,
    MaxEncodedLen,
    PartialEq,
    TypeInfo,
  )]
  pub enum AgentStatus {
    Pending,
    Nominated,
    Active,
  }

  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
  )]
  pub struct Agent<AccountId, BlockNumber> {
    /// Where rewards are paid out.
    pub payable_account: AccountId,
    pub status: AgentStatus,
    pub registered_at: BlockNumber,
    /// Set while `Nominated`; cleared on activation.
    pub nominated_at: Option<BlockNumber>,
    /// Order of entry into the active set. Drives `ActivationOrder`
    /// balancing and equalizer tie-breaks.
    pub activation_index: u64,
    pub total_tasks_executed: u64,
    /// Block slot of the last successful claim. Falling more than the
    /// eject threshold behind the chain gets the agent ejected.
    pub last_executed_slot: u64,
  }

  /// One step of a task: an opaque payload handed to the transport layer.
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
  )]
  pub struct Action<AccountId> {
    pub target: AccountId,
    pub payload: BoundedVec<u8, ConstU32<1024>>,
    pub gas_limit: Option<u64>,
  }

  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
  )]
  #[scale_info(skip_type_params(MaxActions, MaxRules))]
  pub struct Task<AccountId, AssetId, Balance, MaxActions: Get<u32>, MaxRules: Get<u32>> {
    pub owner: AccountId,
    pub interval: Interval,
    pub boundary: Boundary,
    /// Abort the remaining actions of a run on the first failure and
    /// close the task.
    pub stop_on_fail: bool,
    pub actions: BoundedVec<Action<AccountId>, MaxActions>,
    pub rules: BoundedVec<Rule<AccountId, AssetId, Balance, RuleData>, MaxRules>,
    pub successes: u32,
    pub failures: u32,
  }

  /// Deposit reserved to fund a task's executions, held on the pallet
  /// account until debited or refunded.
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
  )]
  #[scale_info(skip_type_params(MaxAssets))]
  pub struct TaskBalance<AssetId, Balance, MaxAssets: Get<u32>> {
    pub native: Balance,
    pub assets: BoundedVec<(AssetId, Balance), MaxAssets>,
  }

  /// Immutable record of one attempted action. The reply queue is
  /// append-only and the sole source of truth for outcome statistics.
  #[derive(
    Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
  )]
  pub struct ReplyEntry<AccountId> {
    pub task_id: TaskId,
    pub action_index: u32,
    pub agent: AccountId,
    pub failed: bool,
    /// The claim came from the overflow bucket rather than the agent's
    /// regular allowance.
    pub from_overflow: bool,
  }

  /// Why a task left the registry.
  #[derive(
    Clone,
    Copy,
    Debug,
    Decode,
    DecodeWithMemTracking,
    Encode,
    Eq,
    MaxEncodedLen,
    PartialEq,
    TypeInfo,
  )]
  pub enum CloseReason {
    /// A non-recurring task ran.
    Completed,
    OwnerRemoved,
    /// No further slot fits inside the boundary window.
    BoundaryExceeded,
    /// The deposit no longer covers one execution.
    DepositExhausted,
    /// `stop_on_fail` fired.
    StoppedOnFailure,
  }

  /// Claim bookkeeping for the current slot pair. Reset whenever the
  /// observed slots advance.
  #[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Decode,
    DecodeWithMemTracking,
    Encode,
    Eq,
    MaxEncodedLen,
    PartialEq,
    TypeInfo,
  )]
  pub struct RoundCursor {
    pub block_slot: u64,
    pub time_slot: u64,
    pub block_claimed: u32,
    pub time_claimed: u32,
    /// How much of the overflow bucket is already spent, per dimension.
    pub block_extra_claimed: u32,
    pub time_extra_claimed: u32,
  }

  #[pallet::config]
  pub trait Config: frame_system::Config {
    type AssetId: Parameter + Member + Copy + MaybeSerializeDeserialize + MaxEncodedLen + Ord;

    type Balance: Parameter
      + Member
      + AtLeast32BitUnsigned
      + Default
      + Copy
      + MaybeSerializeDeserialize
      + MaxEncodedLen;

    #[pallet::constant]
    type NativeAssetId: Get<Self::AssetId>;

    /// Ledger moves for deposits, rewards, and refunds.
    type AssetOps: AssetOps<Self::AccountId, Self::AssetId, Self::Balance>;

    /// Transport layer that carries task actions.
    type ActionDispatch: ActionDispatch<Self::AccountId>;

    /// External state lookups for rule evaluation.
    type StateOracle: StateOracle<Self::AccountId, Self::AssetId, Self::Balance>;

    /// Time axis for cron scheduling.
    type TimeProvider: UnixTime;

    #[pallet::constant]
    type PalletId: Get<PalletId>;

    /// May pause the network, flip the balancer mode, and maintain the
    /// registration allow-list.
    type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    /// Registrations below this active-set size activate immediately,
    /// bypassing the nomination queue.
    #[pallet::constant]
    type MinActiveAgents: Get<u32>;
    #[pallet::constant]
    type MaxActiveAgents: Get<u32>;
    #[pallet::constant]
    type MaxPendingAgents: Get<u32>;

    /// Blocks a nominated agent must wait before `check_in_agent`.
    #[pallet::constant]
    type NominationDuration: Get<BlockNumberFor<Self>>;

    /// Block slots an active agent may fall behind before ejection.
    #[pallet::constant]
    type EjectThreshold: Get<u64>;

    /// Native balance an account must hold to register as an agent.
    #[pallet::constant]
    type MinAgentBalance: Get<Self::Balance>;

    /// When false, only allow-listed accounts may register.
    #[pallet::constant]
    type PublicRegistration: Get<bool>;

    #[pallet::constant]
    type SlotGranularityBlocks: Get<u64>;
    /// Time-slot bucket width in milliseconds.
    #[pallet::constant]
    type SlotGranularityTime: Get<u64>;

    #[pallet::constant]
    type MaxTasksPerSlot: Get<u32>;
    #[pallet::constant]
    type MaxActionsPerTask: Get<u32>;
    #[pallet::constant]
    type MaxRulesPerTask: Get<u32>;
    #[pallet::constant]
    type MaxTaskAssets: Get<u32>;

    /// Regular-capacity claims per agent per round in `ActivationOrder`
    /// mode.
    #[pallet::constant]
    type MinTasksPerAgent: Get<u32>;

    /// Flat execution cost per task run.
    #[pallet::constant]
    type BaseExecutionFee: Get<Self::Balance>;
    /// Execution cost per action.
    #[pallet::constant]
    type PerActionFee: Get<Self::Balance>;
    /// Agent surcharge on top of the execution cost.
    #[pallet::constant]
    type AgentFee: Get<Permill>;
    /// Treasury surcharge on top of the execution cost.
    #[pallet::constant]
    type TreasuryFee: Get<Permill>;

    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelper: crate::BenchmarkHelper<Self::AccountId, Self::AssetId, Self::Balance>;

    type WeightInfo: WeightInfo;
  }

  #[pallet::pallet]
  pub struct Pallet<T>(_);

  #[pallet::storage]
  #[pallet::getter(fn agents)]
  pub type Agents<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, AgentOf<T>, OptionQuery>;

  /// Active agents in activation order.
  #[pallet::storage]
  #[pallet::getter(fn active_agents)]
  pub type ActiveAgents<T: Config> =
    StorageValue<_, BoundedVec<T::AccountId, T::MaxActiveAgents>, ValueQuery>;

  /// FIFO admission queue. Nominated agents stay queued until they check
  /// in or leave.
  #[pallet::storage]
  #[pallet::getter(fn pending_agents)]
  pub type PendingAgents<T: Config> =
    StorageValue<_, BoundedVec<T::AccountId, T::MaxPendingAgents>, ValueQuery>;

  #[pallet::storage]
  pub type NextActivationIndex<T> = StorageValue<_, u64, ValueQuery>;

  /// Accounts allowed to register while public registration is off.
  #[pallet::storage]
  pub type ApprovedAgents<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, (), OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn tasks)]
  pub type Tasks<T: Config> = StorageMap<_, Identity, TaskId, TaskOf<T>, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn task_balances)]
  pub type TaskBalances<T: Config> = StorageMap<_, Identity, TaskId, TaskBalanceOf<T>, OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn tasks_total)]
  pub type TasksTotal<T> = StorageValue<_, u64, ValueQuery>;

  /// Block-dimension slots: bucketed height -> due task ids.
  #[pallet::storage]
  #[pallet::getter(fn block_slots)]
  pub type BlockSlots<T: Config> =
    StorageMap<_, Twox64Concat, u64, BoundedVec<TaskId, T::MaxTasksPerSlot>, OptionQuery>;

  /// Time-dimension slots: bucketed unix ms -> due task ids.
  #[pallet::storage]
  #[pallet::getter(fn time_slots)]
  pub type TimeSlots<T: Config> =
    StorageMap<_, Twox64Concat, u64, BoundedVec<TaskId, T::MaxTasksPerSlot>, OptionQuery>;

  /// The single pending slot of every scheduled task. For rule-gated
  /// tasks this is the ready marker; they do not appear in the slot maps.
  #[pallet::storage]
  #[pallet::getter(fn task_slot)]
  pub type TaskSlot<T: Config> = StorageMap<_, Identity, TaskId, (SlotKind, u64), OptionQuery>;

  #[pallet::storage]
  #[pallet::getter(fn reply_index)]
  pub type ReplyIndex<T> = StorageValue<_, u64, ValueQuery>;

  #[pallet::storage]
  #[pallet::getter(fn reply_queue)]
  pub type ReplyQueue<T: Config> = StorageMap<_, Twox64Concat, u64, ReplyEntryOf<T>, OptionQuery>;

  /// Rewards accrued per agent, withdrawable to the payable account.
  #[pallet::storage]
  #[pallet::getter(fn agent_rewards)]
  pub type AgentRewards<T: Config> =
    StorageMap<_, Blake2_128Concat, T::AccountId, BalanceOf<T>, ValueQuery>;

  #[pallet::storage]
  #[pallet::getter(fn treasury_balance)]
  pub type TreasuryBalance<T: Config> = StorageValue<_, BalanceOf<T>, ValueQuery>;

  #[pallet::storage]
  #[pallet::getter(fn paused)]
  pub type Paused<T> = StorageValue<_, bool, ValueQuery>;

  #[pallet::storage]
  #[pallet::getter(fn balancer_mode)]
  pub type Mode<T> = StorageValue<_, BalancerMode, ValueQuery>;

  #[pallet::storage]
  pub type CurrentRound<T> = StorageValue<_, RoundCursor, ValueQuery>;

  /// Per-agent (block, time) claim counts within the current round.
  #[pallet::storage]
  pub type RoundClaims<T: Config> =
    StorageMap<_, Blake2_128Concat, T::AccountId, (u32, u32), ValueQuery>;

  #[pallet::event]
  #[pallet::generate_deposit(pub(super) fn deposit_event)]
  pub enum Event<T: Config> {
    AgentRegistered {
      agent: T::AccountId,
      payable_account: T::AccountId,
      status: AgentStatus,
    },
    AgentNominated {
      agent: T::AccountId,
    },
    AgentActivated {
      agent: T::AccountId,
      activation_index: u64,
    },
    AgentUpdated {
      agent: T::AccountId,
      payable_account: T::AccountId,
    },
    AgentUnregistered {
      agent: T::AccountId,
      from_behind: bool,
    },
    AgentEjected {
      agent: T::AccountId,
      last_executed_slot: u64,
    },
    AgentApproved {
      agent: T::AccountId,
    },
    RewardWithdrawn {
      agent: T::AccountId,
      amount: BalanceOf<T>,
    },
    TaskCreated {
      task_id: TaskId,
      owner: T::AccountId,
      slot_kind: SlotKind,
      slot: u64,
    },
    TaskScheduled {
      task_id: TaskId,
      slot_kind: SlotKind,
      slot: u64,
    },
    TaskClosed {
      task_id: TaskId,
      reason: CloseReason,
      refunded: BalanceOf<T>,
    },
    TaskRefilled {
      task_id: TaskId,
      amount: BalanceOf<T>,
    },
    TaskAssetRefilled {
      task_id: TaskId,
      asset: T::AssetId,
      amount: BalanceOf<T>,
    },
    /// A rule-gated claim did not pass its preconditions. Recorded, not
    /// an error: the task stays scheduled and nothing was debited.
    TaskRulesNotMet {
      task_id: TaskId,
      agent: T::AccountId,
      rule_index: Option<u32>,
      indeterminate: bool,
    },
    ActionExecuted {
      task_id: TaskId,
      action_index: u32,
      reply_index: u64,
    },
    ActionFailed {
      task_id: TaskId,
      action_index: u32,
      reply_index: u64,
      error: DispatchError,
      halted: bool,
    },
    TaskExecuted {
      task_id: TaskId,
      agent: T::AccountId,
      actions_attempted: u32,
      failed: bool,
    },
    PausedSet {
      paused: bool,
    },
    BalancerModeSet {
      mode: BalancerMode,
    },
  }

  #[pallet::error]
  pub enum Error<T> {
    /// The network is paused.
    Paused,
    /// Public registration is off and the caller is not allow-listed.
    RegistrationClosed,
    AlreadyRegistered,
    BelowMinimumBalance,
    /// Active or pending capacity exhausted.
    TooManyAgents,
    AgentNotRegistered,
    NotNominated,
    /// Nominated, but the nomination window has not elapsed yet.
    NominationWindowOpen,
    NotActive,
    /// The interval is malformed (bad cron expression or zero period).
    InvalidInterval,
    /// Boundary dimension mismatch or window closes before it opens.
    InvalidBoundary,
    /// No slot fits inside the boundary window.
    BoundaryExceeded,
    SlotFull,
    NoActions,
    TaskAlreadyExists,
    TaskNotFound,
    NotTaskOwner,
    /// Nothing due in any slot.
    NoTaskAvailable,
    /// The ruled task's ready slot has not arrived.
    NotReady,
    /// Direct-by-hash claims are reserved for rule-gated tasks.
    TaskHasNoRules,
    /// The balancer gave this agent no claim this round.
    ClaimNotAllowed,
    /// The deposit cannot fund a single execution.
    DepositTooLow,
    /// The deposit no longer covers the execution fee.
    InsufficientDeposit,
    AmountZero,
    TooManyDepositAssets,
    NothingToWithdraw,
  }

  #[pallet::call]
  impl<T: Config> Pallet<T> {
    /// Register the caller as an agent. Joins the active set immediately
    /// while it is below the configured minimum, otherwise queues as
    /// `Pending`.
    #[pallet::call_index(0)]
    #[pallet::weight(T::WeightInfo::register_agent())]
    pub fn register_agent(
      origin: OriginFor<T>,
      payable_account: Option<T::AccountId>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(!Paused::<T>::get(), Error::<T>::Paused);
      ensure!(
        T::PublicRegistration::get() || ApprovedAgents::<T>::contains_key(&who),
        Error::<T>::RegistrationClosed
      );
      ensure!(!Agents::<T>::contains_key(&who), Error::<T>::AlreadyRegistered);
      ensure!(
        T::AssetOps::balance(&who, T::NativeAssetId::get()) >= T::MinAgentBalance::get(),
        Error::<T>::BelowMinimumBalance
      );
      let now = frame_system::Pallet::<T>::block_number();
      let payable = payable_account.unwrap_or_else(|| who.clone());
      let agent = Agent {
        payable_account: payable.clone(),
        status: AgentStatus::Pending,
        registered_at: now,
        nominated_at: None,
        activation_index: 0,
        total_tasks_executed: 0,
        last_executed_slot: 0,
      };
      let active_count = ActiveAgents::<T>::get().len() as u32;
      if active_count < T::MinActiveAgents::get() {
        Self::deposit_event(Event::AgentRegistered {
          agent: who.clone(),
          payable_account: payable,
          status: AgentStatus::Active,
        });
        Self::activate_agent(&who, agent, now)?;
      } else {
        PendingAgents::<T>::try_mutate(|pending| {
          pending
            .try_push(who.clone())
            .map_err(|_| Error::<T>::TooManyAgents)
        })?;
        Agents::<T>::insert(&who, &agent);
        Self::deposit_event(Event::AgentRegistered {
          agent: who,
          payable_account: payable,
          status: AgentStatus::Pending,
        });
      }
      Ok(())
    }

    /// Change the reward payout account.
    #[pallet::call_index(1)]
    #[pallet::weight(T::WeightInfo::update_agent())]
    pub fn update_agent(origin: OriginFor<T>, payable_account: T::AccountId) -> DispatchResult {
      let who = ensure_signed(origin)?;
      Agents::<T>::try_mutate(&who, |maybe| -> DispatchResult {
        let agent = maybe.as_mut().ok_or(Error::<T>::AgentNotRegistered)?;
        agent.payable_account = payable_account.clone();
        Ok(())
      })?;
      Self::deposit_event(Event::AgentUpdated {
        agent: who,
        payable_account,
      });
      Ok(())
    }

    /// Confirm a nomination after a full nomination window and join the
    /// active set.
    #[pallet::call_index(2)]
    #[pallet::weight(T::WeightInfo::check_in_agent())]
    pub fn check_in_agent(origin: OriginFor<T>) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(!Paused::<T>::get(), Error::<T>::Paused);
      let agent = Agents::<T>::get(&who).ok_or(Error::<T>::AgentNotRegistered)?;
      ensure!(agent.status == AgentStatus::Nominated, Error::<T>::NotNominated);
      let nominated_at = agent.nominated_at.ok_or(Error::<T>::NotNominated)?;
      let now = frame_system::Pallet::<T>::block_number();
      ensure!(
        now >= nominated_at.saturating_add(T::NominationDuration::get()),
        Error::<T>::NominationWindowOpen
      );
      ensure!(
        (ActiveAgents::<T>::get().len() as u32) < T::MaxActiveAgents::get(),
        Error::<T>::TooManyAgents
      );
      PendingAgents::<T>::mutate(|pending| {
        if let Some(pos) = pending.iter().position(|a| a == &who) {
          pending.remove(pos);
        }
      });
      Self::activate_agent(&who, agent, now)
    }

    /// Leave the network in any status. Accrued rewards are flushed to
    /// the payable account. Unless `from_behind` is set, an active
    /// agent's departure immediately nominates the longest-waiting
    /// pending agent.
    #[pallet::call_index(3)]
    #[pallet::weight(T::WeightInfo::unregister_agent())]
    pub fn unregister_agent(origin: OriginFor<T>, from_behind: bool) -> DispatchResult {
      let who = ensure_signed(origin)?;
      let agent = Agents::<T>::get(&who).ok_or(Error::<T>::AgentNotRegistered)?;
      Self::flush_rewards(&who, &agent.payable_account)?;
      let now = frame_system::Pallet::<T>::block_number();
      match agent.status {
        AgentStatus::Active => {
          ActiveAgents::<T>::mutate(|active| {
            if let Some(pos) = active.iter().position(|a| a == &who) {
              active.remove(pos);
            }
          });
          if !from_behind {
            Self::nominate_next(now);
          }
        }
        AgentStatus::Pending | AgentStatus::Nominated => {
          PendingAgents::<T>::mutate(|pending| {
            if let Some(pos) = pending.iter().position(|a| a == &who) {
              pending.remove(pos);
            }
          });
        }
      }
      Agents::<T>::remove(&who);
      RoundClaims::<T>::remove(&who);
      Self::deposit_event(Event::AgentUnregistered {
        agent: who,
        from_behind,
      });
      Ok(())
    }

    /// Pay out the caller's accrued rewards to its payable account.
    #[pallet::call_index(4)]
    #[pallet::weight(T::WeightInfo::withdraw_reward())]
    pub fn withdraw_reward(origin: OriginFor<T>) -> DispatchResult {
      let who = ensure_signed(origin)?;
      let agent = Agents::<T>::get(&who).ok_or(Error::<T>::AgentNotRegistered)?;
      let amount = AgentRewards::<T>::get(&who);
      ensure!(!amount.is_zero(), Error::<T>::NothingToWithdraw);
      T::AssetOps::transfer(
        &Self::account_id(),
        &agent.payable_account,
        T::NativeAssetId::get(),
        amount,
      )?;
      AgentRewards::<T>::remove(&who);
      Self::deposit_event(Event::RewardWithdrawn { agent: who, amount });
      Ok(())
    }

    /// Allow-list an account for registration while public registration
    /// is off.
    #[pallet::call_index(5)]
    #[pallet::weight(T::WeightInfo::approve_agent())]
    pub fn approve_agent(origin: OriginFor<T>, account: T::AccountId) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      ApprovedAgents::<T>::insert(&account, ());
      Self::deposit_event(Event::AgentApproved { agent: account });
      Ok(())
    }

    /// Submit a funded task. The deposit moves to the pallet account and
    /// must cover at least one execution. The first slot is computed
    /// immediately; a task whose boundary admits no slot is rejected.
    #[pallet::call_index(6)]
    #[pallet::weight(T::WeightInfo::create_task())]
    pub fn create_task(
      origin: OriginFor<T>,
      interval: IntervalSpec<CronExpr>,
      boundary: Option<Boundary>,
      stop_on_fail: bool,
      actions: BoundedVec<ActionOf<T>, T::MaxActionsPerTask>,
      rules: BoundedVec<RuleOf<T>, T::MaxRulesPerTask>,
      deposit: BalanceOf<T>,
    ) -> DispatchResult {
      let owner = ensure_signed(origin)?;
      ensure!(!Paused::<T>::get(), Error::<T>::Paused);
      ensure!(!actions.is_empty(), Error::<T>::NoActions);
      let interval = interval.resolve().map_err(|_| Error::<T>::InvalidInterval)?;
      let now = frame_system::Pallet::<T>::block_number();
      let height: u64 = now.saturated_into();
      let now_ms = Self::now_ms();
      let boundary = Boundary::validate(&interval, boundary, height, now_ms)
        .map_err(|_| Error::<T>::InvalidBoundary)?;
      let task = Task {
        owner: owner.clone(),
        interval,
        boundary,
        stop_on_fail,
        actions,
        rules,
        successes: 0,
        failures: 0,
      };
      let task_id = Self::task_id_of(&task);
      ensure!(!Tasks::<T>::contains_key(task_id), Error::<T>::TaskAlreadyExists);
      let (_, _, fee) = Self::execution_fee(task.actions.len() as u32);
      ensure!(deposit >= fee, Error::<T>::DepositTooLow);
      let (slot_kind, slot) = next_slot(
        &task.interval,
        &task.boundary,
        height,
        now_ms,
        T::SlotGranularityBlocks::get(),
        T::SlotGranularityTime::get(),
      )
      .ok_or(Error::<T>::BoundaryExceeded)?;
      if task.rules.is_empty() {
        Self::ensure_slot_capacity(slot_kind, slot, task_id)?;
      }
      if !deposit.is_zero() {
        T::AssetOps::transfer(&owner, &Self::account_id(), T::NativeAssetId::get(), deposit)?;
      }
      if task.rules.is_empty() {
        Self::insert_slot_entry(slot_kind, slot, task_id)?;
      }
      TaskSlot::<T>::insert(task_id, (slot_kind, slot));
      Tasks::<T>::insert(task_id, &task);
      TaskBalances::<T>::insert(
        task_id,
        TaskBalance {
          native: deposit,
          assets: BoundedVec::default(),
        },
      );
      TasksTotal::<T>::mutate(|total| *total = total.saturating_add(1));
      Self::deposit_event(Event::TaskCreated {
        task_id,
        owner,
        slot_kind,
        slot,
      });
      Ok(())
    }

    /// Remove an owned task and refund its remaining deposit.
    #[pallet::call_index(7)]
    #[pallet::weight(T::WeightInfo::remove_task())]
    pub fn remove_task(origin: OriginFor<T>, task_id: TaskId) -> DispatchResult {
      let who = ensure_signed(origin)?;
      let task = Tasks::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      ensure!(task.owner == who, Error::<T>::NotTaskOwner);
      let balance = TaskBalances::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      Self::close_task(task_id, &task, balance, CloseReason::OwnerRemoved);
      Ok(())
    }

    /// Top up a task's native deposit.
    #[pallet::call_index(8)]
    #[pallet::weight(T::WeightInfo::refill_task())]
    pub fn refill_task(origin: OriginFor<T>, task_id: TaskId, amount: BalanceOf<T>) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(!amount.is_zero(), Error::<T>::AmountZero);
      let task = Tasks::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      ensure!(task.owner == who, Error::<T>::NotTaskOwner);
      T::AssetOps::transfer(&who, &Self::account_id(), T::NativeAssetId::get(), amount)?;
      TaskBalances::<T>::mutate(task_id, |maybe| {
        if let Some(balance) = maybe {
          balance.native = balance.native.saturating_add(amount);
        }
      });
      Self::deposit_event(Event::TaskRefilled { task_id, amount });
      Ok(())
    }

    /// Top up a task's fungible-asset deposit.
    #[pallet::call_index(9)]
    #[pallet::weight(T::WeightInfo::refill_task_asset())]
    pub fn refill_task_asset(
      origin: OriginFor<T>,
      task_id: TaskId,
      asset: T::AssetId,
      amount: BalanceOf<T>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(!amount.is_zero(), Error::<T>::AmountZero);
      let task = Tasks::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      ensure!(task.owner == who, Error::<T>::NotTaskOwner);
      let balance = TaskBalances::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      let known = balance.assets.iter().any(|(a, _)| *a == asset);
      ensure!(
        known || (balance.assets.len() as u32) < T::MaxTaskAssets::get(),
        Error::<T>::TooManyDepositAssets
      );
      T::AssetOps::transfer(&who, &Self::account_id(), asset, amount)?;
      TaskBalances::<T>::mutate(task_id, |maybe| {
        if let Some(balance) = maybe {
          if let Some(entry) = balance.assets.iter_mut().find(|(a, _)| *a == asset) {
            entry.1 = entry.1.saturating_add(amount);
          } else {
            let _ = balance.assets.try_push((asset, amount));
          }
        }
      });
      Self::deposit_event(Event::TaskAssetRefilled {
        task_id,
        asset,
        amount,
      });
      Ok(())
    }

    /// Claim and execute one due task. Without `task_id` the earliest due
    /// slot is drained under balancer arbitration (block dimension
    /// preferred); with `task_id` a rule-gated task is claimed directly
    /// once its ready slot has arrived.
    ///
    /// A stale agent is ejected here instead of claiming — lazy ejection
    /// is a side effect of the claim attempt and must outlive it, so it
    /// surfaces as a recorded `AgentEjected` event rather than an
    /// aborting error.
    #[pallet::call_index(10)]
    #[pallet::weight(T::WeightInfo::proxy_call())]
    pub fn proxy_call(origin: OriginFor<T>, task_id: Option<TaskId>) -> DispatchResult {
      let who = ensure_signed(origin)?;
      ensure!(!Paused::<T>::get(), Error::<T>::Paused);
      let mut agent = Agents::<T>::get(&who).ok_or(Error::<T>::AgentNotRegistered)?;
      ensure!(agent.status == AgentStatus::Active, Error::<T>::NotActive);
      let now = frame_system::Pallet::<T>::block_number();
      let height: u64 = now.saturated_into();
      let now_ms = Self::now_ms();
      let block_slot = Self::bucket(height, T::SlotGranularityBlocks::get());
      let time_slot = Self::bucket(now_ms, T::SlotGranularityTime::get());
      if Self::is_stale(&agent, block_slot) {
        Self::eject_agent(&who, &agent, now);
        return Ok(());
      }
      match task_id {
        Some(task_id) => {
          Self::claim_ruled_task(&who, &mut agent, task_id, height, block_slot, time_slot, now_ms)
        }
        None => Self::claim_from_slot(&who, &mut agent, height, block_slot, time_slot, now_ms),
      }
    }

    /// Permissionless housekeeping: eject every active agent that has
    /// fallen past the eject threshold and nominate replacements.
    #[pallet::call_index(11)]
    #[pallet::weight(T::WeightInfo::tick())]
    pub fn tick(origin: OriginFor<T>) -> DispatchResult {
      let _who = ensure_signed(origin)?;
      let now = frame_system::Pallet::<T>::block_number();
      let height: u64 = now.saturated_into();
      let block_slot = Self::bucket(height, T::SlotGranularityBlocks::get());
      let active = ActiveAgents::<T>::get();
      for account in active.iter() {
        let Some(agent) = Agents::<T>::get(account) else {
          continue;
        };
        if Self::is_stale(&agent, block_slot) {
          Self::eject_agent(account, &agent, now);
        }
      }
      Ok(())
    }

    /// Pause or resume admissions, task creation, and claims.
    #[pallet::call_index(12)]
    #[pallet::weight(T::WeightInfo::set_paused())]
    pub fn set_paused(origin: OriginFor<T>, paused: bool) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      Paused::<T>::put(paused);
      Self::deposit_event(Event::PausedSet { paused });
      Ok(())
    }

    /// Switch the claim-partitioning policy. Applies from the next round.
    #[pallet::call_index(13)]
    #[pallet::weight(T::WeightInfo::set_balancer_mode())]
    pub fn set_balancer_mode(origin: OriginFor<T>, mode: BalancerMode) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      Mode::<T>::put(mode);
      Self::deposit_event(Event::BalancerModeSet { mode });
      Ok(())
    }
  }

  impl<T: Config> Pallet<T> {
    /// The pallet's sovereign account holding task deposits and accrued
    /// rewards.
    pub fn account_id() -> T::AccountId {
      T::PalletId::get().into_account_truncating()
    }

    /// Execution fee split: (agent reward, treasury cut, total debit).
    pub fn execution_fee(action_count: u32) -> (BalanceOf<T>, BalanceOf<T>, BalanceOf<T>) {
      let cost = T::BaseExecutionFee::get()
        .saturating_add(T::PerActionFee::get().saturating_mul(action_count.into()));
      let agent_cut = T::AgentFee::get().mul_floor(cost);
      let treasury_cut = T::TreasuryFee::get().mul_floor(cost);
      let reward = cost.saturating_add(agent_cut);
      let total = reward.saturating_add(treasury_cut);
      (reward, treasury_cut, total)
    }

    pub fn task_id_of(task: &TaskOf<T>) -> TaskId {
      frame::hashing::blake2_256(&task.encode())
    }

    fn now_ms() -> u64 {
      T::TimeProvider::now().as_millis().saturated_into()
    }

    fn bucket(value: u64, granularity: u64) -> u64 {
      if granularity <= 1 {
        value
      } else {
        value - value % granularity
      }
    }

    fn is_stale(agent: &AgentOf<T>, block_slot: u64) -> bool {
      block_slot > agent.last_executed_slot.saturating_add(T::EjectThreshold::get())
    }

    fn activate_agent(
      who: &T::AccountId,
      mut agent: AgentOf<T>,
      now: BlockNumberFor<T>,
    ) -> DispatchResult {
      ActiveAgents::<T>::try_mutate(|active| {
        active
          .try_push(who.clone())
          .map_err(|_| Error::<T>::TooManyAgents)
      })?;
      let activation_index = NextActivationIndex::<T>::mutate(|next| {
        let index = *next;
        *next = next.saturating_add(1);
        index
      });
      let height: u64 = now.saturated_into();
      agent.status = AgentStatus::Active;
      agent.nominated_at = None;
      agent.activation_index = activation_index;
      // seed the miss marker so a fresh agent is not instantly stale
      agent.last_executed_slot = Self::bucket(height, T::SlotGranularityBlocks::get());
      Agents::<T>::insert(who, agent);
      Self::deposit_event(Event::AgentActivated {
        agent: who.clone(),
        activation_index,
      });
      Ok(())
    }

    /// Nominate the longest-waiting agent that is still plain `Pending`.
    fn nominate_next(now: BlockNumberFor<T>) {
      let pending = PendingAgents::<T>::get();
      for account in pending.iter() {
        let Some(mut agent) = Agents::<T>::get(account) else {
          continue;
        };
        if agent.status == AgentStatus::Pending {
          agent.status = AgentStatus::Nominated;
          agent.nominated_at = Some(now);
          Agents::<T>::insert(account, agent);
          Self::deposit_event(Event::AgentNominated {
            agent: account.clone(),
          });
          return;
        }
      }
    }

    fn flush_rewards(who: &T::AccountId, payable: &T::AccountId) -> DispatchResult {
      let amount = AgentRewards::<T>::take(who);
      if amount.is_zero() {
        return Ok(());
      }
      if let Err(err) =
        T::AssetOps::transfer(&Self::account_id(), payable, T::NativeAssetId::get(), amount)
      {
        AgentRewards::<T>::insert(who, amount);
        return Err(err);
      }
      Ok(())
    }

    fn eject_agent(who: &T::AccountId, agent: &AgentOf<T>, now: BlockNumberFor<T>) {
      if let Err(err) = Self::flush_rewards(who, &agent.payable_account) {
        log::warn!(target: "cadence", "reward flush during ejection failed: {err:?}");
      }
      ActiveAgents::<T>::mutate(|active| {
        if let Some(pos) = active.iter().position(|a| a == who) {
          active.remove(pos);
        }
      });
      Agents::<T>::remove(who);
      RoundClaims::<T>::remove(who);
      Self::deposit_event(Event::AgentEjected {
        agent: who.clone(),
        last_executed_slot: agent.last_executed_slot,
      });
      Self::nominate_next(now);
    }

    /// Compute and record the task's next slot. Rule-gated tasks only get
    /// the ready marker; everything else also lands in the shared slot
    /// maps.
    fn schedule_task(
      task_id: TaskId,
      task: &TaskOf<T>,
      height: u64,
      now_ms: u64,
    ) -> Result<(SlotKind, u64), Error<T>> {
      let (slot_kind, slot) = next_slot(
        &task.interval,
        &task.boundary,
        height,
        now_ms,
        T::SlotGranularityBlocks::get(),
        T::SlotGranularityTime::get(),
      )
      .ok_or(Error::<T>::BoundaryExceeded)?;
      if task.rules.is_empty() {
        Self::insert_slot_entry(slot_kind, slot, task_id)?;
      }
      TaskSlot::<T>::insert(task_id, (slot_kind, slot));
      Ok((slot_kind, slot))
    }

    /// Idempotent slot insertion: re-inserting a present id is a no-op.
    pub(crate) fn insert_slot_entry(
      slot_kind: SlotKind,
      slot: u64,
      task_id: TaskId,
    ) -> Result<(), Error<T>> {
      let insert = |maybe: &mut Option<BoundedVec<TaskId, T::MaxTasksPerSlot>>| {
        let tasks = maybe.get_or_insert_with(BoundedVec::default);
        if tasks.contains(&task_id) {
          return Ok(());
        }
        tasks.try_push(task_id).map_err(|_| Error::<T>::SlotFull)
      };
      match slot_kind {
        SlotKind::Block => BlockSlots::<T>::try_mutate(slot, insert),
        SlotKind::Time => TimeSlots::<T>::try_mutate(slot, insert),
      }
    }

    fn remove_slot_entry(slot_kind: SlotKind, slot: u64, task_id: TaskId) {
      let remove = |maybe: &mut Option<BoundedVec<TaskId, T::MaxTasksPerSlot>>| {
        if let Some(tasks) = maybe {
          if let Some(pos) = tasks.iter().position(|id| *id == task_id) {
            tasks.remove(pos);
          }
          if tasks.is_empty() {
            *maybe = None;
          }
        }
      };
      match slot_kind {
        SlotKind::Block => BlockSlots::<T>::mutate(slot, remove),
        SlotKind::Time => TimeSlots::<T>::mutate(slot, remove),
      }
    }

    /// The slot must hold `task_id`-free capacity or already contain it.
    fn ensure_slot_capacity(slot_kind: SlotKind, slot: u64, task_id: TaskId) -> Result<(), Error<T>> {
      let tasks = match slot_kind {
        SlotKind::Block => BlockSlots::<T>::get(slot),
        SlotKind::Time => TimeSlots::<T>::get(slot),
      };
      let Some(tasks) = tasks else {
        return Ok(());
      };
      if tasks.contains(&task_id) || (tasks.len() as u32) < T::MaxTasksPerSlot::get() {
        Ok(())
      } else {
        Err(Error::<T>::SlotFull)
      }
    }

    fn peek_slot_task(slot_kind: SlotKind, slot: u64) -> Option<TaskId> {
      let tasks = match slot_kind {
        SlotKind::Block => BlockSlots::<T>::get(slot),
        SlotKind::Time => TimeSlots::<T>::get(slot),
      };
      tasks.and_then(|tasks| tasks.first().copied())
    }

    pub(crate) fn pop_slot_task(slot_kind: SlotKind, slot: u64) -> Option<TaskId> {
      let pop = |maybe: &mut Option<BoundedVec<TaskId, T::MaxTasksPerSlot>>| {
        let tasks = maybe.as_mut()?;
        if tasks.is_empty() {
          *maybe = None;
          return None;
        }
        let task_id = tasks.remove(0);
        if tasks.is_empty() {
          *maybe = None;
        }
        Some(task_id)
      };
      match slot_kind {
        SlotKind::Block => BlockSlots::<T>::mutate(slot, pop),
        SlotKind::Time => TimeSlots::<T>::mutate(slot, pop),
      }
    }

    /// Earliest slot at or behind the current buckets, block dimension
    /// first.
    fn find_due_slot(block_slot: u64, time_slot: u64) -> Option<(SlotKind, u64)> {
      if let Some(slot) = BlockSlots::<T>::iter_keys().filter(|slot| *slot <= block_slot).min() {
        return Some((SlotKind::Block, slot));
      }
      TimeSlots::<T>::iter_keys()
        .filter(|slot| *slot <= time_slot)
        .min()
        .map(|slot| (SlotKind::Time, slot))
    }

    /// Reset per-round claim bookkeeping when the observed slot pair
    /// advances.
    fn refresh_round(block_slot: u64, time_slot: u64) {
      let cursor = CurrentRound::<T>::get();
      if cursor.block_slot != block_slot || cursor.time_slot != time_slot {
        let limit = T::MaxActiveAgents::get().saturating_add(T::MaxPendingAgents::get());
        let _ = RoundClaims::<T>::clear(limit, None);
        CurrentRound::<T>::put(RoundCursor {
          block_slot,
          time_slot,
          ..RoundCursor::default()
        });
      }
    }

    fn claim_from_slot(
      who: &T::AccountId,
      agent: &mut AgentOf<T>,
      height: u64,
      block_slot: u64,
      time_slot: u64,
      now_ms: u64,
    ) -> DispatchResult {
      Self::refresh_round(block_slot, time_slot);
      let (slot_kind, slot) =
        Self::find_due_slot(block_slot, time_slot).ok_or(Error::<T>::NoTaskAvailable)?;
      let remaining = match slot_kind {
        SlotKind::Block => BlockSlots::<T>::get(slot).map(|tasks| tasks.len()).unwrap_or(0),
        SlotKind::Time => TimeSlots::<T>::get(slot).map(|tasks| tasks.len()).unwrap_or(0),
      } as u32;
      let cursor = CurrentRound::<T>::get();
      let claimed_total = match slot_kind {
        SlotKind::Block => cursor.block_claimed,
        SlotKind::Time => cursor.time_claimed,
      };
      let due_tasks = remaining.saturating_add(claimed_total);

      // snapshot the active set in activation order with pre-round counts
      let active = ActiveAgents::<T>::get();
      let mut snapshot = Vec::with_capacity(active.len());
      let mut position = None;
      for (index, account) in active.iter().enumerate() {
        if account == who {
          position = Some(index);
        }
        let Some(info) = Agents::<T>::get(account) else {
          log::warn!(target: "cadence", "active agent missing from registry");
          snapshot.push(balancer::AgentLoad { executed: 0 });
          continue;
        };
        let (block_claimed, time_claimed) = RoundClaims::<T>::get(account);
        let round_claims = u64::from(block_claimed.saturating_add(time_claimed));
        snapshot.push(balancer::AgentLoad {
          executed: info.total_tasks_executed.saturating_sub(round_claims),
        });
      }
      let position = position.ok_or(Error::<T>::NotActive)?;
      let allowance = balancer::agent_allowance(
        Mode::<T>::get(),
        &snapshot,
        due_tasks,
        T::MinTasksPerAgent::get(),
        position,
      );
      let (my_block, my_time) = RoundClaims::<T>::get(who);
      let mine = match slot_kind {
        SlotKind::Block => my_block,
        SlotKind::Time => my_time,
      };
      let extra_claimed = match slot_kind {
        SlotKind::Block => cursor.block_extra_claimed,
        SlotKind::Time => cursor.time_extra_claimed,
      };
      let from_overflow = if mine < allowance.tasks {
        false
      } else if extra_claimed < allowance.extra {
        true
      } else {
        return Err(Error::<T>::ClaimNotAllowed.into());
      };

      let task_id = Self::peek_slot_task(slot_kind, slot).ok_or(Error::<T>::NoTaskAvailable)?;
      let task = Tasks::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      let balance = TaskBalances::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      let (_, _, fee) = Self::execution_fee(task.actions.len() as u32);
      ensure!(balance.native >= fee, Error::<T>::InsufficientDeposit);

      let _ = Self::pop_slot_task(slot_kind, slot);
      TaskSlot::<T>::remove(task_id);
      Self::execute_task(who, agent, task_id, task, balance, from_overflow, height, block_slot, now_ms);

      RoundClaims::<T>::mutate(who, |claims| match slot_kind {
        SlotKind::Block => claims.0 = claims.0.saturating_add(1),
        SlotKind::Time => claims.1 = claims.1.saturating_add(1),
      });
      CurrentRound::<T>::mutate(|cursor| {
        match slot_kind {
          SlotKind::Block => cursor.block_claimed = cursor.block_claimed.saturating_add(1),
          SlotKind::Time => cursor.time_claimed = cursor.time_claimed.saturating_add(1),
        }
        if from_overflow {
          match slot_kind {
            SlotKind::Block => {
              cursor.block_extra_claimed = cursor.block_extra_claimed.saturating_add(1)
            }
            SlotKind::Time => cursor.time_extra_claimed = cursor.time_extra_claimed.saturating_add(1),
          }
        }
      });
      Ok(())
    }

    fn claim_ruled_task(
      who: &T::AccountId,
      agent: &mut AgentOf<T>,
      task_id: TaskId,
      height: u64,
      block_slot: u64,
      time_slot: u64,
      now_ms: u64,
    ) -> DispatchResult {
      let task = Tasks::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      ensure!(!task.rules.is_empty(), Error::<T>::TaskHasNoRules);
      let (slot_kind, ready_at) = TaskSlot::<T>::get(task_id).ok_or(Error::<T>::NotReady)?;
      let arrived = match slot_kind {
        SlotKind::Block => ready_at <= block_slot,
        SlotKind::Time => ready_at <= time_slot,
      };
      ensure!(arrived, Error::<T>::NotReady);
      let (verdict, rule_index) =
        evaluate_all::<T::StateOracle, _, _, _, _>(task.rules.as_slice());
      if !verdict.is_pass() {
        // recorded miss, not a rejection: nothing was debited and the
        // task stays scheduled for a later attempt
        Self::deposit_event(Event::TaskRulesNotMet {
          task_id,
          agent: who.clone(),
          rule_index,
          indeterminate: matches!(verdict, RuleVerdict::Indeterminate),
        });
        return Ok(());
      }
      let balance = TaskBalances::<T>::get(task_id).ok_or(Error::<T>::TaskNotFound)?;
      let (_, _, fee) = Self::execution_fee(task.actions.len() as u32);
      ensure!(balance.native >= fee, Error::<T>::InsufficientDeposit);
      TaskSlot::<T>::remove(task_id);
      Self::execute_task(who, agent, task_id, task, balance, false, height, block_slot, now_ms);
      Ok(())
    }

    /// Debit the fee, run the action list in order, record every outcome,
    /// then reschedule or close. Callers have verified the deposit covers
    /// the fee; from here the claim proceeds as one indivisible unit.
    fn execute_task(
      who: &T::AccountId,
      agent: &mut AgentOf<T>,
      task_id: TaskId,
      mut task: TaskOf<T>,
      mut balance: TaskBalanceOf<T>,
      from_overflow: bool,
      height: u64,
      block_slot: u64,
      now_ms: u64,
    ) {
      let (reward, treasury_cut, fee) = Self::execution_fee(task.actions.len() as u32);
      // fee debit is a reservation, not refundable mid-run
      balance.native = balance.native.saturating_sub(fee);
      if !reward.is_zero() {
        AgentRewards::<T>::mutate(who, |accrued| *accrued = accrued.saturating_add(reward));
      }
      if !treasury_cut.is_zero() {
        TreasuryBalance::<T>::mutate(|accrued| *accrued = accrued.saturating_add(treasury_cut));
      }

      let mut attempted: u32 = 0;
      let mut any_failed = false;
      for (index, action) in task.actions.iter().enumerate() {
        let action_index = index as u32;
        let outcome = T::ActionDispatch::submit(
          &task.owner,
          &action.target,
          action.payload.as_slice(),
          action.gas_limit,
        );
        let failed = outcome.is_err();
        let reply_index = Self::append_reply(ReplyEntry {
          task_id,
          action_index,
          agent: who.clone(),
          failed,
          from_overflow,
        });
        attempted = attempted.saturating_add(1);
        match outcome {
          Ok(()) => Self::deposit_event(Event::ActionExecuted {
            task_id,
            action_index,
            reply_index,
          }),
          Err(error) => Self::deposit_event(Event::ActionFailed {
            task_id,
            action_index,
            reply_index,
            error,
            halted: task.stop_on_fail,
          }),
        }
        if failed {
          any_failed = true;
          if task.stop_on_fail {
            break;
          }
        }
      }

      if any_failed {
        task.failures = task.failures.saturating_add(1);
      } else {
        task.successes = task.successes.saturating_add(1);
      }
      agent.total_tasks_executed = agent.total_tasks_executed.saturating_add(1);
      agent.last_executed_slot = block_slot;
      Agents::<T>::insert(who, agent.clone());
      Self::deposit_event(Event::TaskExecuted {
        task_id,
        agent: who.clone(),
        actions_attempted: attempted,
        failed: any_failed,
      });

      let halted = task.stop_on_fail && any_failed;
      if !task.interval.is_recurring() {
        Self::close_task(task_id, &task, balance, CloseReason::Completed);
      } else if halted {
        Self::close_task(task_id, &task, balance, CloseReason::StoppedOnFailure);
      } else if balance.native < fee {
        Self::close_task(task_id, &task, balance, CloseReason::DepositExhausted);
      } else {
        match Self::schedule_task(task_id, &task, height, now_ms) {
          Ok((slot_kind, slot)) => {
            Tasks::<T>::insert(task_id, &task);
            TaskBalances::<T>::insert(task_id, &balance);
            Self::deposit_event(Event::TaskScheduled {
              task_id,
              slot_kind,
              slot,
            });
          }
          Err(err) => {
            if !matches!(err, Error::<T>::BoundaryExceeded) {
              log::warn!(target: "cadence", "rescheduling failed: {err:?}");
            }
            Self::close_task(task_id, &task, balance, CloseReason::BoundaryExceeded);
          }
        }
      }
    }

    fn append_reply(entry: ReplyEntryOf<T>) -> u64 {
      let index = ReplyIndex::<T>::mutate(|next| {
        let index = *next;
        *next = next.saturating_add(1);
        index
      });
      ReplyQueue::<T>::insert(index, entry);
      index
    }

    /// Refund the remaining deposit and drop every trace of the task.
    fn close_task(
      task_id: TaskId,
      task: &TaskOf<T>,
      balance: TaskBalanceOf<T>,
      reason: CloseReason,
    ) {
      let pallet = Self::account_id();
      let mut refunded = balance.native;
      if !balance.native.is_zero() {
        if let Err(err) =
          T::AssetOps::transfer(&pallet, &task.owner, T::NativeAssetId::get(), balance.native)
        {
          log::warn!(target: "cadence", "native refund failed: {err:?}");
          refunded = Zero::zero();
        }
      }
      for (asset, amount) in balance.assets.iter() {
        if amount.is_zero() {
          continue;
        }
        if let Err(err) = T::AssetOps::transfer(&pallet, &task.owner, *asset, *amount) {
          log::warn!(target: "cadence", "asset refund failed: {err:?}");
        }
      }
      if let Some((slot_kind, slot)) = TaskSlot::<T>::take(task_id) {
        Self::remove_slot_entry(slot_kind, slot, task_id);
      }
      Tasks::<T>::remove(task_id);
      TaskBalances::<T>::remove(task_id);
      TasksTotal::<T>::mutate(|total| *total = total.saturating_sub(1));
      Self::deposit_event(Event::TaskClosed {
        task_id,
        reason,
        refunded,
      });
    }
  }
}
