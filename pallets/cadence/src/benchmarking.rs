use crate::*;
use polkadot_sdk::frame_benchmarking::v2::*;
use polkadot_sdk::frame_system::RawOrigin;
use polkadot_sdk::sp_runtime::traits::{SaturatedConversion, Zero};

use crate::pallet::{
  ActiveAgents, Agent, AgentRewards, Agents, AgentStatus, BalanceOf, PendingAgents, Tasks,
};
use frame::prelude::*;
use primitives::IntervalSpec;

fn endowed_caller<T: Config>(name: &'static str) -> T::AccountId {
  let who: T::AccountId = account(name, 0, 0);
  T::BenchmarkHelper::endow(&who).expect("endow failed");
  who
}

fn single_action<T: Config>(target: &T::AccountId) -> BoundedVec<ActionOf<T>, T::MaxActionsPerTask> {
  BoundedVec::truncate_from(alloc::vec![Action {
    target: target.clone(),
    payload: BoundedVec::truncate_from(b"ping".to_vec()),
    gas_limit: None,
  }])
}

fn submit_task<T: Config>(owner: &T::AccountId) -> TaskId {
  let deposit = Pallet::<T>::execution_fee(1).2;
  Pallet::<T>::create_task(
    RawOrigin::Signed(owner.clone()).into(),
    IntervalSpec::Immediate,
    None,
    false,
    single_action::<T>(owner),
    BoundedVec::default(),
    deposit,
  )
  .expect("task creation failed");
  Tasks::<T>::iter_keys().next().expect("task missing")
}

fn force_active_agent<T: Config>(who: &T::AccountId, last_executed_slot: u64) {
  let agent: AgentOf<T> = Agent {
    payable_account: who.clone(),
    status: AgentStatus::Active,
    registered_at: Zero::zero(),
    nominated_at: None,
    activation_index: 0,
    total_tasks_executed: 0,
    last_executed_slot,
  };
  Agents::<T>::insert(who, agent);
  ActiveAgents::<T>::mutate(|active| {
    let _ = active.try_push(who.clone());
  });
}

#[benchmarks]
mod benches {
  use super::*;

  #[benchmark]
  fn register_agent() {
    let caller = endowed_caller::<T>("agent");

    #[extrinsic_call]
    register_agent(RawOrigin::Signed(caller), None);
  }

  #[benchmark]
  fn update_agent() {
    let caller = endowed_caller::<T>("agent");
    force_active_agent::<T>(&caller, 0);
    let payable: T::AccountId = account("payable", 0, 0);

    #[extrinsic_call]
    update_agent(RawOrigin::Signed(caller), payable);
  }

  #[benchmark]
  fn check_in_agent() {
    let caller = endowed_caller::<T>("agent");
    let agent: AgentOf<T> = Agent {
      payable_account: caller.clone(),
      status: AgentStatus::Nominated,
      registered_at: Zero::zero(),
      nominated_at: Some(Zero::zero()),
      activation_index: 0,
      total_tasks_executed: 0,
      last_executed_slot: 0,
    };
    Agents::<T>::insert(&caller, agent);
    PendingAgents::<T>::mutate(|pending| {
      let _ = pending.try_push(caller.clone());
    });
    let when = T::NominationDuration::get().saturating_add(1u32.into());
    polkadot_sdk::frame_system::Pallet::<T>::set_block_number(when);

    #[extrinsic_call]
    check_in_agent(RawOrigin::Signed(caller));
  }

  #[benchmark]
  fn unregister_agent() {
    let caller = endowed_caller::<T>("agent");
    force_active_agent::<T>(&caller, 0);

    #[extrinsic_call]
    unregister_agent(RawOrigin::Signed(caller), false);
  }

  #[benchmark]
  fn withdraw_reward() {
    let caller = endowed_caller::<T>("agent");
    force_active_agent::<T>(&caller, 0);
    T::BenchmarkHelper::endow(&Pallet::<T>::account_id()).expect("endow failed");
    let amount: BalanceOf<T> = 1_000u32.into();
    AgentRewards::<T>::insert(&caller, amount);

    #[extrinsic_call]
    withdraw_reward(RawOrigin::Signed(caller));
  }

  #[benchmark]
  fn approve_agent() {
    let target: T::AccountId = account("agent", 0, 0);

    #[extrinsic_call]
    approve_agent(RawOrigin::Root, target);
  }

  #[benchmark]
  fn create_task() {
    let owner = endowed_caller::<T>("owner");
    let deposit = Pallet::<T>::execution_fee(1).2;
    let actions = single_action::<T>(&owner);

    #[extrinsic_call]
    create_task(
      RawOrigin::Signed(owner),
      IntervalSpec::Immediate,
      None,
      false,
      actions,
      BoundedVec::default(),
      deposit,
    );
  }

  #[benchmark]
  fn remove_task() {
    let owner = endowed_caller::<T>("owner");
    let task_id = submit_task::<T>(&owner);

    #[extrinsic_call]
    remove_task(RawOrigin::Signed(owner), task_id);
  }

  #[benchmark]
  fn refill_task() {
    let owner = endowed_caller::<T>("owner");
    let task_id = submit_task::<T>(&owner);
    let amount: BalanceOf<T> = 1_000u32.into();

    #[extrinsic_call]
    refill_task(RawOrigin::Signed(owner), task_id, amount);
  }

  #[benchmark]
  fn refill_task_asset() {
    let owner = endowed_caller::<T>("owner");
    let task_id = submit_task::<T>(&owner);
    let amount: BalanceOf<T> = 1_000u32.into();

    #[extrinsic_call]
    refill_task_asset(RawOrigin::Signed(owner), task_id, T::NativeAssetId::get(), amount);
  }

  #[benchmark]
  fn proxy_call() {
    let one: BlockNumberFor<T> = 1u32.into();
    polkadot_sdk::frame_system::Pallet::<T>::set_block_number(one);
    let owner = endowed_caller::<T>("owner");
    let _task_id = submit_task::<T>(&owner);
    let caller = endowed_caller::<T>("agent");
    force_active_agent::<T>(&caller, 2);
    let two: BlockNumberFor<T> = 2u32.into();
    polkadot_sdk::frame_system::Pallet::<T>::set_block_number(two);

    #[extrinsic_call]
    proxy_call(RawOrigin::Signed(caller), None);
  }

  #[benchmark]
  fn tick() {
    let stale = endowed_caller::<T>("stale");
    force_active_agent::<T>(&stale, 0);
    let when: BlockNumberFor<T> = T::EjectThreshold::get().saturating_add(2).saturated_into();
    polkadot_sdk::frame_system::Pallet::<T>::set_block_number(when);
    let caller: T::AccountId = account("keeper", 0, 0);

    #[extrinsic_call]
    tick(RawOrigin::Signed(caller));
  }

  #[benchmark]
  fn set_paused() {
    #[extrinsic_call]
    set_paused(RawOrigin::Root, true);
  }

  #[benchmark]
  fn set_balancer_mode() {
    #[extrinsic_call]
    set_balancer_mode(RawOrigin::Root, BalancerMode::Equalizer);
  }

  #[cfg(test)]
  use crate::mock::{Test, new_test_ext};
  #[cfg(test)]
  impl_benchmark_test_suite!(Pallet, new_test_ext(), Test);
}
