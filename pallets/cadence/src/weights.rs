#![cfg_attr(rustfmt, rustfmt_skip)]
#![allow(unused_parens)]
#![allow(unused_imports)]
#![allow(missing_docs)]

use polkadot_sdk::frame_support::{traits::Get, weights::{Weight, constants::RocksDbWeight}};
use core::marker::PhantomData;

pub trait WeightInfo {
	fn register_agent() -> Weight;
	fn update_agent() -> Weight;
	fn check_in_agent() -> Weight;
	fn unregister_agent() -> Weight;
	fn withdraw_reward() -> Weight;
	fn approve_agent() -> Weight;
	fn create_task() -> Weight;
	fn remove_task() -> Weight;
	fn refill_task() -> Weight;
	fn refill_task_asset() -> Weight;
	fn proxy_call() -> Weight;
	fn tick() -> Weight;
	fn set_paused() -> Weight;
	fn set_balancer_mode() -> Weight;
}

pub struct SubstrateWeight<T>(PhantomData<T>);
impl<T: polkadot_sdk::frame_system::Config> WeightInfo for SubstrateWeight<T> {
	fn register_agent() -> Weight {
		Weight::from_parts(30_000_000, 3000)
			.saturating_add(T::DbWeight::get().reads(4))
			.saturating_add(T::DbWeight::get().writes(2))
	}
	fn update_agent() -> Weight {
		Weight::from_parts(15_000_000, 2000)
			.saturating_add(T::DbWeight::get().reads(1))
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn check_in_agent() -> Weight {
		Weight::from_parts(25_000_000, 3000)
			.saturating_add(T::DbWeight::get().reads(3))
			.saturating_add(T::DbWeight::get().writes(3))
	}
	fn unregister_agent() -> Weight {
		Weight::from_parts(35_000_000, 3000)
			.saturating_add(T::DbWeight::get().reads(4))
			.saturating_add(T::DbWeight::get().writes(4))
	}
	fn withdraw_reward() -> Weight {
		Weight::from_parts(25_000_000, 2000)
			.saturating_add(T::DbWeight::get().reads(2))
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn approve_agent() -> Weight {
		Weight::from_parts(10_000_000, 1000)
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn create_task() -> Weight {
		Weight::from_parts(60_000_000, 5000)
			.saturating_add(T::DbWeight::get().reads(5))
			.saturating_add(T::DbWeight::get().writes(5))
	}
	fn remove_task() -> Weight {
		Weight::from_parts(45_000_000, 4000)
			.saturating_add(T::DbWeight::get().reads(3))
			.saturating_add(T::DbWeight::get().writes(4))
	}
	fn refill_task() -> Weight {
		Weight::from_parts(25_000_000, 2000)
			.saturating_add(T::DbWeight::get().reads(2))
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn refill_task_asset() -> Weight {
		Weight::from_parts(25_000_000, 2000)
			.saturating_add(T::DbWeight::get().reads(2))
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn proxy_call() -> Weight {
		Weight::from_parts(150_000_000, 8000)
			.saturating_add(T::DbWeight::get().reads(12))
			.saturating_add(T::DbWeight::get().writes(10))
	}
	fn tick() -> Weight {
		Weight::from_parts(80_000_000, 6000)
			.saturating_add(T::DbWeight::get().reads(8))
			.saturating_add(T::DbWeight::get().writes(6))
	}
	fn set_paused() -> Weight {
		Weight::from_parts(8_000_000, 1000)
			.saturating_add(T::DbWeight::get().writes(1))
	}
	fn set_balancer_mode() -> Weight {
		Weight::from_parts(8_000_000, 1000)
			.saturating_add(T::DbWeight::get().writes(1))
	}
}

impl WeightInfo for () {
	fn register_agent() -> Weight {
		Weight::from_parts(30_000_000, 3000)
	}
	fn update_agent() -> Weight {
		Weight::from_parts(15_000_000, 2000)
	}
	fn check_in_agent() -> Weight {
		Weight::from_parts(25_000_000, 3000)
	}
	fn unregister_agent() -> Weight {
		Weight::from_parts(35_000_000, 3000)
	}
	fn withdraw_reward() -> Weight {
		Weight::from_parts(25_000_000, 2000)
	}
	fn approve_agent() -> Weight {
		Weight::from_parts(10_000_000, 1000)
	}
	fn create_task() -> Weight {
		Weight::from_parts(60_000_000, 5000)
	}
	fn remove_task() -> Weight {
		Weight::from_parts(45_000_000, 4000)
	}
	fn refill_task() -> Weight {
		Weight::from_parts(25_000_000, 2000)
	}
	fn refill_task_asset() -> Weight {
		Weight::from_parts(25_000_000, 2000)
	}
	fn proxy_call() -> Weight {
		Weight::from_parts(150_000_000, 8000)
	}
	fn tick() -> Weight {
		Weight::from_parts(80_000_000, 6000)
	}
	fn set_paused() -> Weight {
		Weight::from_parts(8_000_000, 1000)
	}
	fn set_balancer_mode() -> Weight {
		Weight::from_parts(8_000_000, 1000)
	}
}
