//! Claim partitioning across the active agent set.
//!
//! Pure policy: given an activation-ordered snapshot of the active set and
//! the number of tasks due this round, decide how many claims each agent
//! is entitled to. The pallet snapshots state, tracks per-agent claims,
//! and enforces the result under its transaction boundary.

use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;

/// Which partitioning policy the network runs.
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
pub enum BalancerMode {
  /// Agents claim up to the per-agent quota strictly in the order they
  /// became active; leftover tasks form an overflow bucket claimable by
  /// any agent first-come.
  #[default]
  ActivationOrder,
  /// Each task is offered to the agent with the fewest executed tasks,
  /// spreading lifetime work evenly. Ties go to the earliest activation.
  Equalizer,
}

/// One active agent's standing, in activation order. `executed` must be
/// the lifetime count as of the start of the round — the partition is
/// computed over the round's full task set, so mid-round increments must
/// not feed back into it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AgentLoad {
  pub executed: u64,
}

/// What one agent may claim over the whole round.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Allowance {
  /// Regular-capacity claims this agent is entitled to in total.
  pub tasks: u32,
  /// Size of the overflow bucket open to every agent once its regular
  /// capacity is used up (`ActivationOrder` only).
  pub extra: u32,
}

/// Partition `due_tasks` across `agents` and report the share of the
/// agent at index `who`. `due_tasks` counts the whole round, including
/// claims already made, so the partition is stable as the round drains.
pub fn agent_allowance(
  mode: BalancerMode,
  agents: &[AgentLoad],
  due_tasks: u32,
  min_tasks_per_agent: u32,
  who: usize,
) -> Allowance {
  if agents.is_empty() || who >= agents.len() || due_tasks == 0 {
    return Allowance::default();
  }
  match mode {
    BalancerMode::ActivationOrder => {
      let mut remaining = due_tasks;
      let mut mine = 0u32;
      for index in 0..agents.len() {
        let share = min_tasks_per_agent.min(remaining);
        if index == who {
          mine = share;
        }
        remaining -= share;
        if remaining == 0 {
          break;
        }
      }
      Allowance {
        tasks: mine,
        extra: remaining,
      }
    }
    BalancerMode::Equalizer => {
      // Offer tasks one at a time to the least-loaded agent; a strict
      // minimum scan keeps ties on the earliest activation index.
      let mut loads: alloc::vec::Vec<u64> =
        agents.iter().map(|agent| agent.executed).collect();
      let mut assigned = alloc::vec![0u32; agents.len()];
      for _ in 0..due_tasks {
        let mut best = 0usize;
        for index in 1..loads.len() {
          if loads[index] < loads[best] {
            best = index;
          }
        }
        loads[best] = loads[best].saturating_add(1);
        assigned[best] = assigned[best].saturating_add(1);
      }
      Allowance {
        tasks: assigned[who],
        extra: 0,
      }
    }
  }
}
