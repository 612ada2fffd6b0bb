//! Task precondition rules.
//!
//! A rule gates task execution on external chain state: balances, token
//! ownership, governance proposal status, or an arbitrary query against
//! another contract. Evaluation is pure over a [`StateOracle`]; the
//! runtime decides how those lookups are actually answered. A failed
//! lookup is `Indeterminate`, which callers must treat as `Fail` — a task
//! never executes on ambiguous state.

use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

/// Ordering comparator used by balance and raw-query rules.
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
  Serialize,
  Deserialize,
)]
pub enum Comparator {
  Gt,
  Gte,
  Lt,
  Lte,
  Eq,
}

impl Comparator {
  pub fn compare<V: PartialOrd>(&self, left: &V, right: &V) -> bool {
    match self {
      Comparator::Gt => left > right,
      Comparator::Gte => left >= right,
      Comparator::Lt => left < right,
      Comparator::Lte => left <= right,
      Comparator::Eq => left == right,
    }
  }
}

/// Lifecycle states an external governance proposal can be matched on.
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
  Serialize,
  Deserialize,
)]
pub enum ProposalStatus {
  Open,
  Passed,
  Rejected,
  Executed,
}

/// Outcome of evaluating one rule or a rule set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleVerdict {
  Pass,
  Fail,
  /// An external query could not be answered. Must be treated as `Fail`.
  Indeterminate,
}

impl RuleVerdict {
  pub fn is_pass(&self) -> bool {
    matches!(self, RuleVerdict::Pass)
  }
}

/// The oracle could not be reached or refused the query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OracleError;

/// Precondition variants. All rules on a task must pass (logical AND);
/// there is no OR combinator.
#[derive(
  Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
)]
pub enum Rule<AccountId, AssetId, Balance, Data> {
  /// `address`'s balance in `asset` compared against `amount`.
  BalanceThreshold {
    address: AccountId,
    asset: AssetId,
    comparator: Comparator,
    amount: Balance,
  },
  /// `owner` holds `token` of `collection`.
  OwnerOfToken {
    collection: AccountId,
    token: Data,
    owner: AccountId,
  },
  /// Proposal `proposal_id` of `dao` is in `status`.
  ProposalStatusIs {
    dao: AccountId,
    proposal_id: u64,
    status: ProposalStatus,
  },
  /// Raw query against `contract`; the response bytes are compared with
  /// `expected` under `comparator` (lexicographic ordering).
  QueryResult {
    contract: AccountId,
    request: Data,
    comparator: Comparator,
    expected: Data,
  },
}

/// External chain state as seen by the rule evaluator. Implemented by the
/// runtime; every method may fail with [`OracleError`], which evaluation
/// maps to [`RuleVerdict::Indeterminate`].
pub trait StateOracle<AccountId, AssetId, Balance> {
  fn balance_of(who: &AccountId, asset: &AssetId) -> Result<Balance, OracleError>;

  fn token_owner(collection: &AccountId, token: &[u8]) -> Result<Option<AccountId>, OracleError>;

  fn proposal_status(dao: &AccountId, proposal_id: u64) -> Result<ProposalStatus, OracleError>;

  fn query_raw(contract: &AccountId, request: &[u8]) -> Result<Vec<u8>, OracleError>;
}

/// Oracle for configurations without external queries: everything is
/// unanswerable, so every ruled task evaluates `Indeterminate`.
impl<AccountId, AssetId, Balance> StateOracle<AccountId, AssetId, Balance> for () {
  fn balance_of(_: &AccountId, _: &AssetId) -> Result<Balance, OracleError> {
    Err(OracleError)
  }

  fn token_owner(_: &AccountId, _: &[u8]) -> Result<Option<AccountId>, OracleError> {
    Err(OracleError)
  }

  fn proposal_status(_: &AccountId, _: u64) -> Result<ProposalStatus, OracleError> {
    Err(OracleError)
  }

  fn query_raw(_: &AccountId, _: &[u8]) -> Result<Vec<u8>, OracleError> {
    Err(OracleError)
  }
}

pub fn evaluate_rule<O, AccountId, AssetId, Balance, Data>(
  rule: &Rule<AccountId, AssetId, Balance, Data>,
) -> RuleVerdict
where
  O: StateOracle<AccountId, AssetId, Balance>,
  AccountId: PartialEq,
  Balance: PartialOrd,
  Data: AsRef<[u8]>,
{
  let pass = match rule {
    Rule::BalanceThreshold {
      address,
      asset,
      comparator,
      amount,
    } => match O::balance_of(address, asset) {
      Ok(balance) => comparator.compare(&balance, amount),
      Err(OracleError) => return RuleVerdict::Indeterminate,
    },
    Rule::OwnerOfToken {
      collection,
      token,
      owner,
    } => match O::token_owner(collection, token.as_ref()) {
      Ok(Some(holder)) => holder == *owner,
      Ok(None) => false,
      Err(OracleError) => return RuleVerdict::Indeterminate,
    },
    Rule::ProposalStatusIs {
      dao,
      proposal_id,
      status,
    } => match O::proposal_status(dao, *proposal_id) {
      Ok(actual) => actual == *status,
      Err(OracleError) => return RuleVerdict::Indeterminate,
    },
    Rule::QueryResult {
      contract,
      request,
      comparator,
      expected,
    } => match O::query_raw(contract, request.as_ref()) {
      Ok(response) => comparator.compare(&response.as_slice(), &expected.as_ref()),
      Err(OracleError) => return RuleVerdict::Indeterminate,
    },
  };
  if pass { RuleVerdict::Pass } else { RuleVerdict::Fail }
}

/// AND-combine a rule set: short-circuits on the first non-passing rule,
/// returning its verdict and index. An empty set passes.
pub fn evaluate_all<O, AccountId, AssetId, Balance, Data>(
  rules: &[Rule<AccountId, AssetId, Balance, Data>],
) -> (RuleVerdict, Option<u32>)
where
  O: StateOracle<AccountId, AssetId, Balance>,
  AccountId: PartialEq,
  Balance: PartialOrd,
  Data: AsRef<[u8]>,
{
  for (index, rule) in rules.iter().enumerate() {
    let verdict = evaluate_rule::<O, _, _, _, _>(rule);
    if !verdict.is_pass() {
      return (verdict, Some(index as u32));
    }
  }
  (RuleVerdict::Pass, None)
}
