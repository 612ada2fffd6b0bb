//! Slot scheduling calculus.
//!
//! Pure computation of the next execution slot for a task: block-indexed
//! intervals land in the block dimension, cron intervals in the time
//! dimension. The pallet owns the slot storage; everything here is
//! side-effect free so the arithmetic can be tested exhaustively.

use codec::{Decode, DecodeWithMemTracking, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

/// The two slot dimensions. Block-counted intervals schedule into block
/// slots, cron intervals into time slots (unix milliseconds).
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  MaxEncodedLen,
  Ord,
  PartialEq,
  PartialOrd,
  TypeInfo,
  Serialize,
  Deserialize,
)]
pub enum SlotKind {
  Block,
  Time,
}

/// Recurrence rule for a task.
///
/// `Once` runs a single time. `Immediate` runs every slot until its
/// boundary or funding runs out. `Block(n)` runs on every block height
/// that is a multiple of `n`. `Cron` runs on a six-field schedule
/// (sec min hour day-of-month month day-of-week).
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
pub enum Interval {
  Once,
  Immediate,
  Block(u64),
  Cron(CronSchedule),
}

impl Interval {
  /// Everything except `Once` reschedules after execution.
  pub fn is_recurring(&self) -> bool {
    !matches!(self, Interval::Once)
  }

  pub fn slot_kind(&self) -> SlotKind {
    match self {
      Interval::Cron(_) => SlotKind::Time,
      _ => SlotKind::Block,
    }
  }
}

/// Unvalidated interval as submitted by a task owner. The cron expression
/// arrives as raw text and is parsed into a [`CronSchedule`] during task
/// creation.
#[derive(
  Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, MaxEncodedLen, PartialEq, TypeInfo,
)]
pub enum IntervalSpec<S> {
  Once,
  Immediate,
  Block(u64),
  Cron(S),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntervalError {
  /// `Block(0)` can never produce a slot.
  ZeroPeriod,
  /// The cron expression failed to parse.
  MalformedCron(CronParseError),
}

impl<S: AsRef<[u8]>> IntervalSpec<S> {
  /// Validate and resolve into a storable [`Interval`].
  pub fn resolve(&self) -> Result<Interval, IntervalError> {
    match self {
      IntervalSpec::Once => Ok(Interval::Once),
      IntervalSpec::Immediate => Ok(Interval::Immediate),
      IntervalSpec::Block(0) => Err(IntervalError::ZeroPeriod),
      IntervalSpec::Block(n) => Ok(Interval::Block(*n)),
      IntervalSpec::Cron(expr) => {
        let text = core::str::from_utf8(expr.as_ref())
          .map_err(|_| IntervalError::MalformedCron(CronParseError::Syntax))?;
        let schedule = CronSchedule::parse(text).map_err(IntervalError::MalformedCron)?;
        Ok(Interval::Cron(schedule))
      }
    }
  }
}

/// Optional execution window. The dimension must agree with the interval:
/// cron tasks bound by timestamps (unix ms), everything else by heights.
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
pub enum Boundary {
  Height { start: Option<u64>, end: Option<u64> },
  Time { start: Option<u64>, end: Option<u64> },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BoundaryError {
  /// Height boundary on a cron task or time boundary on a block task.
  WrongDimension,
  /// The window closes before it opens (relative to now when `start` is
  /// omitted).
  EndNotAfterStart,
}

impl Boundary {
  /// The open window in the interval's dimension.
  pub fn default_for(interval: &Interval) -> Self {
    match interval.slot_kind() {
      SlotKind::Block => Boundary::Height {
        start: None,
        end: None,
      },
      SlotKind::Time => Boundary::Time {
        start: None,
        end: None,
      },
    }
  }

  /// Check dimension agreement and window sanity against the current
  /// chain position. `None` resolves to the open window.
  pub fn validate(
    interval: &Interval,
    boundary: Option<Boundary>,
    height: u64,
    now_ms: u64,
  ) -> Result<Boundary, BoundaryError> {
    let boundary = match boundary {
      None => return Ok(Self::default_for(interval)),
      Some(b) => b,
    };
    match (interval.slot_kind(), boundary) {
      (SlotKind::Time, Boundary::Time { start, end }) => {
        let opens = start.unwrap_or(now_ms);
        if end.is_some_and(|e| e <= opens) {
          Err(BoundaryError::EndNotAfterStart)
        } else {
          Ok(boundary)
        }
      }
      (SlotKind::Block, Boundary::Height { start, end }) => {
        let opens = start.unwrap_or(height);
        if end.is_some_and(|e| e <= opens) {
          Err(BoundaryError::EndNotAfterStart)
        } else {
          Ok(boundary)
        }
      }
      _ => Err(BoundaryError::WrongDimension),
    }
  }
}

fn bucket(value: u64, granularity: u64) -> u64 {
  if granularity <= 1 {
    value
  } else {
    value - value % granularity
  }
}

fn round_up_to(value: u64, n: u64) -> u64 {
  value.saturating_add(n.saturating_sub(value % n) % n)
}

/// Compute the next slot for a task, or `None` when the boundary end is
/// already behind the chain (the task can never run again).
///
/// Block dimension: `Once`/`Immediate` target the next block, `Block(n)`
/// the next multiple of `n`; a future boundary start raises the target
/// (rounded up to the period for `Block(n)`), a boundary end clamps it
/// down to the last in-window slot. Time dimension: the next cron match
/// strictly after now (or after the boundary start), clamped to the
/// boundary end. Slot ids are coarsened by the dimension's granularity.
pub fn next_slot(
  interval: &Interval,
  boundary: &Boundary,
  height: u64,
  now_ms: u64,
  granularity_blocks: u64,
  granularity_ms: u64,
) -> Option<(SlotKind, u64)> {
  match interval {
    Interval::Once | Interval::Immediate => {
      let (start, end) = height_window(boundary);
      let mut candidate = height.saturating_add(1);
      if let Some(start) = start {
        if start > candidate {
          candidate = start;
        }
      }
      if let Some(end) = end {
        if end < height {
          return None;
        }
        candidate = candidate.min(end);
      }
      Some((SlotKind::Block, bucket(candidate, granularity_blocks)))
    }
    Interval::Block(n) => {
      if *n == 0 {
        return None;
      }
      let (start, end) = height_window(boundary);
      let mut candidate = height.saturating_sub(height % n).saturating_add(*n);
      if let Some(start) = start {
        if start > candidate {
          candidate = round_up_to(start, *n);
        }
      }
      if let Some(end) = end {
        if end < height {
          return None;
        }
        let last_in_window = end - end % n;
        candidate = candidate.min(last_in_window);
        if start.is_some_and(|s| candidate < s) {
          // window contains no multiple of the period
          return None;
        }
      }
      Some((SlotKind::Block, bucket(candidate, granularity_blocks)))
    }
    Interval::Cron(schedule) => {
      let (start, end) = time_window(boundary);
      let now_s = now_ms / 1_000;
      let base_s = match start {
        Some(start_ms) if start_ms / 1_000 > now_s => (start_ms / 1_000).saturating_sub(1),
        _ => now_s,
      };
      let next_s = schedule.next_after(base_s)?;
      let mut candidate_ms = next_s.saturating_mul(1_000);
      if let Some(end) = end {
        if end < now_ms {
          return None;
        }
        candidate_ms = candidate_ms.min(end);
      }
      Some((SlotKind::Time, bucket(candidate_ms, granularity_ms)))
    }
  }
}

fn height_window(boundary: &Boundary) -> (Option<u64>, Option<u64>) {
  match boundary {
    Boundary::Height { start, end } => (*start, *end),
    // wrong-dimension boundaries are rejected at task creation
    Boundary::Time { .. } => (None, None),
  }
}

fn time_window(boundary: &Boundary) -> (Option<u64>, Option<u64>) {
  match boundary {
    Boundary::Time { start, end } => (*start, *end),
    Boundary::Height { .. } => (None, None),
  }
}

/// A parsed six-field cron schedule (sec min hour day-of-month month
/// day-of-week), each field a bitmask of admissible values. Day-of-week
/// uses 0 = Sunday. A timestamp matches when every field's bit is set.
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
pub struct CronSchedule {
  seconds: u64,
  minutes: u64,
  hours: u32,
  days_of_month: u32,
  months: u16,
  days_of_week: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CronParseError {
  /// Not exactly six whitespace-separated fields.
  FieldCount,
  /// A field is not `*`, a number, a range, a list, or a step thereof.
  Syntax,
  /// A value is outside its field's domain.
  OutOfRange,
  /// A `/step` of zero.
  ZeroStep,
}

// how far next_after searches before giving up (a leap cycle)
const SEARCH_HORIZON_SECS: u64 = 4 * 366 * 86_400;

impl CronSchedule {
  /// Parse a six-field cron expression. Fields accept `*`, single
  /// values, `a-b` ranges, `,` lists, and `/step` on any of those.
  pub fn parse(expr: &str) -> Result<Self, CronParseError> {
    let mut fields = expr.split_whitespace();
    let seconds = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 0, 59)?;
    let minutes = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 0, 59)?;
    let hours = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 0, 23)? as u32;
    let days_of_month = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 1, 31)? as u32;
    let months = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 1, 12)? as u16;
    let days_of_week = parse_field(fields.next().ok_or(CronParseError::FieldCount)?, 0, 6)? as u8;
    if fields.next().is_some() {
      return Err(CronParseError::FieldCount);
    }
    Ok(CronSchedule {
      seconds,
      minutes,
      hours,
      days_of_month,
      months,
      days_of_week,
    })
  }

  /// A decoded schedule is structurally valid only if every field admits
  /// at least one value.
  pub fn is_well_formed(&self) -> bool {
    self.seconds != 0
      && self.minutes != 0
      && self.hours != 0
      && self.days_of_month != 0
      && self.months != 0
      && self.days_of_week != 0
  }

  /// The first matching unix second strictly after `after`, or `None`
  /// when no match exists within the search horizon (e.g. February 31).
  pub fn next_after(&self, after: u64) -> Option<u64> {
    if !self.is_well_formed() {
      return None;
    }
    let limit = after.saturating_add(SEARCH_HORIZON_SECS);
    let mut t = after.saturating_add(1);
    while t <= limit {
      let days = t / 86_400;
      let (year, month, day) = civil_from_days(days as i64);
      if self.months >> month & 1 == 0 {
        // skip to the first second of the next month
        let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        t = days_from_civil(ny, nm, 1) as u64 * 86_400;
        continue;
      }
      let dow = ((days + 4) % 7) as u8; // 1970-01-01 was a Thursday
      if self.days_of_month >> day & 1 == 0 || self.days_of_week >> dow & 1 == 0 {
        t = (days + 1) * 86_400;
        continue;
      }
      let second_of_day = t % 86_400;
      let hour = (second_of_day / 3_600) as u32;
      let hour = match next_set_bit(self.hours as u64, hour, 23) {
        Some(h) if h == hour => h,
        Some(h) => {
          t = days * 86_400 + u64::from(h) * 3_600;
          continue;
        }
        None => {
          t = (days + 1) * 86_400;
          continue;
        }
      };
      let minute = (second_of_day % 3_600 / 60) as u32;
      let minute = match next_set_bit(self.minutes, minute, 59) {
        Some(m) if m == minute => m,
        Some(m) => {
          t = days * 86_400 + u64::from(hour) * 3_600 + u64::from(m) * 60;
          continue;
        }
        None => {
          t = days * 86_400 + u64::from(hour + 1) * 3_600;
          continue;
        }
      };
      let second = (second_of_day % 60) as u32;
      match next_set_bit(self.seconds, second, 59) {
        Some(s) => {
          return Some(days * 86_400 + u64::from(hour) * 3_600 + u64::from(minute) * 60 + u64::from(s));
        }
        None => {
          t = days * 86_400 + u64::from(hour) * 3_600 + u64::from(minute + 1) * 60;
          continue;
        }
      }
    }
    None
  }
}

fn next_set_bit(mask: u64, from: u32, max: u32) -> Option<u32> {
  (from..=max).find(|i| mask >> i & 1 == 1)
}

fn parse_field(spec: &str, min: u32, max: u32) -> Result<u64, CronParseError> {
  let mut mask = 0u64;
  for part in spec.split(',') {
    let (range, step) = match part.split_once('/') {
      Some((range, step)) => {
        let step: u32 = step.parse().map_err(|_| CronParseError::Syntax)?;
        if step == 0 {
          return Err(CronParseError::ZeroStep);
        }
        (range, step)
      }
      None => (part, 1),
    };
    let (lo, hi) = if range == "*" {
      (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
      let a: u32 = a.parse().map_err(|_| CronParseError::Syntax)?;
      let b: u32 = b.parse().map_err(|_| CronParseError::Syntax)?;
      (a, b)
    } else {
      let v: u32 = range.parse().map_err(|_| CronParseError::Syntax)?;
      // `a/step` opens the range to the field maximum
      if part.contains('/') { (v, max) } else { (v, v) }
    };
    if lo < min || hi > max || lo > hi {
      return Err(CronParseError::OutOfRange);
    }
    let mut v = lo;
    while v <= hi {
      mask |= 1 << v;
      v += step;
    }
  }
  if mask == 0 {
    return Err(CronParseError::Syntax);
  }
  Ok(mask)
}

// Civil-calendar conversions (proleptic Gregorian), days since 1970-01-01.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
  let z = z + 719_468;
  let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
  let doe = z - era * 146_097;
  let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
  let year = yoe + era * 400;
  let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
  let mp = (5 * doy + 2) / 153;
  let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
  let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
  (if month <= 2 { year + 1 } else { year }, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
  let y = if month <= 2 { year - 1 } else { year };
  let era = if y >= 0 { y } else { y - 399 } / 400;
  let yoe = y - era * 400;
  let mp = i64::from(if month > 2 { month - 3 } else { month + 9 });
  let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
  let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
  era * 146_097 + doe - 719_468
}
