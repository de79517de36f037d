//! Global and per-target rate-limit state shared by every join attempt.
//!
//! [`ThrottleTracker`] is the single owner of throttle state. Each scope (global, or one
//! [`TargetId`]) is either open or blocked until an instant; a read at or after that instant
//! reports the scope open and drops the entry, so no timer is needed. Marks never shorten an
//! active block. All reads and writes go through one mutex, so a mark issued by one join attempt
//! is visible to every attempt that checks afterwards.

// crates.io
use time::PrimitiveDateTime;
// self
use crate::{_prelude::*, auth::TargetId};

/// Longest cool-down the tracker honors; provider hints beyond it are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::hours(24);

/// Converts a provider cool-down in seconds into a [`Duration`] capped at [`MAX_RETRY_AFTER`].
///
/// Negative or non-finite values yield `None`.
pub fn retry_after_from_secs(secs: f64) -> Option<Duration> {
	if !secs.is_finite() || secs < 0.0 {
		return None;
	}

	Some(Duration::checked_seconds_f64(secs).map_or(MAX_RETRY_AFTER, |d| d.min(MAX_RETRY_AFTER)))
}

/// Scope a rate limit applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleScope {
	/// Every target is blocked.
	Global,
	/// Only joins into this target are blocked.
	Target(TargetId),
}
impl Display for ThrottleScope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Global => f.write_str("global"),
			Self::Target(target) => write!(f, "target {target}"),
		}
	}
}

/// Active block returned by [`ThrottleTracker::active_block`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleBlock {
	/// Blocked scope.
	pub scope: ThrottleScope,
	/// Instant the block clears.
	pub until: OffsetDateTime,
}
impl From<ThrottleBlock> for Error {
	fn from(block: ThrottleBlock) -> Self {
		Error::Throttled { scope: block.scope, retry_at: block.until }
	}
}

#[derive(Debug, Default)]
struct ThrottleState {
	global_until: Option<OffsetDateTime>,
	targets: HashMap<TargetId, OffsetDateTime>,
}
impl ThrottleState {
	fn global_at(&mut self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		match self.global_until {
			Some(until) if now < until => Some(until),
			Some(_) => {
				self.global_until = None;

				None
			},
			None => None,
		}
	}

	fn target_at(&mut self, target: &TargetId, now: OffsetDateTime) -> Option<OffsetDateTime> {
		let until = *self.targets.get(target)?;

		if now < until {
			Some(until)
		} else {
			self.targets.remove(target);

			None
		}
	}
}

/// Single source of truth for "is it safe to attempt a join right now".
#[derive(Debug, Default)]
pub struct ThrottleTracker {
	state: Mutex<ThrottleState>,
}
impl ThrottleTracker {
	/// Creates a tracker with every scope open.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `true` while a global block is active.
	pub fn is_globally_blocked(&self) -> bool {
		self.is_globally_blocked_at(OffsetDateTime::now_utc())
	}

	/// Same as [`is_globally_blocked`](Self::is_globally_blocked) at an explicit instant.
	pub fn is_globally_blocked_at(&self, now: OffsetDateTime) -> bool {
		self.state.lock().global_at(now).is_some()
	}

	/// Returns `true` while `target` has its own active block (global blocks are not included).
	pub fn is_target_blocked(&self, target: &TargetId) -> bool {
		self.is_target_blocked_at(target, OffsetDateTime::now_utc())
	}

	/// Same as [`is_target_blocked`](Self::is_target_blocked) at an explicit instant.
	pub fn is_target_blocked_at(&self, target: &TargetId, now: OffsetDateTime) -> bool {
		self.state.lock().target_at(target, now).is_some()
	}

	/// Returns the block that currently prevents joins into `target`, global first.
	///
	/// Both scopes are checked under one lock acquisition.
	pub fn active_block(&self, target: &TargetId) -> Option<ThrottleBlock> {
		self.active_block_at(target, OffsetDateTime::now_utc())
	}

	/// Same as [`active_block`](Self::active_block) at an explicit instant.
	pub fn active_block_at(&self, target: &TargetId, now: OffsetDateTime) -> Option<ThrottleBlock> {
		let mut state = self.state.lock();

		if let Some(until) = state.global_at(now) {
			return Some(ThrottleBlock { scope: ThrottleScope::Global, until });
		}

		state
			.target_at(target, now)
			.map(|until| ThrottleBlock { scope: ThrottleScope::Target(target.clone()), until })
	}

	/// Blocks every target for `duration`; returns the effective clearance instant.
	pub fn mark_global_blocked(&self, duration: Duration) -> OffsetDateTime {
		self.mark_at(ThrottleScope::Global, duration, OffsetDateTime::now_utc())
	}

	/// Blocks `target` for `duration`; returns the effective clearance instant.
	pub fn mark_target_blocked(&self, target: &TargetId, duration: Duration) -> OffsetDateTime {
		self.mark_at(ThrottleScope::Target(target.clone()), duration, OffsetDateTime::now_utc())
	}

	/// Blocks `scope` for `duration` starting at `now`.
	///
	/// Idempotent: when the scope is already blocked past `now + duration` the later instant is
	/// kept. Durations are clamped to `0..=MAX_RETRY_AFTER`; an instant past the calendar range
	/// saturates to the latest representable one.
	pub fn mark_at(
		&self,
		scope: ThrottleScope,
		duration: Duration,
		now: OffsetDateTime,
	) -> OffsetDateTime {
		let requested = now
			.checked_add(duration.clamp(Duration::ZERO, MAX_RETRY_AFTER))
			.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());
		let mut state = self.state.lock();
		let slot = match scope {
			ThrottleScope::Global => state.global_until.get_or_insert(requested),
			ThrottleScope::Target(target) => state.targets.entry(target).or_insert(requested),
		};

		if requested > *slot {
			*slot = requested;
		}

		*slot
	}
}
