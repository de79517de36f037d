//! Batch join orchestration under the throttle contract.
//!
//! A batch collapses duplicate users, refuses to start while the target (or everything) is
//! rate limited, then runs one join per user concurrently. Individual failures never abort the
//! batch; they are reported in input order.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	auth::{TargetId, UserId},
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::LinkStore,
};

/// Why one user of a batch was not joined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
	/// The user already belonged to the target.
	AlreadyMember,
	/// No stored or usable credential pair.
	Unauthorized,
	/// A rate limit blocked the join.
	RateLimited,
	/// Any other provider or local failure.
	ProviderError,
}
impl FailureReason {
	/// Stable kebab-case label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AlreadyMember => "already-member",
			Self::Unauthorized => "unauthorized",
			Self::RateLimited => "rate-limited",
			Self::ProviderError => "provider-error",
		}
	}
}
impl Display for FailureReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One failed user in a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinFailure {
	/// User that was not joined.
	pub user: UserId,
	/// Why.
	pub reason: FailureReason,
}

/// Accounting for one batch; produced fresh per call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJoinResult {
	/// Users successfully joined.
	pub success_count: usize,
	/// Failed users, in input order.
	pub failures: Vec<JoinFailure>,
}
impl BatchJoinResult {
	/// Users the batch accounted for (successes plus failures).
	pub fn attempted(&self) -> usize {
		self.success_count + self.failures.len()
	}

	/// Failed users with the given reason, in input order.
	pub fn failed_with(&self, reason: FailureReason) -> impl Iterator<Item = &UserId> {
		self.failures.iter().filter(move |failure| failure.reason == reason).map(|failure| &failure.user)
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Joins every user in `users` into `target`.
	///
	/// Duplicates are collapsed keeping the first occurrence; empty input returns an empty
	/// result without any provider call. While a global or target block is active the whole
	/// batch is refused with [`Error::Throttled`] before any join is attempted. Otherwise one
	/// join runs per user, concurrently (bounded by `settings.max_concurrent_joins` when set),
	/// and every per-user failure lands in [`BatchJoinResult::failures`].
	pub async fn join_many<I>(&self, target: &TargetId, users: I) -> Result<BatchJoinResult>
	where
		I: IntoIterator<Item = UserId>,
	{
		const KIND: FlowKind = FlowKind::Batch;

		let users = dedup_in_order(users);

		if users.is_empty() {
			return Ok(BatchJoinResult::default());
		}

		let span = FlowSpan::new(KIND, "join_many");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run_batch(target, users)).await;

		common::record_result(KIND, &result);

		result
	}

	/// Validates raw identifiers, then runs [`join_many`](Self::join_many).
	///
	/// A blank or malformed target or user id fails with [`Error::InvalidInput`] before any
	/// throttle check or provider call.
	pub async fn join_many_raw<I, S>(&self, target: &str, users: I) -> Result<BatchJoinResult>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let target = TargetId::new(target)?;
		let users = users.into_iter().map(UserId::new).collect::<Result<Vec<_>, _>>()?;

		self.join_many(&target, users).await
	}

	/// Joins every user `owner` has linked into `target`.
	pub async fn pull_linked(
		&self,
		target: &TargetId,
		owner: &UserId,
		links: &dyn LinkStore,
	) -> Result<BatchJoinResult> {
		let users = links.linked_users(owner).await?;

		self.join_many(target, users).await
	}

	async fn run_batch(&self, target: &TargetId, users: Vec<UserId>) -> Result<BatchJoinResult> {
		if let Some(block) = self.throttle.active_block(target) {
			return Err(block.into());
		}

		let limiter = self.settings.max_concurrent_joins.map(|limit| Semaphore::new(limit.get()));
		let outcomes = future::join_all(users.iter().map(|user| {
			let limiter = limiter.as_ref();

			async move {
				let _permit = match limiter {
					Some(limiter) => Some(limiter.acquire().await),
					None => None,
				};

				self.join_target_outcome(target, user).await
			}
		}))
		.await;
		let mut result = BatchJoinResult::default();

		for (user, outcome) in users.into_iter().zip(outcomes) {
			match outcome.failure_reason() {
				None => result.success_count += 1,
				Some(reason) => result.failures.push(JoinFailure { user, reason }),
			}
		}

		obs::record_batch_summary(target, result.attempted(), result.success_count, result.failures.len());

		Ok(result)
	}
}

fn dedup_in_order<I>(users: I) -> Vec<UserId>
where
	I: IntoIterator<Item = UserId>,
{
	let mut seen = HashSet::new();

	users.into_iter().filter(|user| seen.insert(user.clone())).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn user(id: &str) -> UserId {
		UserId::new(id).expect("User fixture should be valid.")
	}

	#[test]
	fn duplicates_collapse_to_first_occurrence() {
		let users = dedup_in_order([user("b"), user("a"), user("b"), user("c"), user("a")]);

		assert_eq!(users, vec![user("b"), user("a"), user("c")]);
	}

	#[test]
	fn failure_reasons_serialize_as_kebab_case() {
		let result = BatchJoinResult {
			success_count: 1,
			failures: vec![
				JoinFailure { user: user("1"), reason: FailureReason::AlreadyMember },
				JoinFailure { user: user("2"), reason: FailureReason::ProviderError },
			],
		};
		let json = serde_json::to_value(&result).expect("Batch result should serialize.");

		assert_eq!(json["failures"][0]["reason"], "already-member");
		assert_eq!(json["failures"][1]["reason"], "provider-error");
		assert_eq!(result.attempted(), 3);
		assert_eq!(result.failed_with(FailureReason::ProviderError).collect::<Vec<_>>(), vec![&user("2")]);
	}
}
