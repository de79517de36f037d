//! Single-user join into a target.
//!
//! [`Broker::join_target_outcome`] never fails: every provider answer maps to a
//! [`JoinOutcome`]. Rate-limit answers mark the shared tracker before the outcome is returned,
//! so every join that checks afterwards observes the block.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	api::MemberAddition,
	auth::{CredentialPair, TargetId, TokenSecret, UserId},
	error::ConfigError,
	flows::{Broker, FailureReason},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Outcome of one add-member attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinOutcome {
	/// The user was added.
	Joined,
	/// The user already belonged to the target.
	AlreadyMember,
	/// No stored pair, or the pair was rejected and could not be refreshed.
	Unauthorized,
	/// A rate limit blocked the attempt (before dispatch, or as the provider's answer).
	RateLimited,
	/// Any other failure: rejection, timeout, transport or store error.
	ProviderError,
}
impl JoinOutcome {
	/// Returns `true` only for [`JoinOutcome::Joined`].
	pub const fn is_success(self) -> bool {
		matches!(self, Self::Joined)
	}

	/// Failure reason recorded in batch results; `None` on success.
	pub const fn failure_reason(self) -> Option<FailureReason> {
		match self {
			Self::Joined => None,
			Self::AlreadyMember => Some(FailureReason::AlreadyMember),
			Self::Unauthorized => Some(FailureReason::Unauthorized),
			Self::RateLimited => Some(FailureReason::RateLimited),
			Self::ProviderError => Some(FailureReason::ProviderError),
		}
	}

	/// Stable label used in logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Joined => "joined",
			Self::AlreadyMember => "already-member",
			Self::Unauthorized => "unauthorized",
			Self::RateLimited => "rate-limited",
			Self::ProviderError => "provider-error",
		}
	}
}
impl Display for JoinOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Thread-safe counters for join attempts.
#[derive(Debug, Default)]
pub struct JoinMetrics {
	calls: AtomicU64,
	joined: AtomicU64,
	already_member: AtomicU64,
	unauthorized: AtomicU64,
	rate_limited: AtomicU64,
	provider_error: AtomicU64,
}
impl JoinMetrics {
	/// Add-member requests actually sent to the provider (retries included).
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Attempts that finished with `outcome`.
	pub fn outcomes(&self, outcome: JoinOutcome) -> u64 {
		self.counter(outcome).load(Ordering::Relaxed)
	}

	/// Attempts finished with any outcome.
	pub fn attempts(&self) -> u64 {
		[
			JoinOutcome::Joined,
			JoinOutcome::AlreadyMember,
			JoinOutcome::Unauthorized,
			JoinOutcome::RateLimited,
			JoinOutcome::ProviderError,
		]
		.into_iter()
		.map(|outcome| self.outcomes(outcome))
		.sum()
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record(&self, outcome: JoinOutcome) {
		self.counter(outcome).fetch_add(1, Ordering::Relaxed);
	}

	fn counter(&self, outcome: JoinOutcome) -> &AtomicU64 {
		match outcome {
			JoinOutcome::Joined => &self.joined,
			JoinOutcome::AlreadyMember => &self.already_member,
			JoinOutcome::Unauthorized => &self.unauthorized,
			JoinOutcome::RateLimited => &self.rate_limited,
			JoinOutcome::ProviderError => &self.provider_error,
		}
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Adds `user` to `target` with the stored pair; `true` only when the user was added.
	///
	/// Missing credentials answer `false` without contacting the provider.
	pub async fn join_target(&self, target: &TargetId, user: &UserId) -> bool {
		self.join_target_outcome(target, user).await.is_success()
	}

	/// Same as [`join_target`](Self::join_target), reporting why an attempt did not succeed.
	pub async fn join_target_outcome(&self, target: &TargetId, user: &UserId) -> JoinOutcome {
		const KIND: FlowKind = FlowKind::Join;

		let span = FlowSpan::new(KIND, "join_target");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = span.instrument(self.attempt_join(target, user)).await;

		self.join_metrics.record(outcome);
		obs::record_join_outcome(outcome.as_str());

		if outcome.is_success() {
			obs::record_flow_outcome(KIND, FlowOutcome::Success);
		} else {
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			obs::record_join_failure(target, user, outcome.as_str());
		}

		outcome
	}

	async fn attempt_join(&self, target: &TargetId, user: &UserId) -> JoinOutcome {
		if self.throttle.active_block(target).is_some() {
			return JoinOutcome::RateLimited;
		}

		let pair = match self.store.fetch(user).await {
			Ok(Some(pair)) => pair,
			Ok(None) => return JoinOutcome::Unauthorized,
			Err(_) => return JoinOutcome::ProviderError,
		};
		let bot_token = match self.bot_token.as_ref() {
			Some(token) => token,
			None => return self.join_outcome(target, Err(ConfigError::MissingBotToken.into())),
		};

		match self.add_member(target, bot_token, &pair).await {
			Err(Error::Unauthenticated) => {},
			result => return self.join_outcome(target, result),
		}

		// The stored access token was rejected: refresh once, then retry once.
		match self.refresh_stored(&pair).await {
			Ok(rotated) => {
				let result = self.add_member(target, bot_token, &rotated).await;

				self.join_outcome(target, result)
			},
			Err(Error::Throttled { .. }) => JoinOutcome::RateLimited,
			Err(Error::InvalidGrant { .. } | Error::Unauthenticated) => JoinOutcome::Unauthorized,
			Err(_) => JoinOutcome::ProviderError,
		}
	}

	async fn add_member(
		&self,
		target: &TargetId,
		bot_token: &TokenSecret,
		pair: &CredentialPair,
	) -> Result<MemberAddition> {
		self.join_metrics.record_call();
		self.api().add_member(target, &pair.user, bot_token, &pair.access_token).await
	}

	fn join_outcome(&self, target: &TargetId, result: Result<MemberAddition>) -> JoinOutcome {
		match result.map_err(|err| self.note_rate_limit(err, Some(target))) {
			Ok(MemberAddition::Added) => JoinOutcome::Joined,
			Ok(MemberAddition::AlreadyMember) => JoinOutcome::AlreadyMember,
			Err(Error::Throttled { .. }) => JoinOutcome::RateLimited,
			Err(Error::Unauthenticated | Error::InvalidGrant { .. }) => JoinOutcome::Unauthorized,
			Err(_) => JoinOutcome::ProviderError,
		}
	}
}
