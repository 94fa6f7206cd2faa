//! Persistence contracts for the stored credential and the per-day call budget.
//!
//! Both contracts are implemented by [`MemoryStore`] and [`FileStore`]. Implementations must keep
//! [`CallBudgetCounter::increment_if_under`] atomic: two concurrent callers can never both be
//! admitted with the same resulting count.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage for the single marketplace credential.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Loads the stored credential, if one was ever saved.
	fn load(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Creates or overwrites the stored credential.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Replaces the stored credential only if its refresh token still equals `expected_refresh`.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}

/// Storage for per-day outbound call counts.
pub trait CallBudgetCounter
where
	Self: Send + Sync,
{
	/// Atomically increments the count for `day` when it is below `limit`.
	fn increment_if_under(&self, day: Date, limit: u64) -> StoreFuture<'_, BudgetOutcome>;

	/// Returns the number of admitted calls recorded for `day`.
	fn count(&self, day: Date) -> StoreFuture<'_, u64>;

	/// Drops counters for days strictly before `day`, returning how many were removed.
	fn prune_before(&self, day: Date) -> StoreFuture<'_, usize>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched and the credential was replaced.
	Updated,
	/// A credential exists but its refresh secret changed underneath the caller.
	RefreshMismatch,
	/// No credential is stored.
	Missing,
}

/// Result of [`CallBudgetCounter::increment_if_under`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetOutcome {
	/// The call was counted; `count` includes it.
	Admitted {
		/// Count for the day after the increment.
		count: u64,
	},
	/// The budget was already spent; nothing was recorded.
	Exhausted {
		/// Count for the day, unchanged.
		count: u64,
	},
}
impl BudgetOutcome {
	/// Returns `true` when the call was admitted.
	pub fn is_admitted(self) -> bool {
		matches!(self, Self::Admitted { .. })
	}

	/// Returns the day count reported by the store.
	pub fn count(self) -> u64 {
		match self {
			Self::Admitted { count } | Self::Exhausted { count } => count,
		}
	}
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Snapshot encoding or decoding failed.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure such as an unreadable file.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
