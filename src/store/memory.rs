//! Thread-safe in-memory store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{
		BudgetOutcome, CallBudgetCounter, CompareAndSwapOutcome, CredentialStore, StoreFuture,
	},
};

type CredentialSlot = Arc<RwLock<Option<Credential>>>;
type BudgetMap = Arc<Mutex<BTreeMap<Date, u64>>>;

/// In-process credential and call-budget storage.
///
/// Clones share the same state, so one instance can back both the token manager and the rate
/// limiter.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	credential: CredentialSlot,
	budget: BudgetMap,
}
impl MemoryStore {
	/// Creates a store that already holds `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self { credential: Arc::new(RwLock::new(Some(credential))), ..Default::default() }
	}

	fn cas_now(
		slot: &CredentialSlot,
		expected_refresh: &str,
		replacement: Credential,
	) -> CompareAndSwapOutcome {
		let mut guard = slot.write();
		let outcome = match guard.as_ref() {
			Some(existing) if existing.refresh_token.expose() == expected_refresh =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::RefreshMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			*guard = Some(replacement);
		}

		outcome
	}

	fn increment_now(budget: &BudgetMap, day: Date, limit: u64) -> BudgetOutcome {
		let mut guard = budget.lock();
		let count = guard.entry(day).or_insert(0);

		if *count >= limit {
			return BudgetOutcome::Exhausted { count: *count };
		}

		*count += 1;

		BudgetOutcome::Admitted { count: *count }
	}

	fn prune_now(budget: &BudgetMap, day: Date) -> usize {
		let mut guard = budget.lock();
		let before = guard.len();

		guard.retain(|key, _| *key >= day);

		before - guard.len()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		let slot = self.credential.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let slot = self.credential.clone();

		Box::pin(async move {
			*slot.write() = Some(credential);

			Ok(())
		})
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let slot = self.credential.clone();

		Box::pin(async move { Ok(Self::cas_now(&slot, expected_refresh, replacement)) })
	}
}
impl CallBudgetCounter for MemoryStore {
	fn increment_if_under(&self, day: Date, limit: u64) -> StoreFuture<'_, BudgetOutcome> {
		let budget = self.budget.clone();

		Box::pin(async move { Ok(Self::increment_now(&budget, day, limit)) })
	}

	fn count(&self, day: Date) -> StoreFuture<'_, u64> {
		let budget = self.budget.clone();

		Box::pin(async move { Ok(budget.lock().get(&day).copied().unwrap_or(0)) })
	}

	fn prune_before(&self, day: Date) -> StoreFuture<'_, usize> {
		let budget = self.budget.clone();

		Box::pin(async move { Ok(Self::prune_now(&budget, day)) })
	}
}
