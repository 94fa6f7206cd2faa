//! JSON file store for single-host deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{
		BudgetOutcome, CallBudgetCounter, CompareAndSwapOutcome, CredentialStore, StoreError,
		StoreFuture,
	},
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
	#[serde(default)]
	credential: Option<Credential>,
	// JSON object keys must be strings, so day counters travel as pairs.
	#[serde(default, with = "budget_pairs")]
	budget: BTreeMap<Date, u64>,
}

/// Persists the credential and day counters to a JSON file after each mutation.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the snapshot. A mutation that
/// fails to persist is rolled back in memory, so the in-process view never runs ahead of disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<Mutex<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(Mutex::new(snapshot)) })
	}

	/// Path of the backing snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn replace_credential(
		&self,
		snapshot: &mut Snapshot,
		credential: Credential,
	) -> Result<(), StoreError> {
		let previous = snapshot.credential.replace(credential);

		if let Err(e) = self.persist_locked(snapshot) {
			snapshot.credential = previous;

			return Err(e);
		}

		Ok(())
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { Ok(self.inner.lock().credential.clone()) })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.lock();

			self.replace_credential(&mut guard, credential)
		})
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.lock();
			let outcome = match guard.credential.as_ref() {
				Some(existing) if existing.refresh_token.expose() == expected_refresh =>
					CompareAndSwapOutcome::Updated,
				Some(_) => CompareAndSwapOutcome::RefreshMismatch,
				None => CompareAndSwapOutcome::Missing,
			};

			if matches!(outcome, CompareAndSwapOutcome::Updated) {
				self.replace_credential(&mut guard, replacement)?;
			}

			Ok(outcome)
		})
	}
}
impl CallBudgetCounter for FileStore {
	fn increment_if_under(&self, day: Date, limit: u64) -> StoreFuture<'_, BudgetOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.lock();
			let current = guard.budget.get(&day).copied().unwrap_or(0);

			if current >= limit {
				return Ok(BudgetOutcome::Exhausted { count: current });
			}

			guard.budget.insert(day, current + 1);

			if let Err(e) = self.persist_locked(&guard) {
				if current == 0 {
					guard.budget.remove(&day);
				} else {
					guard.budget.insert(day, current);
				}

				return Err(e);
			}

			Ok(BudgetOutcome::Admitted { count: current + 1 })
		})
	}

	fn count(&self, day: Date) -> StoreFuture<'_, u64> {
		Box::pin(async move { Ok(self.inner.lock().budget.get(&day).copied().unwrap_or(0)) })
	}

	fn prune_before(&self, day: Date) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let mut guard = self.inner.lock();
			let kept = guard.budget.split_off(&day);
			let removed = std::mem::replace(&mut guard.budget, kept);

			if removed.is_empty() {
				return Ok(0);
			}
			if let Err(e) = self.persist_locked(&guard) {
				guard.budget.extend(removed);

				return Err(e);
			}

			Ok(removed.len())
		})
	}
}

mod budget_pairs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(
		budget: &BTreeMap<Date, u64>,
		serializer: S,
	) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(budget.iter())
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<Date, u64>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let pairs = Vec::<(Date, u64)>::deserialize(deserializer)?;

		Ok(pairs.into_iter().collect())
	}
}
