//! Size-bound eviction policy.
//!
//! Pure selection logic: the engine streams entries oldest-access first and
//! the policy decides where to stop. Nothing here touches the store.

/// An entry offered for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub key: String,
    pub size: u64,
}

/// Outcome of a selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Keys to delete, oldest access first.
    pub condemned: Vec<String>,
    pub freed_bytes: u64,
    /// Total size once `condemned` is gone.
    pub remaining_bytes: u64,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.condemned.is_empty()
    }
}

/// Least-recently-accessed eviction against a fixed byte budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    budget_bytes: u64,
}

impl EvictionPolicy {
    pub fn new(budget_bytes: u64) -> Self {
        Self { budget_bytes }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn needs_eviction(&self, total_bytes: u64) -> bool {
        total_bytes > self.budget_bytes
    }

    /// Pick entries to evict from `by_last_access` (ascending access time).
    ///
    /// Once over budget, entries are condemned in order until the running
    /// total drops strictly below the budget. The iterator is consumed lazily;
    /// the first error stops selection and is returned.
    pub fn select<I, E>(&self, total_bytes: u64, by_last_access: I) -> Result<EvictionPlan, E>
    where
        I: IntoIterator<Item = Result<EvictionCandidate, E>>,
    {
        let mut plan = EvictionPlan { remaining_bytes: total_bytes, ..Default::default() };
        if !self.needs_eviction(total_bytes) {
            return Ok(plan);
        }

        for candidate in by_last_access {
            let candidate = candidate?;
            plan.remaining_bytes = plan.remaining_bytes.saturating_sub(candidate.size);
            plan.freed_bytes += candidate.size;
            plan.condemned.push(candidate.key);
            if plan.remaining_bytes < self.budget_bytes {
                break;
            }
        }

        Ok(plan)
    }
}
