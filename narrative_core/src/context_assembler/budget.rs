//! Token budget allocation over candidate fragments.

use tracing::debug;

use super::Fragment;
use crate::error::{EngineError, Result};

/// Outcome of one allocation.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Kept fragments, in the order they were offered.
    pub selected: Vec<Fragment>,

    /// Optional fragments that did not fit.
    pub dropped: Vec<Fragment>,

    pub required_tokens: usize,
    pub used_tokens: usize,
    pub max_tokens: usize,
}

/// Selects fragments so the total never exceeds the budget.
///
/// Required fragments are always kept; if they alone overflow the budget the
/// allocation fails. Optional fragments are considered by priority (highest
/// first, then smallest, then earliest offered) and kept only if they fit
/// whole. A fragment is never cut to squeeze it in.
#[derive(Debug, Clone, Default)]
pub struct TokenBudgetAllocator;

impl TokenBudgetAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate(&self, fragments: Vec<Fragment>, max_tokens: usize) -> Result<Allocation> {
        let required_tokens: usize = fragments
            .iter()
            .filter(|f| f.required)
            .map(|f| f.estimated_tokens)
            .sum();
        if required_tokens > max_tokens {
            return Err(EngineError::BudgetInfeasible {
                required: required_tokens,
                max_tokens,
            });
        }

        let mut candidates: Vec<usize> = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.required)
            .map(|(index, _)| index)
            .collect();
        candidates.sort_by(|&a, &b| {
            let (fa, fb) = (&fragments[a], &fragments[b]);
            fb.priority
                .cmp(&fa.priority)
                .then_with(|| fa.estimated_tokens.cmp(&fb.estimated_tokens))
                .then_with(|| a.cmp(&b))
        });

        let mut keep: Vec<bool> = fragments.iter().map(|f| f.required).collect();
        let mut used_tokens = required_tokens;
        for index in candidates {
            let size = fragments[index].estimated_tokens;
            if used_tokens + size <= max_tokens {
                keep[index] = true;
                used_tokens += size;
            }
        }

        let mut selected = Vec::new();
        let mut dropped = Vec::new();
        for (fragment, kept) in fragments.into_iter().zip(keep) {
            if kept {
                selected.push(fragment);
            } else {
                dropped.push(fragment);
            }
        }

        debug!(
            used_tokens,
            required_tokens,
            max_tokens,
            dropped = dropped.len(),
            "budget allocated"
        );

        Ok(Allocation {
            selected,
            dropped,
            required_tokens,
            used_tokens,
            max_tokens,
        })
    }
}
