use tracing::info;

use super::Generation;
use crate::models::ScopeFilter;

/// A scope replacement the rest of the feed must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChange {
    pub generation: Generation,
    pub scope: ScopeFilter,
}

/// Holds the current scope and hands out a new generation whenever it changes.
#[derive(Debug, Default)]
pub struct FilterController {
    scope: Option<ScopeFilter>,
    generation: Generation,
}

impl FilterController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<&ScopeFilter> {
        self.scope.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Replace the scope. `None` when `scope` equals the current one.
    pub fn set_scope(&mut self, scope: ScopeFilter) -> Option<ScopeChange> {
        if self.scope.as_ref() == Some(&scope) {
            return None;
        }
        Some(self.advance(scope))
    }

    /// Restart the current scope under a fresh generation.
    pub fn refresh(&mut self) -> Option<ScopeChange> {
        let scope = self.scope.clone()?;
        Some(self.advance(scope))
    }

    fn advance(&mut self, scope: ScopeFilter) -> ScopeChange {
        self.generation = self.generation.next();
        info!(generation = %self.generation, account = %scope.account, "feed scope changed");
        self.scope = Some(scope.clone());
        ScopeChange {
            generation: self.generation,
            scope,
        }
    }
}
