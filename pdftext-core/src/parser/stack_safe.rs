//! Stack-safe traversal utilities
//!
//! Bounds how deep the page tree, `/Parent` chains and nested form
//! XObjects may go, and detects reference cycles along the way.

use crate::error::{PdfError, Result};
use std::collections::HashSet;

/// Longest `/Parent` chain followed before a page is declared malformed
pub const DEFAULT_MAX_PARENT_DEPTH: usize = 64;

/// Depth and cycle tracking for a single traversal
#[derive(Debug)]
pub struct StackSafeContext {
    /// Current recursion depth
    pub depth: usize,
    /// Maximum allowed depth
    pub max_depth: usize,
    /// Object references on the current path
    pub visited_refs: HashSet<(u32, u16)>,
}

impl StackSafeContext {
    /// Create a context allowing `max_depth` nested levels
    pub fn with_limit(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited_refs: HashSet::new(),
        }
    }

    /// Enter a new recursion level
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(PdfError::structure(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Exit the current recursion level
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record a reference on the current path, failing if it is already there
    pub fn visit_ref(&mut self, obj_num: u32, generation: u16) -> Result<()> {
        if !self.visited_refs.insert((obj_num, generation)) {
            return Err(PdfError::structure(format!(
                "reference cycle through {} {} R",
                obj_num, generation
            )));
        }
        Ok(())
    }

    /// Remove a reference once its subtree is finished
    pub fn unvisit_ref(&mut self, obj_num: u32, generation: u16) {
        self.visited_refs.remove(&(obj_num, generation));
    }

    /// Whether `obj_num generation R` is on the current path
    pub fn is_visited(&self, obj_num: u32, generation: u16) -> bool {
        self.visited_refs.contains(&(obj_num, generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_limit() {
        let mut ctx = StackSafeContext::with_limit(2);
        assert!(ctx.enter().is_ok());
        assert!(ctx.enter().is_ok());
        assert!(matches!(ctx.enter(), Err(PdfError::MalformedStructure(_))));
        ctx.exit();
        assert!(ctx.enter().is_ok());
    }

    #[test]
    fn test_cycle_detection() {
        let mut ctx = StackSafeContext::with_limit(8);
        ctx.visit_ref(3, 0).unwrap();
        assert!(ctx.is_visited(3, 0));
        assert!(ctx.visit_ref(3, 0).is_err());
        ctx.unvisit_ref(3, 0);
        assert!(ctx.visit_ref(3, 0).is_ok());
    }

    #[test]
    fn test_exit_never_underflows() {
        let mut ctx = StackSafeContext::with_limit(1);
        ctx.exit();
        assert_eq!(ctx.depth, 0);
    }
}
