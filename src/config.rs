//! Process- and graph-level configuration.
//!
//! Mirrors the environment variables from spec §6. A host can either build
//! a [`GraphConfig`] explicitly or call [`GraphConfig::from_env`] to pick up
//! the same variables the original engine recognizes.

use std::env;

/// Tunables for a [`crate::graph::Graph`] and its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Dump every value layout to the trace log as it is built.
    pub print_layouts: bool,
    /// Build value layouts asynchronously on a background queue rather
    /// than synchronously on first use.
    pub async_layouts: bool,
    /// Eagerly unmap reusable arena pages back to the OS instead of
    /// keeping them resident for reuse by the next allocation.
    pub unmap_reusable: bool,
    /// Build a type's value layout at registration time rather than
    /// lazily on first comparison.
    pub prefetch_layouts: bool,
    /// Record tree annotations (`begin_tree_element`/`add_tree_value`).
    pub tree: bool,
    /// Bytes per arena page. Spec fixes this at 512; exposed for tests
    /// that want to exercise page-boundary behavior at smaller scale.
    pub page_size: usize,
    /// Initial number of pages reserved in the arena's mapped region.
    pub initial_pages: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            print_layouts: false,
            async_layouts: true,
            unmap_reusable: false,
            prefetch_layouts: false,
            tree: false,
            page_size: 512,
            initial_pages: 64,
        }
    }
}

impl GraphConfig {
    /// A configuration favoring diagnosability over throughput: layouts
    /// are printed and built eagerly, and tree recording is on.
    pub fn debug() -> Self {
        Self {
            print_layouts: true,
            async_layouts: false,
            unmap_reusable: false,
            prefetch_layouts: true,
            tree: true,
            ..Self::default()
        }
    }

    /// A configuration favoring low steady-state memory, at the cost of
    /// more remap traffic when pages are recycled.
    pub fn low_memory() -> Self {
        Self {
            unmap_reusable: true,
            initial_pages: 16,
            ..Self::default()
        }
    }

    /// Read the recognized `AG_*` environment variables, falling back to
    /// [`GraphConfig::default`] for anything unset.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            print_layouts: env_flag("AG_PRINT_LAYOUTS", default.print_layouts),
            async_layouts: env_flag("AG_ASYNC_LAYOUTS", default.async_layouts),
            unmap_reusable: env_flag("AG_UNMAP_REUSABLE", default.unmap_reusable),
            prefetch_layouts: env_flag("AG_PREFETCH_LAYOUTS", default.prefetch_layouts),
            tree: env_flag("AG_TREE", default.tree),
            ..default
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => !matches!(v.as_str(), "0" | "false" | "no" | ""),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = GraphConfig::default();
        assert!(cfg.async_layouts, "AG_ASYNC_LAYOUTS defaults to on");
        assert!(!cfg.unmap_reusable);
        assert!(!cfg.tree);
        assert_eq!(cfg.page_size, 512);
    }

    #[test]
    fn env_flag_falls_back_to_default_when_unset() {
        assert!(env_flag("AG_TEST_CONFIG_DOES_NOT_EXIST", true));
        assert!(!env_flag("AG_TEST_CONFIG_DOES_NOT_EXIST", false));
    }
}
