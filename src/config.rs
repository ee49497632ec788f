//! Heap configuration: which backend to run and how big to start it.

/// Which collection strategy a [`crate::heap::GcHeap`] should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Free-list arena, mark-and-sweep.
    #[default]
    MarkSweep,
    /// Two semi-spaces, Cheney-style copying collection.
    Copying,
    /// Copying nursery promoting into a free-list old generation.
    Generational,
}

impl BackendKind {
    /// Read `GC_BACKEND` from the environment, matching the C runtime's
    /// `select_backend`: `copy`/`copying`/`semispace` selects
    /// [`BackendKind::Copying`], `gen`/`generational` selects
    /// [`BackendKind::Generational`], anything else (including unset)
    /// selects [`BackendKind::MarkSweep`].
    pub fn from_env() -> Self {
        match std::env::var("GC_BACKEND").ok().as_deref() {
            Some("copy" | "copying" | "semispace") => Self::Copying,
            Some("gen" | "generational") => Self::Generational,
            _ => Self::MarkSweep,
        }
    }

    /// This backend's default initial heap size, in bytes, when
    /// [`GcConfig::initial_heap_size`] is left unset.
    pub fn default_heap_size(self) -> usize {
        match self {
            Self::MarkSweep => 4 * 1024 * 1024,
            Self::Copying => 32 * 1024 * 1024,
            Self::Generational => 512 * 1024,
        }
    }
}

/// Construction-time configuration for a [`crate::heap::GcHeap`].
#[derive(Debug, Clone, Default)]
pub struct GcConfig {
    /// Which backend to run.
    pub backend: BackendKind,
    /// Overrides the backend's default heap size (for mark-sweep, the
    /// arena size; for copying, the size of *each* semi-space; for
    /// generational, the nursery size — the old generation always starts
    /// at the mark-sweep default and grows from there).
    pub initial_heap_size: Option<usize>,
    /// Overrides the backend's default collection threshold.
    pub threshold: Option<usize>,
    /// Force a collection cycle around every allocation. Exists for
    /// testing; must never change observable mutator behaviour, only
    /// timing.
    pub stress_gc: bool,
}

impl GcConfig {
    /// Build a config with the backend selected by `GC_BACKEND` and every
    /// other field at its default.
    pub fn from_env() -> Self {
        Self {
            backend: BackendKind::from_env(),
            ..Self::default()
        }
    }

    pub(crate) fn heap_size(&self) -> usize {
        self.initial_heap_size
            .unwrap_or_else(|| self.backend.default_heap_size())
    }

    pub(crate) fn resolved_threshold(&self) -> usize {
        self.threshold.unwrap_or_else(|| self.heap_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_sweep_is_the_default() {
        assert_eq!(BackendKind::default(), BackendKind::MarkSweep);
    }

    #[test]
    fn heap_size_falls_back_to_backend_default() {
        let cfg = GcConfig {
            backend: BackendKind::Copying,
            ..Default::default()
        };
        assert_eq!(cfg.heap_size(), BackendKind::Copying.default_heap_size());
    }
}
