//! Task reference resolution inside a plan patch.
//!
//! Patches refer to tasks with bare integers that can mean three things:
//! the N-th task of this patch (`-N`), a task's declared legacy id, or a
//! persisted task id. Positive integers that match nothing else fall back to
//! the historical 1-based position reading. When two readings are possible
//! the resolver keeps the documented one and counts an ambiguity instead of
//! guessing silently.

use std::collections::{HashMap, HashSet};

/// How a raw reference was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRef {
    /// `-N`: the N-th task of this patch (0-based index stored).
    Row(usize),
    /// The declared legacy id of a task in this patch (its index).
    Declared(usize),
    /// A task that already exists in the project.
    Existing(i64),
    /// Legacy positive 1-based position in this patch (0-based index stored).
    Positional(usize),
}

/// Outcome of resolving one raw reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        reference: TaskRef,
        task_id: i64,
        ambiguous: bool,
    },
    /// Nothing matched; the raw value is handed back unchanged.
    Unresolved(i64),
}

impl Resolution {
    pub fn task_id(&self) -> i64 {
        match *self {
            Self::Resolved { task_id, .. } => task_id,
            Self::Unresolved(raw) => raw,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Resolved { ambiguous: true, .. })
    }
}

/// Resolves references against one patch.
#[derive(Debug)]
pub struct RefResolver {
    /// Id assigned (or simulated) for each patch task, by position.
    assigned: Vec<i64>,
    /// Declared legacy id -> position. First declaration wins.
    declared: HashMap<i64, usize>,
    /// Persisted task ids still visible to this patch (empty on replace).
    existing: HashSet<i64>,
    replace: bool,
}

impl RefResolver {
    /// `declared[i]` is the legacy id task `i` of the patch declared, if
    /// any; `assigned[i]` is the id it received.
    pub fn new(
        assigned: Vec<i64>,
        declared: &[Option<i64>],
        existing: impl IntoIterator<Item = i64>,
        replace: bool,
    ) -> Self {
        let mut declared_map = HashMap::new();
        for (pos, id) in declared.iter().enumerate() {
            if let Some(id) = id.filter(|id| *id > 0) {
                declared_map.entry(id).or_insert(pos);
            }
        }
        let existing = if replace {
            HashSet::new()
        } else {
            existing.into_iter().collect()
        };
        Self {
            assigned,
            declared: declared_map,
            existing,
            replace,
        }
    }

    /// Resolve a raw reference. `None` and `0` mean "no reference".
    pub fn resolve_opt(&self, raw: Option<i64>) -> Option<Resolution> {
        raw.filter(|r| *r != 0).map(|r| self.resolve(r))
    }

    pub fn resolve(&self, raw: i64) -> Resolution {
        if raw < 0 {
            return self.row(raw);
        }

        if let Some(&pos) = self.declared.get(&raw) {
            if self.existing.contains(&raw) {
                return Resolution::Resolved {
                    reference: TaskRef::Existing(raw),
                    task_id: raw,
                    ambiguous: true,
                };
            }
            return Resolution::Resolved {
                reference: TaskRef::Declared(pos),
                task_id: self.assigned[pos],
                ambiguous: false,
            };
        }

        let pos = (raw - 1) as usize;
        let in_patch_range = pos < self.assigned.len();

        // A persisted id that is also a valid position keeps the persisted
        // reading and is counted.
        if self.existing.contains(&raw) {
            return Resolution::Resolved {
                reference: TaskRef::Existing(raw),
                task_id: raw,
                ambiguous: in_patch_range,
            };
        }

        if in_patch_range {
            return Resolution::Resolved {
                reference: TaskRef::Positional(pos),
                task_id: self.assigned[pos],
                ambiguous: !self.replace && !self.existing.is_empty(),
            };
        }

        Resolution::Unresolved(raw)
    }

    fn row(&self, raw: i64) -> Resolution {
        let n = raw.unsigned_abs() as usize;
        if n >= 1 && n <= self.assigned.len() {
            Resolution::Resolved {
                reference: TaskRef::Row(n - 1),
                task_id: self.assigned[n - 1],
                ambiguous: false,
            }
        } else {
            Resolution::Unresolved(raw)
        }
    }
}

/// Ambiguity counters across one patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmbiguityCounts {
    pub task_parents: usize,
    pub job_tasks: usize,
    pub material_tasks: usize,
}

impl AmbiguityCounts {
    pub fn total(&self) -> usize {
        self.task_parents + self.job_tasks + self.material_tasks
    }

    /// The single summary warning for a patch, if anything was ambiguous.
    pub fn warning(&self) -> Option<String> {
        if self.total() == 0 {
            return None;
        }
        Some(format!(
            "ambiguous task references resolved by fallback: {} task parent(s), {} job task(s), \
             {} material task(s); positive numbers in append mode can mean either a patch \
             position or an existing task id, use negative row references (-1 = first task of \
             this patch) instead",
            self.task_parents, self.job_tasks, self.material_tasks
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Patch of three tasks that received ids 101..=103.
    fn resolver(declared: &[Option<i64>], existing: &[i64], replace: bool) -> RefResolver {
        RefResolver::new(vec![101, 102, 103], declared, existing.iter().copied(), replace)
    }

    #[test]
    fn negative_row_reference_always_wins() {
        let r = resolver(&[Some(1), None, None], &[1, 2], false);
        let res = r.resolve(-1);
        assert_eq!(res.task_id(), 101);
        assert!(!res.is_ambiguous());
        assert_eq!(r.resolve(-3).task_id(), 103);
    }

    #[test]
    fn out_of_range_row_reference_is_unresolved() {
        let r = resolver(&[None, None, None], &[], true);
        assert_eq!(r.resolve(-4), Resolution::Unresolved(-4));
    }

    #[test]
    fn declared_id_maps_to_new_task() {
        let r = resolver(&[Some(500), Some(501), None], &[], true);
        assert_eq!(r.resolve(501).task_id(), 102);
    }

    #[test]
    fn declared_id_colliding_with_existing_keeps_existing_and_flags() {
        let r = resolver(&[Some(42), None, None], &[42], false);
        let res = r.resolve(42);
        assert_eq!(res.task_id(), 42);
        assert!(res.is_ambiguous());
    }

    #[test]
    fn existing_id_in_append_mode() {
        let r = resolver(&[None, None, None], &[77], false);
        let res = r.resolve(77);
        assert_eq!(res.task_id(), 77);
        assert!(!res.is_ambiguous());
    }

    #[test]
    fn existing_ids_are_invisible_on_replace() {
        let r = resolver(&[None, None, None], &[77], true);
        assert_eq!(r.resolve(77), Resolution::Unresolved(77));
    }

    #[test]
    fn positional_fallback_is_ambiguous_only_with_persisted_tasks() {
        let with_existing = resolver(&[None, None, None], &[900], false);
        let res = with_existing.resolve(2);
        assert_eq!(res.task_id(), 102);
        assert!(res.is_ambiguous());

        let fresh = resolver(&[None, None, None], &[], false);
        assert!(!fresh.resolve(2).is_ambiguous());

        let replace = resolver(&[None, None, None], &[900], true);
        assert!(!replace.resolve(2).is_ambiguous());
    }

    #[test]
    fn existing_id_one_beats_position_one_but_is_flagged() {
        let r = resolver(&[None, None, None], &[1], false);
        let res = r.resolve(1);
        assert_eq!(res.task_id(), 1);
        assert!(res.is_ambiguous());
        assert_eq!(r.resolve(-1).task_id(), 101);
    }

    #[test]
    fn zero_and_none_mean_no_reference() {
        let r = resolver(&[None, None, None], &[], false);
        assert_eq!(r.resolve_opt(None), None);
        assert_eq!(r.resolve_opt(Some(0)), None);
        assert!(r.resolve_opt(Some(-2)).is_some());
    }

    #[test]
    fn warning_only_when_something_was_ambiguous() {
        assert!(AmbiguityCounts::default().warning().is_none());
        let counts = AmbiguityCounts {
            task_parents: 1,
            job_tasks: 2,
            material_tasks: 0,
        };
        let w = counts.warning().unwrap();
        assert!(w.contains("1 task parent(s)"));
        assert!(w.contains("2 job task(s)"));
        assert!(w.contains("negative row references"));
    }
}
