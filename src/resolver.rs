//! Deterministic spawn-candidate resolver.
//!
//! Given an overlap table and a selection of pre-side segments, the resolver
//! partitions the reachable post-side segments into independent spawn groups
//! and picks, per group, the post-side segments that represent it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::policy::scoring::{clears_threshold, BestMatchTracker};
use crate::policy::{GroupingStrategy, ResolvePolicy};
use crate::types::{OverlapTable, PostCandidate, SegmentId};

/// One spawn group in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnGroup {
    /// Sequential ID assigned at discovery. Not compacted after filtering.
    pub group_id: usize,
    /// Selected post-side segments with their overlap sizes.
    pub segments: BTreeMap<SegmentId, u64>,
    /// True when no candidate cleared the ratio and the best-scoring
    /// spawnable candidate was picked instead.
    pub fallback: bool,
}

impl SpawnGroup {
    /// Whether the group contains the post-side segment.
    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(&id)
    }

    /// Number of selected post-side segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the group selected nothing.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Result of a resolve call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Surviving groups in discovery order.
    pub groups: Vec<SpawnGroup>,
    /// Distinct post-side candidates reachable from the selection.
    pub candidate_count: usize,
    /// Connected groups found before matching. Every `group_id` is below it.
    pub component_count: usize,
    /// Groups removed because nothing spawnable was selected.
    pub dropped_groups: usize,
}

impl Resolution {
    /// Output in the caller-facing shape: one `{post id: overlap size}` map per group.
    pub fn into_segment_maps(self) -> Vec<BTreeMap<SegmentId, u64>> {
        self.groups.into_iter().map(|g| g.segments).collect()
    }
}

/// A post-side candidate merged across every selected pre-side segment that
/// lists it. Sizes come from the first occurrence; `can_spawn` is OR-ed.
#[derive(Debug, Clone, Copy)]
struct MergedCandidate<'t> {
    first: &'t PostCandidate,
    can_spawn: bool,
}

impl MergedCandidate<'_> {
    fn id(&self) -> SegmentId {
        self.first.id
    }
}

/// Candidates in discovery order plus an ID index into them.
///
/// Borrows from the table; nothing here writes back to it.
#[derive(Debug, Default)]
struct CandidateArena<'t> {
    candidates: Vec<MergedCandidate<'t>>,
    index: BTreeMap<SegmentId, usize>,
}

impl<'t> CandidateArena<'t> {
    fn collect(table: &'t OverlapTable, pre_ids: impl IntoIterator<Item = SegmentId>) -> Self {
        let mut arena = Self::default();
        for pre_id in pre_ids {
            for candidate in table.candidates_for(pre_id) {
                match arena.index.get(&candidate.id) {
                    Some(&slot) => arena.candidates[slot].can_spawn |= candidate.can_spawn,
                    None => {
                        arena.index.insert(candidate.id, arena.candidates.len());
                        arena.candidates.push(MergedCandidate {
                            first: candidate,
                            can_spawn: candidate.can_spawn,
                        });
                    }
                }
            }
        }
        arena
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Connected components over post-side adjacency, restricted to collected
    /// candidates. Each component lists arena slots in ascending order.
    fn post_components(&self, table: &OverlapTable) -> Vec<Vec<usize>> {
        let mut group_of: Vec<Option<usize>> = vec![None; self.len()];
        let mut components = Vec::new();

        for start in 0..self.len() {
            if group_of[start].is_some() {
                continue;
            }
            let group_id = components.len();
            group_of[start] = Some(group_id);

            let mut members = Vec::new();
            let mut stack = vec![start];
            while let Some(slot) = stack.pop() {
                members.push(slot);
                for neighbor in table.post_neighbors(self.candidates[slot].id()) {
                    if let Some(&next) = self.index.get(neighbor) {
                        if group_of[next].is_none() {
                            group_of[next] = Some(group_id);
                            stack.push(next);
                        }
                    }
                }
            }

            members.sort_unstable();
            components.push(members);
        }

        components
    }
}

/// Connected components of the selection over pre-side adjacency, each in
/// ascending ID order, discovered in ascending ID order.
fn pre_components(table: &OverlapTable, selection: &BTreeSet<SegmentId>) -> Vec<Vec<SegmentId>> {
    let mut visited: BTreeSet<SegmentId> = BTreeSet::new();
    let mut components = Vec::new();

    for &start in selection {
        if !visited.insert(start) {
            continue;
        }
        let mut members = Vec::new();
        let mut stack = vec![start];
        while let Some(pre_id) = stack.pop() {
            members.push(pre_id);
            for &neighbor in table.pre_neighbors(pre_id) {
                if selection.contains(&neighbor) && visited.insert(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    components
}

/// Spawn-candidate resolver.
///
/// Pure and synchronous: holds only its policy, borrows the table per call,
/// and keeps no state between calls. One resolver (and one table) can serve
/// any number of threads.
///
/// ## Algorithm
///
/// 1. Collect every post-side candidate of the selected pre-side segments,
///    merging duplicates (first sizes win, `can_spawn` is OR-ed)
/// 2. Partition the candidates into connected groups
/// 3. Per group, select every candidate whose selected support reaches
///    `match_ratio * overlap_size`; if none does, fall back to the spawnable
///    candidate with the highest smoothed score (first wins on ties)
/// 4. Drop groups that selected nothing spawnable
/// 5. Return surviving groups in discovery order
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnResolver {
    policy: ResolvePolicy,
}

impl SpawnResolver {
    /// Create a resolver.
    ///
    /// The match ratio is not validated here; see [`ResolvePolicy`].
    pub fn new(policy: ResolvePolicy) -> Self {
        Self { policy }
    }

    /// Get the policy.
    pub fn policy(&self) -> &ResolvePolicy {
        &self.policy
    }

    /// Resolve a selection against a table.
    pub fn resolve(&self, table: &OverlapTable, selection: &BTreeSet<SegmentId>) -> Resolution {
        let resolution = match self.policy.grouping {
            GroupingStrategy::PostAdjacency => self.resolve_post_adjacency(table, selection),
            GroupingStrategy::PreAdjacency => self.resolve_pre_adjacency(table, selection),
        };

        debug!(
            selected = selection.len(),
            candidates = resolution.candidate_count,
            components = resolution.component_count,
            groups = resolution.groups.len(),
            dropped = resolution.dropped_groups,
            grouping = %self.policy.grouping,
            match_ratio = self.policy.match_ratio,
            "Spawn candidates resolved"
        );

        resolution
    }

    fn resolve_post_adjacency(
        &self,
        table: &OverlapTable,
        selection: &BTreeSet<SegmentId>,
    ) -> Resolution {
        let arena = CandidateArena::collect(table, selection.iter().copied());
        if arena.is_empty() {
            return Resolution::default();
        }

        let components = arena.post_components(table);
        let mut resolution = Resolution {
            candidate_count: arena.len(),
            component_count: components.len(),
            ..Resolution::default()
        };

        for (group_id, members) in components.iter().enumerate() {
            let slots = members.iter().map(|&slot| arena.candidates[slot]);
            match self.match_group(group_id, slots, selection) {
                Some(group) => resolution.groups.push(group),
                None => resolution.dropped_groups += 1,
            }
        }

        resolution
    }

    fn resolve_pre_adjacency(
        &self,
        table: &OverlapTable,
        selection: &BTreeSet<SegmentId>,
    ) -> Resolution {
        let components = pre_components(table, selection);
        let mut resolution = Resolution {
            component_count: components.len(),
            ..Resolution::default()
        };
        let mut reachable: BTreeSet<SegmentId> = BTreeSet::new();

        for (group_id, pre_ids) in components.into_iter().enumerate() {
            let arena = CandidateArena::collect(table, pre_ids);
            // A pre component without candidates yields no group, matched or dropped.
            if arena.is_empty() {
                continue;
            }
            reachable.extend(arena.index.keys().copied());

            match self.match_group(group_id, arena.candidates.iter().copied(), selection) {
                Some(group) => resolution.groups.push(group),
                None => resolution.dropped_groups += 1,
            }
        }

        resolution.candidate_count = reachable.len();
        resolution
    }

    /// Steps 3 and 4 for one group. `None` means the group is dropped.
    fn match_group<'t>(
        &self,
        group_id: usize,
        members: impl Iterator<Item = MergedCandidate<'t>>,
        selection: &BTreeSet<SegmentId>,
    ) -> Option<SpawnGroup> {
        let mut segments = BTreeMap::new();
        let mut spawnable = false;
        let mut best = BestMatchTracker::new();

        for candidate in members {
            let overlap_size = candidate.first.overlap_size;
            let accum_size = candidate.first.accumulated_support(selection);

            if clears_threshold(accum_size, self.policy.match_ratio, overlap_size) {
                segments.insert(candidate.id(), overlap_size);
                spawnable |= candidate.can_spawn;
            }
            if candidate.can_spawn {
                best.offer(candidate.id(), overlap_size, accum_size);
            }
        }

        let mut fallback = false;
        if segments.is_empty() {
            let pick = best.best()?;
            info!(
                group_id,
                segment = %pick.id,
                accum_size = pick.accum_size,
                overlap_size = pick.overlap_size,
                score = pick.score,
                "No segment cleared the match ratio, falling back to best-scoring segment"
            );
            segments.insert(pick.id, pick.overlap_size);
            spawnable = true;
            fallback = true;
        }

        if !spawnable {
            return None;
        }

        Some(SpawnGroup {
            group_id,
            segments,
            fallback,
        })
    }
}

/// Resolve with post-side-adjacency grouping and return the caller-facing shape.
///
/// `match_ratio` is used as given; callers enforce the [0.5, 1.0] contract.
pub fn resolve(
    table: &OverlapTable,
    selection: &BTreeSet<SegmentId>,
    match_ratio: f64,
) -> Vec<BTreeMap<SegmentId, u64>> {
    SpawnResolver::new(ResolvePolicy::new(match_ratio))
        .resolve(table, selection)
        .into_segment_maps()
}
