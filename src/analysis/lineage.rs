use std::collections::{BTreeMap, VecDeque};

use super::metrics::{STABLE_COMPLETION_DELTA, STABLE_SIMILARITY};
use super::{RunSummary, RunVerdict, SequenceSummary};

/// Sets `parent_run_id` from the recorded predecessor when that run is in
/// the scan and strictly older. `runs` must be sorted by run id.
pub(crate) fn link_parents(runs: &mut [RunSummary]) {
    let index = runs
        .iter()
        .map(|run| (run.run_id.clone(), run.id.clone()))
        .collect::<BTreeMap<_, _>>();

    for run in runs.iter_mut() {
        run.parent_run_id = run
            .predecessor_run_id
            .as_ref()
            .filter(|predecessor| {
                index
                    .get(predecessor.as_str())
                    .is_some_and(|parent_id| *parent_id < run.id)
            })
            .cloned();
    }
}

/// Groups runs into sequences by following parent links from every root,
/// numbers them, and summarises each one.
pub(crate) fn build_sequences(runs: &mut [RunSummary], plateau_window: usize) -> Vec<SequenceSummary> {
    let position = runs
        .iter()
        .enumerate()
        .map(|(index, run)| (run.run_id.clone(), index))
        .collect::<BTreeMap<_, _>>();

    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut roots = Vec::new();
    for (index, run) in runs.iter().enumerate() {
        match run
            .parent_run_id
            .as_ref()
            .and_then(|parent| position.get(parent))
        {
            Some(parent) => children.entry(*parent).or_default().push(index),
            None => roots.push(index),
        }
    }

    let mut sequences = Vec::new();
    for root in roots {
        let mut members = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            members.push(current);
            if let Some(next) = children.get(&current) {
                queue.extend(next.iter().copied());
            }
        }
        // Indices follow run id order, so this is chronological.
        members.sort_unstable();

        let sequence_id = format!("seq_{}_{:03}", runs[root].date, sequences.len() + 1);
        for (offset, member) in members.iter().enumerate() {
            runs[*member].sequence_id = Some(sequence_id.clone());
            runs[*member].sequence_index = Some(offset + 1);
        }
        let ordered = members.iter().map(|member| &runs[*member]).collect::<Vec<_>>();
        sequences.push(summarize_sequence(sequence_id, &ordered, plateau_window));
    }
    sequences
}

fn summarize_sequence(
    sequence_id: String,
    ordered: &[&RunSummary],
    plateau_window: usize,
) -> SequenceSummary {
    let first = ordered[0];
    let last = ordered[ordered.len() - 1];
    let counts = ordered
        .iter()
        .filter_map(|run| run.findings_failed)
        .collect::<Vec<_>>();

    let (converged, convergence_reason) = if last.verdict == RunVerdict::Pass {
        (true, "final run passed QA")
    } else if plateau_window >= 2
        && ordered.len() >= plateau_window
        && is_plateau(&ordered[ordered.len() - plateau_window..])
    {
        (true, "stable plateau: same failed count, no new failures, unchanged document and completion")
    } else {
        (false, "no passing run and no stable plateau")
    };

    SequenceSummary {
        sequence_id,
        run_ids: ordered.iter().map(|run| run.run_id.clone()).collect(),
        length: ordered.len(),
        first_timestamp: first.timestamp.clone(),
        last_timestamp: last.timestamp.clone(),
        final_verdict: last.verdict,
        best_failed: counts.iter().min().copied(),
        final_failed: last.findings_failed,
        best_completion_pct: ordered
            .iter()
            .map(|run| run.required_sections_completion_pct)
            .fold(0.0, f64::max),
        final_completion_pct: last.required_sections_completion_pct,
        oscillating: oscillates(&counts),
        converged,
        convergence_reason: convergence_reason.to_string(),
    }
}

/// Failed counts that go up and down (or down and up), ignoring flat steps.
pub(crate) fn oscillates(counts: &[usize]) -> bool {
    let mut last_direction = None;
    for pair in counts.windows(2) {
        let direction = pair[1].cmp(&pair[0]);
        if direction.is_eq() {
            continue;
        }
        if last_direction.is_some_and(|previous| previous != direction) {
            return true;
        }
        last_direction = Some(direction);
    }
    false
}

/// The tail shares one failed count, and each run after the first
/// introduced no new failures, kept its document nearly identical and moved
/// completion by at most a point.
fn is_plateau(tail: &[&RunSummary]) -> bool {
    let Some(expected) = tail[0].findings_failed else {
        return false;
    };
    if tail.iter().any(|run| run.findings_failed != Some(expected)) {
        return false;
    }
    tail[1..].iter().all(|run| {
        run.vs_parent.as_ref().is_some_and(|comparison| {
            comparison.introduced_issues == 0
                && comparison
                    .doc_similarity
                    .is_some_and(|similarity| similarity >= STABLE_SIMILARITY)
                && comparison.completion_delta_pct.abs() <= STABLE_COMPLETION_DELTA
        })
    })
}
