// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Topological scheduling of the two descriptor groups.
//!
//! One pass over the characterized snippets builds both graphs:
//!
//! - every ordinary `requires` edge runs provider → consumer in the
//!   install graph and consumer → provider in the remove graph;
//! - an implementor condition runs provider → consumer in **both**
//!   graphs, because the loader evaluates conditions during removal
//!   too. A condition provider with nothing to undeploy has its remove
//!   commands proxied to its install commands for the same reason.
//!
//! Draining is plain Kahn's algorithm with a twist when the ready set
//! runs dry: first every blocked snippet gets a chance to break the
//! cycle (the base-UDT shell/subsume maneuver), then snippets waiting
//! only on an unprovided implementor condition are let through, and
//! only then is the situation an error — one per consumer still
//! waiting.
//!
//! Tie-breaking is first-come-first-served unless reproducible output
//! was requested, in which case the ready set is a priority queue over
//! `(implementor, install SQL, remove SQL)`.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque}
};

use crate::{
    emit::EmitItem,
    graph::{Dag, VertexId, VertexPair},
    report::Reporter,
    snippet::{Snippet, UdtShell},
    tag::DependTag
};

/// Vertex payload: the snippet it schedules, plus the remove-direction
/// proxy flag for implementor-condition providers.
#[derive(Debug, Clone, Copy)]
struct VPayload {
    snippet: usize,
    use_deploy_for_undeploy: bool,
}

/// Deterministic tie-break key for reproducible mode.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TieKey {
    implementor: Option<String>,
    deploy: Vec<String>,
    undeploy: Vec<String>,
}

impl TieKey {
    fn of(snippet: &Snippet) -> Self {
        Self {
            implementor: snippet.implementor().map(str::to_ascii_lowercase),
            deploy: snippet.deploy_strings(),
            undeploy: snippet.undeploy_strings()
        }
    }
}

/// The ready set, FIFO by default, ordered in reproducible mode.
enum ReadyQueue {
    Fifo(VecDeque<VertexId>),
    Sorted(BinaryHeap<Reverse<(TieKey, VertexId)>>),
}

impl ReadyQueue {
    fn new(reproducible: bool) -> Self {
        if reproducible {
            Self::Sorted(BinaryHeap::new())
        } else {
            Self::Fifo(VecDeque::new())
        }
    }

    fn push(&mut self, v: VertexId, snippets: &[Snippet], dag: &Dag<VPayload>) {
        match self {
            Self::Fifo(q) => q.push_back(v),
            Self::Sorted(h) => {
                let key = TieKey::of(&snippets[dag.payload(v).snippet]);
                h.push(Reverse((key, v)));
            }
        }
    }

    fn pop(&mut self) -> Option<VertexId> {
        match self {
            Self::Fifo(q) => q.pop_front(),
            Self::Sorted(h) => h.pop().map(|Reverse((_, v))| v)
        }
    }
}

/// Schedule both groups.
///
/// Returns the install and remove command lists, or `None` after
/// reporting scheduling errors.
pub fn schedule(
    snippets: &mut Vec<Snippet>,
    reproducible: bool,
    default_implementor: Option<&str>,
    reporter: &mut Reporter
) -> Option<(Vec<EmitItem>, Vec<EmitItem>)> {
    let n = snippets.len();
    let mut fwd: Dag<VPayload> = Dag::new();
    let mut rev: Dag<VPayload> = Dag::new();
    let mut pairs: Vec<VertexPair> = Vec::with_capacity(n);
    for i in 0..n {
        let fwd_v = fwd.add(VPayload {
            snippet: i,
            use_deploy_for_undeploy: false
        });
        let rev_v = rev.add(VPayload {
            snippet: i,
            use_deploy_for_undeploy: false
        });
        pairs.push(VertexPair {
            fwd: fwd_v,
            rev: rev_v
        });
    }

    // provider maps
    let mut providers: BTreeMap<DependTag, Vec<usize>> = BTreeMap::new();
    let mut implementor_providers: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, s) in snippets.iter().enumerate() {
        for tag in s.provide_tags() {
            providers.entry(tag.clone()).or_default().push(i);
            if let DependTag::Explicit(name) = tag {
                implementor_providers
                    .entry(name.to_ascii_lowercase())
                    .or_default()
                    .push(i);
            }
        }
    }
    let mut fatal = false;
    for (tag, ps) in &providers {
        if ps.len() > 1 && !matches!(tag, DependTag::Explicit(_)) {
            reporter.error(format!("tag {tag} has more than one provider"));
            fatal = true;
        }
    }

    // requires edges
    for (i, s) in snippets.iter().enumerate() {
        for tag in s.require_tags() {
            match providers.get(tag) {
                Some(ps) => {
                    for &p in ps {
                        if p == i {
                            continue;
                        }
                        fwd.precede(pairs[p].fwd, pairs[i].fwd);
                        rev.precede(pairs[i].rev, pairs[p].rev);
                    }
                }
                None => {
                    if matches!(tag, DependTag::Explicit(_)) {
                        reporter.error(format!("tag {tag} is required but nothing provides it"));
                        fatal = true;
                    }
                    // derived tags with no declared provider are assumed
                    // to exist in the database already
                }
            }
        }
    }

    // implementor conditions: same direction in both graphs
    let default_folded = default_implementor.map(str::to_ascii_lowercase);
    let mut bumped: BTreeSet<usize> = BTreeSet::new();
    for (i, s) in snippets.iter().enumerate() {
        let Some(name) = s.implementor() else {
            continue;
        };
        let folded = name.to_ascii_lowercase();
        match implementor_providers.get(&folded) {
            Some(ps) => {
                for &p in ps {
                    if p == i {
                        continue;
                    }
                    fwd.precede(pairs[p].fwd, pairs[i].fwd);
                    rev.precede(pairs[p].rev, pairs[i].rev);
                }
            }
            None => {
                if Some(&folded) != default_folded.as_ref() {
                    fwd.bump_indegree(pairs[i].fwd);
                    rev.bump_indegree(pairs[i].rev);
                    bumped.insert(i);
                }
            }
        }
    }

    // a condition provider with no remove commands still has to put the
    // condition in the remove group
    for ps in implementor_providers.values() {
        for &p in ps {
            if snippets[p].undeploy_strings().is_empty() {
                rev.payload_mut(pairs[p].rev).use_deploy_for_undeploy = true;
            }
        }
    }

    if fatal {
        return None;
    }

    let install_order = drain(snippets, &mut fwd, true, reproducible, &bumped, reporter)?;
    let remove_order = drain(snippets, &mut rev, false, reproducible, &bumped, reporter)?;

    let mut install = Vec::new();
    for v in install_order {
        let p = *fwd.payload(v);
        let s = &snippets[p.snippet];
        for sql in s.deploy_strings() {
            install.push(EmitItem {
                implementor: s.implementor().map(str::to_owned),
                sql
            });
        }
    }
    let mut remove = Vec::new();
    for v in remove_order {
        let p = *rev.payload(v);
        let s = &snippets[p.snippet];
        let strings = if p.use_deploy_for_undeploy {
            s.deploy_strings()
        } else {
            s.undeploy_strings()
        };
        for sql in strings {
            remove.push(EmitItem {
                implementor: s.implementor().map(str::to_owned),
                sql
            });
        }
    }
    Some((install, remove))
}

/// Drain one graph to a total order.
fn drain(
    snippets: &mut Vec<Snippet>,
    dag: &mut Dag<VPayload>,
    deploying: bool,
    reproducible: bool,
    bumped: &BTreeSet<usize>,
    reporter: &mut Reporter
) -> Option<Vec<VertexId>> {
    let mut ready = ReadyQueue::new(reproducible);
    let mut emitted: Vec<bool> = vec![false; dag.len()];
    for v in dag.ids() {
        if dag.indegree(v) == 0 {
            ready.push(v, snippets, dag);
        }
    }
    let mut out = Vec::new();
    loop {
        while let Some(v) = ready.pop() {
            if emitted[v.index()] {
                continue;
            }
            emitted[v.index()] = true;
            out.push(v);
            for freed in dag.release(v) {
                ready.push(freed, snippets, dag);
            }
        }
        let blocked: Vec<VertexId> = dag
            .ids()
            .into_iter()
            .filter(|v| !emitted[v.index()] && dag.indegree(*v) > 0)
            .collect();
        if blocked.is_empty() {
            return Some(out);
        }

        // give every blocked snippet a chance to break the cycle; new
        // vertices go in as one batch so reproducible mode stays stable
        let mut broke: Vec<VertexId> = Vec::new();
        for &v in &blocked {
            if let Some(nv) = try_break_cycle(snippets, dag, v, deploying) {
                broke.push(nv);
            }
        }
        if !broke.is_empty() {
            emitted.resize(dag.len(), false);
            for v in broke {
                if dag.indegree(v) == 0 {
                    ready.push(v, snippets, dag);
                }
            }
            continue;
        }

        // nothing broke: admit a snippet waiting only on its own
        // unprovided implementor condition
        let mut candidates: Vec<VertexId> = blocked
            .iter()
            .copied()
            .filter(|v| dag.indegree(*v) == 1 && bumped.contains(&dag.payload(*v).snippet))
            .collect();
        if !candidates.is_empty() {
            if reproducible {
                candidates.sort_by(|a, b| {
                    TieKey::of(&snippets[dag.payload(*a).snippet])
                        .cmp(&TieKey::of(&snippets[dag.payload(*b).snippet]))
                });
            }
            let v = candidates[0];
            dag.zero_indegree(v);
            ready.push(v, snippets, dag);
            continue;
        }

        // truly stuck: report every consumer still waiting
        for &v in &blocked {
            let s = &snippets[dag.payload(v).snippet];
            for tag in s.require_tags() {
                reporter.error(format!(
                    "cannot order {} before its consumer: dependency cycle or missing provider",
                    tag
                ));
            }
            if s.require_tags().is_empty() {
                reporter.error(
                    "a snippet is stuck behind an unsatisfiable implementor condition".to_owned()
                );
            }
        }
        return None;
    }
}

/// The base-UDT cycle breaker.
///
/// Installing, a shell vertex takes over the edges to the type's I/O
/// functions so `CREATE TYPE name` runs first. Removing, the functions
/// are subsumed under the type's `DROP TYPE ... CASCADE` and the type
/// is forced ready.
fn try_break_cycle(
    snippets: &mut Vec<Snippet>,
    dag: &mut Dag<VPayload>,
    v: VertexId,
    deploying: bool
) -> Option<VertexId> {
    let sidx = dag.payload(v).snippet;
    let (owner, implementor) = match &snippets[sidx] {
        Snippet::BaseUdt(u) => (u.qname.clone(), u.implementor.clone()),
        _ => return None
    };
    let subset = dag.precedes_transitively(v, v)?;
    for m in &subset {
        let mi = dag.payload(*m).snippet;
        match &snippets[mi] {
            Snippet::UdtIoFunction(io) if io.owner == owner => {}
            _ => return None
        }
    }
    if deploying {
        snippets.push(Snippet::UdtShell(UdtShell::new(owner, implementor)));
        let shell = dag.add(VPayload {
            snippet: snippets.len() - 1,
            use_deploy_for_undeploy: false
        });
        dag.transfer_successors(v, shell, &subset);
        Some(shell)
    } else {
        for m in &subset {
            let mi = dag.payload(*m).snippet;
            if let Snippet::UdtIoFunction(io) = &mut snippets[mi] {
                io.subsumed = true;
            }
        }
        dag.zero_indegree(v);
        Some(v)
    }
}
