//! Max-flow / min-cut on a capacity graph (Dinic's algorithm).
//!
//! Edges are stored in forward-star arrays; edge `e` and its residual twin are
//! `e` and `e ^ 1`.

use std::collections::VecDeque;

const NONE: usize = usize::MAX;
/// Residual capacities at or below this are treated as saturated.
const EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct FlowGraph {
    head: Vec<usize>,
    next: Vec<usize>,
    to: Vec<usize>,
    cap: Vec<f64>,
    level: Vec<i32>,
    current: Vec<usize>,
}

impl FlowGraph {
    /// A graph with `nodes` nodes and room for `edge_hint` edge pairs.
    pub fn new(nodes: usize, edge_hint: usize) -> Self {
        Self {
            head: vec![NONE; nodes],
            next: Vec::with_capacity(edge_hint * 2),
            to: Vec::with_capacity(edge_hint * 2),
            cap: Vec::with_capacity(edge_hint * 2),
            level: vec![-1; nodes],
            current: vec![NONE; nodes],
        }
    }

    fn push_arc(&mut self, u: usize, v: usize, cap: f64) {
        self.to.push(v);
        self.cap.push(cap);
        self.next.push(self.head[u]);
        self.head[u] = self.to.len() - 1;
    }

    /// Adds `u -> v` with capacity `cap` and `v -> u` with capacity `rev_cap`.
    pub fn add_edge(&mut self, u: usize, v: usize, cap: f64, rev_cap: f64) {
        self.push_arc(u, v, cap);
        self.push_arc(v, u, rev_cap);
    }

    fn bfs(&mut self, s: usize, t: usize) -> bool {
        self.level.fill(-1);
        self.level[s] = 0;
        let mut queue = VecDeque::from([s]);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] < 0 {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
                e = self.next[e];
            }
        }
        self.level[t] >= 0
    }

    fn blocking_flow(&mut self, s: usize, t: usize) -> f64 {
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = s;
        loop {
            if u == t {
                let flow = path
                    .iter()
                    .map(|&e| self.cap[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.cap[e] -= flow;
                    self.cap[e ^ 1] += flow;
                }
                total += flow;
                // Resume from the tail of the first saturated edge.
                let k = path
                    .iter()
                    .position(|&e| self.cap[e] <= EPS)
                    .unwrap_or(0);
                path.truncate(k);
                u = path.last().map_or(s, |&e| self.to[e]);
                continue;
            }

            let mut advanced = false;
            while self.current[u] != NONE {
                let e = self.current[u];
                let v = self.to[e];
                if self.cap[e] > EPS && self.level[v] == self.level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.current[u] = self.next[e];
            }
            if advanced {
                continue;
            }

            // Dead end: retreat one edge and skip it.
            match path.pop() {
                None => break,
                Some(e) => {
                    u = self.to[e ^ 1];
                    self.current[u] = self.next[self.current[u]];
                }
            }
        }
        total
    }

    /// Pushes the maximum flow from `s` to `t` and returns its value.
    pub fn max_flow(&mut self, s: usize, t: usize) -> f64 {
        let mut flow = 0.0;
        while self.bfs(s, t) {
            self.current.copy_from_slice(&self.head);
            flow += self.blocking_flow(s, t);
        }
        flow
    }

    /// Nodes reachable from `s` in the residual graph, i.e. the source side of a
    /// minimum cut once [`max_flow`](Self::max_flow) has run.
    pub fn source_side(&self, s: usize) -> Vec<bool> {
        let mut seen = vec![false; self.head.len()];
        seen[s] = true;
        let mut stack = vec![s];
        while let Some(u) = stack.pop() {
            let mut e = self.head[u];
            while e != NONE {
                let v = self.to[e];
                if self.cap[e] > EPS && !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
                e = self.next[e];
            }
        }
        seen
    }
}
