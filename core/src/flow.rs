//! Flow-direction solver (spec.md §4.C): resolves each agnostic port to
//! push or pull by union-find over the bipartite graph of agnostic ports
//! joined by connections, then propagating any fixed-direction neighbor's
//! constraint across the whole connected component.
//!
//! This module's internals (the union-find structure itself) are original:
//! no union-find reference file was available in the retrieval pack. Its
//! place in the bring-up pipeline — run once after elements are
//! constructed, before `initialize` — follows the two-phase
//! build-then-wire order the router's construction policy describes.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::port::Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub elem: usize,
    pub is_output: bool,
    pub port: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> UnionFind {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// Input to the solver: a flow declaration per (element, is_output, port)
/// and the connection list. The caller (Router) builds this from each
/// element's `Processing` string and port counts.
pub fn resolve(
    port_flows: &HashMap<PortRef, Flow>,
    connections: &[Connection],
) -> Result<HashMap<PortRef, Flow>, String> {
    let mut agnostic_nodes: HashMap<PortRef, usize> = HashMap::new();
    for (&port, &flow) in port_flows {
        if flow == Flow::Agnostic {
            let id = agnostic_nodes.len();
            agnostic_nodes.insert(port, id);
        }
    }
    let mut uf = UnionFind::new(agnostic_nodes.len().max(1));
    // constraint[component_root] = Some(required direction), None = unconstrained yet.
    let mut constraint: HashMap<usize, Flow> = HashMap::new();

    fn apply_constraint(uf: &mut UnionFind, constraint: &mut HashMap<usize, Flow>, node: usize, want: Flow) -> Result<(), String> {
        let root = uf.find(node);
        match constraint.get(&root) {
            None => {
                constraint.insert(root, want);
                Ok(())
            }
            Some(&existing) if existing == want => Ok(()),
            Some(_) => Err("indeterminate agnostic component: conflicting push/pull constraints".to_string()),
        }
    }

    for conn in connections {
        let out_ref = PortRef { elem: conn.from_elem, is_output: true, port: conn.from_port };
        let in_ref = PortRef { elem: conn.to_elem, is_output: false, port: conn.to_port };
        let out_flow = *port_flows.get(&out_ref).ok_or_else(|| format!("missing flow for {out_ref:?}"))?;
        let in_flow = *port_flows.get(&in_ref).ok_or_else(|| format!("missing flow for {in_ref:?}"))?;

        match (out_flow, in_flow) {
            (Flow::Agnostic, Flow::Agnostic) => {
                uf.union(agnostic_nodes[&out_ref], agnostic_nodes[&in_ref]);
            }
            (Flow::Agnostic, fixed) => {
                apply_constraint(&mut uf, &mut constraint, agnostic_nodes[&out_ref], fixed)?;
            }
            (fixed, Flow::Agnostic) => {
                apply_constraint(&mut uf, &mut constraint, agnostic_nodes[&in_ref], fixed)?;
            }
            (a, b) if a == b => {}
            (a, b) => {
                return Err(format!(
                    "port direction mismatch on connection {:?}->{:?}: {a:?} vs {b:?}",
                    out_ref, in_ref
                ));
            }
        }
    }

    let mut resolved = HashMap::with_capacity(port_flows.len());
    for (&port, &flow) in port_flows {
        let direction = match flow {
            Flow::Push | Flow::Pull => flow,
            Flow::Agnostic => {
                let root = uf.find(agnostic_nodes[&port]);
                constraint.get(&root).copied().unwrap_or(Flow::Push)
            }
        };
        resolved.insert(port, direction);
    }
    Ok(resolved)
}
