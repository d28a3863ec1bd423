//! Out-of-band cycle collection for lightweight instances
//!
//! Instances are reclaimed by reference counting the moment the last
//! reference drops; the collector exists only for reference cycles, which
//! refcounting alone never frees. It runs trial deletion over the live
//! instance registry: build the reachability graph, count how many strong
//! references to each node come from inside the graph, and treat any node
//! whose strong count exceeds its internal edge count as externally held.
//! Everything reachable from an externally held node survives. Every
//! instance that is not, is part of a dead cycle; its variable slots are
//! zeroed so the cycle breaks and refcounting finishes the job.
//!
//! Deferred-call registrations hold strong references to their targets,
//! so a pending callout keeps its instance out of the dead set without any
//! special casing here.

use crate::context::Context;
use crate::instance::LwoRef;
use crate::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Result of one collector run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Live instances examined
    pub examined: usize,
    /// Instances found in dead cycles and cleared
    pub freed: usize,
}

enum Handle {
    Instance(LwoRef),
    Aggregate(Value),
}

struct Node {
    handle: Handle,
    children: Vec<usize>,
    internal: usize,
}

impl Node {
    /// Strong count excluding the handle this node itself holds
    fn external_candidates(&self) -> usize {
        let count = match &self.handle {
            Handle::Instance(l) => Arc::strong_count(l),
            Handle::Aggregate(Value::Array(a)) => Arc::strong_count(a),
            Handle::Aggregate(Value::Mapping(m)) => Arc::strong_count(m),
            Handle::Aggregate(_) => 1,
        };
        count - 1
    }
}

/// Find dead reference cycles among live instances and break them
pub fn collect_cycles(ctx: &Context) -> GcStats {
    let roots = ctx.live_instances();
    let examined = roots.len();

    // Discovery: one node per instance and per aggregate reachable from
    // one, each holding exactly one handle so strong counts stay exact.
    let mut nodes: FxHashMap<usize, Node> = FxHashMap::default();
    let mut pending: Vec<Value> = Vec::new();

    for lwo in roots {
        let key = Arc::as_ptr(&lwo) as *const () as usize;
        let mut children = Vec::new();
        for var in lwo.snapshot_vars() {
            if let Some(id) = var.identity() {
                children.push(id);
                if !matches!(var, Value::Lwo(_)) {
                    pending.push(var);
                }
            }
        }
        nodes.insert(
            key,
            Node {
                handle: Handle::Instance(lwo),
                children,
                internal: 0,
            },
        );
    }

    while let Some(value) = pending.pop() {
        let key = match value.identity() {
            Some(key) => key,
            None => continue,
        };
        if nodes.contains_key(&key) {
            continue;
        }
        let mut children = Vec::new();
        let mut visit = |item: &Value, pending: &mut Vec<Value>| {
            if let Some(id) = item.identity() {
                children.push(id);
                if !matches!(item, Value::Lwo(_)) {
                    pending.push(item.clone());
                }
            }
        };
        match &value {
            Value::Array(a) => {
                for item in a.read().iter() {
                    visit(item, &mut pending);
                }
            }
            Value::Mapping(m) => {
                for item in m.read().values() {
                    visit(item, &mut pending);
                }
            }
            _ => {}
        }
        nodes.insert(
            key,
            Node {
                handle: Handle::Aggregate(value),
                children,
                internal: 0,
            },
        );
    }

    // Count internal edges, with multiplicity.
    let edges: Vec<usize> = nodes
        .values()
        .flat_map(|n| n.children.iter().copied())
        .collect();
    for id in edges {
        if let Some(node) = nodes.get_mut(&id) {
            node.internal += 1;
        }
    }

    // Liveness floods out from every externally held node.
    let mut live: FxHashSet<usize> = FxHashSet::default();
    let mut queue: Vec<usize> = nodes
        .iter()
        .filter(|(_, n)| n.external_candidates() > n.internal)
        .map(|(k, _)| *k)
        .collect();
    while let Some(id) = queue.pop() {
        if !live.insert(id) {
            continue;
        }
        if let Some(node) = nodes.get(&id) {
            for &child in &node.children {
                if !live.contains(&child) {
                    queue.push(child);
                }
            }
        }
    }

    // Break dead cycles by zeroing the slots of unreachable instances;
    // refcounting reclaims the memory as the node handles drop.
    let mut freed = 0;
    for (id, node) in &nodes {
        if let Handle::Instance(lwo) = &node.handle {
            if !live.contains(id) {
                lwo.clear_vars();
                freed += 1;
            }
        }
    }

    GcStats { examined, freed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callout::CalloutJob;
    use crate::program::ProgramBuilder;

    fn cell_context() -> Context {
        let ctx = Context::new();
        ctx.programs()
            .register(ProgramBuilder::new("/lwo/cell").var("value").build());
        ctx
    }

    #[test]
    fn test_two_instance_cycle_is_collected() {
        let ctx = cell_context();
        let a = ctx.create("/lwo/cell", &[]).unwrap();
        let b = ctx.create("/lwo/cell", &[]).unwrap();
        a.set_var("value", Value::Lwo(b.clone())).unwrap();
        b.set_var("value", Value::Lwo(a.clone())).unwrap();
        drop(a);
        drop(b);

        // Refcounting alone cannot free the pair.
        assert_eq!(ctx.instance_count(), 2);

        let stats = ctx.collect_cycles();
        assert_eq!(stats.examined, 2);
        assert_eq!(stats.freed, 2);
        assert_eq!(ctx.instance_count(), 0);
    }

    #[test]
    fn test_rooted_cycle_survives() {
        let ctx = cell_context();
        let a = ctx.create("/lwo/cell", &[]).unwrap();
        a.set_var("value", Value::Lwo(a.clone())).unwrap();

        let stats = ctx.collect_cycles();
        assert_eq!(stats.freed, 0);
        assert_eq!(a.var("value"), Some(Value::Lwo(a.clone())));

        a.set_var("value", Value::zero()).unwrap();
    }

    #[test]
    fn test_cycle_through_array_is_collected() {
        let ctx = cell_context();
        let a = ctx.create("/lwo/cell", &[]).unwrap();
        a.set_var("value", Value::array(vec![Value::Lwo(a.clone())]))
            .unwrap();
        drop(a);

        assert_eq!(ctx.instance_count(), 1);
        let stats = ctx.collect_cycles();
        assert_eq!(stats.freed, 1);
        assert_eq!(ctx.instance_count(), 0);
    }

    #[test]
    fn test_acyclic_instances_untouched() {
        let ctx = cell_context();
        let a = ctx.create("/lwo/cell", &[]).unwrap();
        a.set_var("value", Value::array(vec![Value::Int(1)]))
            .unwrap();

        let stats = ctx.collect_cycles();
        assert_eq!(stats.examined, 1);
        assert_eq!(stats.freed, 0);
        assert_eq!(ctx.instance_count(), 1);
    }

    #[test]
    fn test_pending_callout_keeps_cycle_alive() {
        let ctx = cell_context();
        let a = ctx.create("/lwo/cell", &[]).unwrap();
        a.set_var("value", Value::Lwo(a.clone())).unwrap();
        let id = ctx.schedule(&a, 5, CalloutJob::method("tick"), vec![]);
        drop(a);

        let stats = ctx.collect_cycles();
        assert_eq!(stats.freed, 0);
        assert_eq!(ctx.instance_count(), 1);

        // Once the registration is gone the cycle is dead.
        ctx.cancel_callout(id);
        let stats = ctx.collect_cycles();
        assert_eq!(stats.freed, 1);
        assert_eq!(ctx.instance_count(), 0);
    }
}
