// crates/filtergraph-core/src/ids.rs
//
// Arena handles: a filter instance or link is identified by its index into
// the graph's own storage rather than by pointer identity.

/// Index of a `FilterInstance` inside a `Graph`'s instance arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub usize);

/// Index of a `Link` inside a `Graph`'s link arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub usize);
