//! Graph construction and validation.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::pad::{PadDirection, PadName};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Unique identifier for a node in the graph.
///
/// Node ids index the pipeline's element table and are only meaningful for
/// the pipeline that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// State of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Not yet started.
    #[default]
    Stopped,
    /// Currently running ticks.
    Running,
    /// Ran to completion: every source pad reached end of stream.
    Finished,
    /// A fatal error or cancellation ended the run.
    Error,
}

/// Pad declaration for one element: its name and its ordered source and
/// sink pad short names.
///
/// ```rust
/// use millrace::pipeline::ElementDef;
///
/// let def = ElementDef::transform(["in"], ["out"]).named("double");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ElementDef {
    name: Option<String>,
    source_pads: Vec<String>,
    sink_pads: Vec<String>,
}

impl ElementDef {
    /// Declare a source element: output pads only.
    pub fn source<I, S>(source_pads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            source_pads: source_pads.into_iter().map(Into::into).collect(),
            sink_pads: Vec::new(),
        }
    }

    /// Declare a sink element: input pads only.
    pub fn sink<I, S>(sink_pads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            source_pads: Vec::new(),
            sink_pads: sink_pads.into_iter().map(Into::into).collect(),
        }
    }

    /// Declare a transform element: inputs, then outputs.
    pub fn transform<I, J, S, T>(sink_pads: I, source_pads: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            name: None,
            source_pads: source_pads.into_iter().map(Into::into).collect(),
            sink_pads: sink_pads.into_iter().map(Into::into).collect(),
        }
    }

    /// Give the element a name. Without one, a unique identifier is
    /// generated at insert time; names only matter for diagnostics, pad
    /// addressing, and deterministic ordering.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Runtime state of a source pad.
pub(crate) struct SourcePadState {
    pub(crate) name: PadName,
    /// Set once the pad has emitted a terminal frame.
    pub(crate) eos_sent: bool,
    /// Bound sink pads, in link order (fan-out).
    pub(crate) targets: Vec<(NodeId, usize)>,
}

/// Runtime state of a sink pad.
pub(crate) struct SinkPadState {
    pub(crate) name: PadName,
    /// The upstream source pad, once linked.
    pub(crate) peer: Option<PadName>,
    /// Single-slot buffer for the most recently routed frame.
    pub(crate) slot: Option<Frame>,
    /// Set when a terminal frame has been delivered here.
    pub(crate) eos_received: bool,
    /// Set by the owning element via `PullContext::mark_eos`.
    pub(crate) eos_marked: bool,
}

/// A node in the graph: one element plus its pad states.
pub(crate) struct Node {
    pub(crate) name: String,
    /// The element is taken out of the node while its hooks run, so the
    /// scheduler can hand it pad state from the same table.
    pub(crate) element: Option<Box<dyn Element>>,
    pub(crate) source_pads: Vec<SourcePadState>,
    pub(crate) sink_pads: Vec<SinkPadState>,
    pub(crate) upstream: BTreeSet<NodeId>,
    pub(crate) downstream: BTreeSet<NodeId>,
}

/// Which pad a full name resolves to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PadRef {
    Source(NodeId, usize),
    Sink(NodeId, usize),
}

/// A directed acyclic graph of elements, executed in ticks until every
/// stream reaches end of stream.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::pipeline::{ElementDef, Pipeline};
///
/// let mut pipeline = Pipeline::new();
/// pipeline.insert(ElementDef::source(["out"]).named("count"), Box::new(count))?;
/// pipeline.insert(ElementDef::sink(["in"]).named("print"), Box::new(print))?;
/// pipeline.link("print:snk:in", "count:src:out")?;
/// pipeline.run()?;
/// ```
pub struct Pipeline {
    pub(crate) nodes: Vec<Node>,
    by_name: HashMap<String, NodeId>,
    pads: HashMap<String, PadRef>,
    pub(crate) state: PipelineState,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            pads: HashMap::new(),
            state: PipelineState::Stopped,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current pipeline state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Number of elements in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no elements.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert an element with the given pad declaration.
    ///
    /// Fails if the element name or any resulting pad name is already in
    /// use, if a pad short name repeats within one direction, or if the
    /// declaration has no pads at all.
    pub fn insert(&mut self, def: ElementDef, element: Box<dyn Element>) -> Result<NodeId> {
        let name = match def.name {
            Some(name) => name,
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        check_name(&name)?;
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateElement(name));
        }
        if def.source_pads.is_empty() && def.sink_pads.is_empty() {
            return Err(Error::EmptyElement(name));
        }
        for short in def.source_pads.iter().chain(def.sink_pads.iter()) {
            check_name(short)?;
        }
        for (pads, dir) in [
            (&def.source_pads, PadDirection::Source),
            (&def.sink_pads, PadDirection::Sink),
        ] {
            let mut seen = HashSet::new();
            for short in pads {
                if !seen.insert(short.as_str()) {
                    return Err(Error::DuplicatePad(match dir {
                        PadDirection::Source => PadName::src(name.as_str(), short.as_str()).to_string(),
                        PadDirection::Sink => PadName::snk(name.as_str(), short.as_str()).to_string(),
                    }));
                }
            }
        }

        let id = NodeId(self.nodes.len());
        let source_pads: Vec<SourcePadState> = def
            .source_pads
            .iter()
            .map(|short| SourcePadState {
                name: PadName::src(name.as_str(), short.as_str()),
                eos_sent: false,
                targets: Vec::new(),
            })
            .collect();
        let sink_pads: Vec<SinkPadState> = def
            .sink_pads
            .iter()
            .map(|short| SinkPadState {
                name: PadName::snk(name.as_str(), short.as_str()),
                peer: None,
                slot: None,
                eos_received: false,
                eos_marked: false,
            })
            .collect();

        for (k, pad) in source_pads.iter().enumerate() {
            self.pads.insert(pad.name.to_string(), PadRef::Source(id, k));
        }
        for (k, pad) in sink_pads.iter().enumerate() {
            self.pads.insert(pad.name.to_string(), PadRef::Sink(id, k));
        }

        tracing::debug!(element = %name, "inserted element");
        self.by_name.insert(name.clone(), id);
        self.nodes.push(Node {
            name,
            element: Some(element),
            source_pads,
            sink_pads,
            upstream: BTreeSet::new(),
            downstream: BTreeSet::new(),
        });
        Ok(id)
    }

    /// Bind a sink pad to a source pad, both addressed by full name.
    ///
    /// A source pad may feed any number of sink pads; a sink pad accepts
    /// exactly one upstream. Binding is immutable once made.
    pub fn link(&mut self, sink: &str, source: &str) -> Result<()> {
        let snk_ref = *self
            .pads
            .get(sink)
            .ok_or_else(|| Error::UnknownPad(sink.to_string()))?;
        let src_ref = *self
            .pads
            .get(source)
            .ok_or_else(|| Error::UnknownPad(source.to_string()))?;
        let ((snk_id, snk_idx), (src_id, src_idx)) = match (snk_ref, src_ref) {
            (PadRef::Sink(a, b), PadRef::Source(c, d)) => ((a, b), (c, d)),
            _ => {
                return Err(Error::LinkDirection {
                    snk: sink.to_string(),
                    src: source.to_string(),
                })
            }
        };

        let snk_pad = &mut self.nodes[snk_id.0].sink_pads[snk_idx];
        if snk_pad.peer.is_some() {
            return Err(Error::AlreadyLinked(snk_pad.name.to_string()));
        }
        let src_name = self.nodes[src_id.0].source_pads[src_idx].name.clone();
        self.nodes[snk_id.0].sink_pads[snk_idx].peer = Some(src_name);
        self.nodes[src_id.0].source_pads[src_idx]
            .targets
            .push((snk_id, snk_idx));
        tracing::debug!(sink, source, "linked pads");
        Ok(())
    }

    /// Bind several edges at once; each pair is `(sink, source)`.
    pub fn link_many<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (sink, source) in pairs {
            self.link(sink, source)?;
        }
        Ok(())
    }

    /// Look up an element id by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// The name of an element.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.name.as_str())
    }

    /// The element's source pads, in declaration order.
    pub fn srcs(&self, id: NodeId) -> Vec<PadName> {
        self.nodes
            .get(id.0)
            .map(|n| n.source_pads.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// The element's sink pads, in declaration order.
    pub fn snks(&self, id: NodeId) -> Vec<PadName> {
        self.nodes
            .get(id.0)
            .map(|n| n.sink_pads.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Names of the elements directly upstream of `id`.
    ///
    /// Populated by validation, i.e. available after [`Pipeline::run`].
    pub fn upstream(&self, id: NodeId) -> Vec<&str> {
        self.nodes
            .get(id.0)
            .map(|n| {
                n.upstream
                    .iter()
                    .map(|u| self.nodes[u.0].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the elements directly downstream of `id`.
    ///
    /// Populated by validation, i.e. available after [`Pipeline::run`].
    pub fn downstream(&self, id: NodeId) -> Vec<&str> {
        self.nodes
            .get(id.0)
            .map(|n| {
                n.downstream
                    .iter()
                    .map(|d| self.nodes[d.0].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate the graph and compute the execution order.
    ///
    /// Checks that every sink pad is bound, records upstream and downstream
    /// neighbor sets, and topologically sorts the elements (Kahn's
    /// algorithm, element name as tie-breaker so execution is
    /// deterministic). A cycle is reported with its participants.
    pub(crate) fn validate(&mut self) -> Result<Vec<NodeId>> {
        for node in &self.nodes {
            for pad in &node.sink_pads {
                if pad.peer.is_none() {
                    return Err(Error::UnlinkedPad(pad.name.to_string()));
                }
            }
        }

        let n = self.nodes.len();
        let mut upstream: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); n];
        let mut downstream: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for pad in &node.source_pads {
                for &(target, _) in &pad.targets {
                    downstream[i].insert(target);
                    upstream[target.0].insert(NodeId(i));
                }
            }
        }

        let mut indegree: Vec<usize> = upstream.iter().map(|set| set.len()).collect();
        let mut ready: BTreeSet<(String, NodeId)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] == 0)
            .map(|(i, node)| (node.name.clone(), NodeId(i)))
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some((_, id)) = ready.pop_first() {
            order.push(id);
            for &next in &downstream[id.0] {
                indegree[next.0] -= 1;
                if indegree[next.0] == 0 {
                    ready.insert((self.nodes[next.0].name.clone(), next));
                }
            }
        }

        if order.len() != n {
            let ordered: HashSet<NodeId> = order.iter().copied().collect();
            let mut cycle: Vec<String> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| !ordered.contains(&NodeId(*i)))
                .map(|(_, node)| node.name.clone())
                .collect();
            cycle.sort();
            return Err(Error::CycleDetected(cycle));
        }

        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.upstream = std::mem::take(&mut upstream[i]);
            node.downstream = std::mem::take(&mut downstream[i]);
        }
        Ok(order)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.node_count())
            .field("state", &self.state)
            .finish()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(':') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    struct Inert;
    impl Element for Inert {}

    fn transform(p: &mut Pipeline, name: &str) -> NodeId {
        p.insert(
            ElementDef::transform(["in"], ["out"]).named(name),
            Box::new(Inert),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut p = Pipeline::new();
        let id = p
            .insert(ElementDef::source(["out"]).named("count"), Box::new(Inert))
            .unwrap();
        assert_eq!(p.node_id("count"), Some(id));
        assert_eq!(p.element_name(id), Some("count"));
        assert_eq!(p.srcs(id)[0].to_string(), "count:src:out");
        assert!(p.snks(id).is_empty());
    }

    #[test]
    fn test_generated_names_are_unique() {
        let mut p = Pipeline::new();
        let a = p
            .insert(ElementDef::source(["out"]), Box::new(Inert))
            .unwrap();
        let b = p
            .insert(ElementDef::source(["out"]), Box::new(Inert))
            .unwrap();
        assert_ne!(p.element_name(a), p.element_name(b));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut p = Pipeline::new();
        p.insert(ElementDef::source(["out"]).named("a"), Box::new(Inert))
            .unwrap();
        assert!(matches!(
            p.insert(ElementDef::source(["out"]).named("a"), Box::new(Inert)),
            Err(Error::DuplicateElement(_))
        ));
        assert!(matches!(
            p.insert(
                ElementDef::source(["x", "x"]).named("b"),
                Box::new(Inert)
            ),
            Err(Error::DuplicatePad(_))
        ));
        assert!(matches!(
            p.insert(ElementDef::default().named("c"), Box::new(Inert)),
            Err(Error::EmptyElement(_))
        ));
        assert!(matches!(
            p.insert(ElementDef::source(["out"]).named("d:e"), Box::new(Inert)),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_link_errors() {
        let mut p = Pipeline::new();
        p.insert(ElementDef::source(["out"]).named("src"), Box::new(Inert))
            .unwrap();
        p.insert(ElementDef::sink(["in"]).named("snk"), Box::new(Inert))
            .unwrap();

        assert!(matches!(
            p.link("snk:snk:in", "missing:src:out"),
            Err(Error::UnknownPad(_))
        ));
        assert!(matches!(
            p.link("src:src:out", "snk:snk:in"),
            Err(Error::LinkDirection { .. })
        ));

        p.link("snk:snk:in", "src:src:out").unwrap();
        assert!(matches!(
            p.link("snk:snk:in", "src:src:out"),
            Err(Error::AlreadyLinked(_))
        ));
    }

    #[test]
    fn test_validate_unlinked_pad() {
        let mut p = Pipeline::new();
        transform(&mut p, "lonely");
        let err = p.validate().unwrap_err();
        match err {
            Error::UnlinkedPad(pad) => assert_eq!(pad, "lonely:snk:in"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_topological_order_deterministic() {
        let mut p = Pipeline::new();
        // Two parallel chains; ties broken by name, so "alpha" precedes
        // "beta" at equal depth.
        p.insert(ElementDef::source(["out"]).named("zsrc"), Box::new(Inert))
            .unwrap();
        let a = transform(&mut p, "alpha");
        let b = transform(&mut p, "beta");
        p.link("alpha:snk:in", "zsrc:src:out").unwrap();
        p.link("beta:snk:in", "zsrc:src:out").unwrap();

        let order = p.validate().unwrap();
        let names: Vec<&str> = order
            .iter()
            .map(|id| p.element_name(*id).unwrap())
            .collect();
        assert_eq!(names, ["zsrc", "alpha", "beta"]);

        assert_eq!(p.upstream(a), ["zsrc"]);
        assert_eq!(p.upstream(b), ["zsrc"]);
        assert_eq!(p.downstream(p.node_id("zsrc").unwrap()), ["alpha", "beta"]);
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut p = Pipeline::new();
        transform(&mut p, "a");
        transform(&mut p, "b");
        p.link("b:snk:in", "a:src:out").unwrap();
        p.link("a:snk:in", "b:src:out").unwrap();

        match p.validate().unwrap_err() {
            Error::CycleDetected(names) => assert_eq!(names, ["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
