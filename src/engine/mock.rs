//! In-memory engine for tests and demos.
//!
//! [`MockEngine`] implements the full [`Engine`] contract without any
//! real media processing. Transitions apply synchronously, walking the
//! state lattice one hop at a time and publishing a `StateChanged`
//! message per hop; tests script the bus by emitting end-of-stream or
//! error messages directly.
//!
//! Launch descriptions use the usual `!`-chained syntax:
//!
//! ```text
//! filesrc location=/path/to/file ! passthrough ! nullsink
//! ```
//!
//! The mock accepts any stage name (elements are somebody else's
//! problem) but rejects malformed syntax with the parser diagnostic
//! surfaced verbatim.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thunderdome::Arena;
use tracing::debug;
use winnow::Parser;
use winnow::ascii::{alpha1, multispace0};
use winnow::combinator::{alt, delimited, repeat, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

use crate::engine::{BusHandle, ClockHandle, Engine, GraphHandle, MessageHandle, RawMessage};
use crate::error::{Error, Result};
use crate::message::MessageKind;
use crate::state::State;

type WResult<T> = std::result::Result<T, ContextError>;

/// A message sitting on a graph's bus, payload slot already allocated.
struct Pending {
    handle: MessageHandle,
    kind: MessageKind,
    detail: Option<String>,
}

struct Graph {
    name: String,
    state: State,
    auto_flush: bool,
    alive: bool,
    /// `release_graph` invocations, for exactly-once assertions.
    released: u32,
    stages: usize,
    queue: VecDeque<Pending>,
}

impl Graph {
    fn new(name: String, stages: usize) -> Self {
        Self {
            name,
            state: State::Null,
            auto_flush: true,
            alive: true,
            released: 0,
            stages,
            queue: VecDeque::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    graphs: Arena<Graph>,
    /// Live (produced but unreleased) message payload slots.
    messages: Arena<MessageKind>,
    anon_names: u64,
    parse_calls: u64,
}

impl Inner {
    fn enqueue(&mut self, graph: GraphHandle, kind: MessageKind, detail: Option<String>) {
        let handle = MessageHandle(self.messages.insert(kind));
        match self.graphs.get_mut(graph.0) {
            // A torn-down graph publishes nothing.
            Some(g) if g.alive => g.queue.push_back(Pending {
                handle,
                kind,
                detail,
            }),
            _ => {
                self.messages.remove(handle.0);
            }
        }
    }

    /// Discard everything pending on the graph's bus, reclaiming the
    /// payload slots engine-side.
    fn flush(&mut self, graph: GraphHandle) {
        if let Some(g) = self.graphs.get_mut(graph.0) {
            let drained: Vec<Pending> = g.queue.drain(..).collect();
            for pending in drained {
                self.messages.remove(pending.handle.0);
            }
        }
    }

    /// Walk the lattice to `target`, publishing one `StateChanged` per
    /// hop.
    fn walk_to(&mut self, graph: GraphHandle, target: State) {
        loop {
            let Some(g) = self.graphs.get_mut(graph.0) else {
                return;
            };
            let from = g.state;
            let Some(to) = from.step_toward(target) else {
                break;
            };
            g.state = to;
            self.enqueue(graph, MessageKind::StateChanged { from, to }, None);
        }
        let auto_flush = self
            .graphs
            .get(graph.0)
            .map(|g| g.auto_flush)
            .unwrap_or(true);
        if target == State::Null && auto_flush {
            self.flush(graph);
        }
    }

    fn anon_name(&mut self) -> String {
        let n = self.anon_names;
        self.anon_names += 1;
        format!("pipeline{n}")
    }
}

/// Scriptable in-memory media engine.
///
/// Construct once and share via `Arc`, like any engine runtime:
///
/// ```rust
/// use std::sync::Arc;
/// use sluice::engine::MockEngine;
/// use sluice::pipeline::Pipeline;
///
/// let engine = Arc::new(MockEngine::new());
/// let pipeline = Pipeline::new(engine.clone(), "demo").unwrap();
/// assert_eq!(pipeline.state(), sluice::state::State::Null);
/// ```
#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<Inner>,
    fail_next_allocation: AtomicBool,
    reject_transitions: AtomicBool,
}

impl MockEngine {
    /// Create a fresh engine runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an end-of-stream message on the graph's bus.
    pub fn emit_eos(&self, graph: GraphHandle) {
        self.emit(graph, MessageKind::Eos, None);
    }

    /// Queue an error message with the given diagnostic.
    pub fn emit_error(&self, graph: GraphHandle, message: impl Into<String>) {
        self.emit(graph, MessageKind::Error, Some(message.into()));
    }

    /// Queue a message this layer does not classify.
    pub fn emit_other(&self, graph: GraphHandle) {
        self.emit(graph, MessageKind::Other, None);
    }

    fn emit(&self, graph: GraphHandle, kind: MessageKind, detail: Option<String>) {
        self.inner.lock().unwrap().enqueue(graph, kind, detail);
    }

    /// Make the next `new_graph` or `parse_description` fail.
    pub fn fail_next_allocation(&self) {
        self.fail_next_allocation.store(true, Ordering::SeqCst);
    }

    /// Reject (or stop rejecting) all transition requests.
    pub fn reject_transitions(&self, reject: bool) {
        self.reject_transitions.store(reject, Ordering::SeqCst);
    }

    /// Message payloads produced but not yet released.
    pub fn outstanding_messages(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    /// How many times the launch parser has been invoked.
    pub fn parse_calls(&self) -> u64 {
        self.inner.lock().unwrap().parse_calls
    }

    /// How many times `release_graph` ran for this handle.
    pub fn release_count(&self, graph: GraphHandle) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .map(|g| g.released)
            .unwrap_or(0)
    }

    /// Messages currently pending on the graph's bus.
    pub fn pending_on_bus(&self, graph: GraphHandle) -> usize {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .map(|g| g.queue.len())
            .unwrap_or(0)
    }

    /// The graph's name (caller-supplied or engine-generated).
    pub fn graph_name(&self, graph: GraphHandle) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .map(|g| g.name.clone())
    }

    /// Number of stages the graph was parsed or built with.
    pub fn stage_count(&self, graph: GraphHandle) -> usize {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .map(|g| g.stages)
            .unwrap_or(0)
    }

    fn take_allocation_failure(&self) -> Result<()> {
        if self.fail_next_allocation.swap(false, Ordering::SeqCst) {
            return Err(Error::Allocation("engine out of resources".into()));
        }
        Ok(())
    }

    fn apply(&self, graph: GraphHandle, target: State) -> Result<()> {
        if self.reject_transitions.load(Ordering::SeqCst) {
            return Err(Error::StateChange {
                target,
                reason: "transition rejected by engine".into(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let alive = inner.graphs.get(graph.0).map(|g| g.alive).unwrap_or(false);
        if !alive {
            return Err(Error::StateChange {
                target,
                reason: "graph has been released".into(),
            });
        }
        inner.walk_to(graph, target);
        Ok(())
    }
}

impl Engine for MockEngine {
    fn new_graph(&self, name: &str) -> Result<GraphHandle> {
        self.take_allocation_failure()?;
        let mut inner = self.inner.lock().unwrap();
        let name = if name.is_empty() {
            inner.anon_name()
        } else {
            name.to_string()
        };
        debug!(graph = %name, "allocating graph");
        Ok(GraphHandle(inner.graphs.insert(Graph::new(name, 0))))
    }

    fn parse_description(&self, description: &str) -> Result<GraphHandle> {
        self.inner.lock().unwrap().parse_calls += 1;
        self.take_allocation_failure()?;
        let stages = parse_launch(description)?;
        let mut inner = self.inner.lock().unwrap();
        let name = inner.anon_name();
        debug!(graph = %name, stages = stages.len(), "parsed launch description");
        Ok(GraphHandle(
            inner.graphs.insert(Graph::new(name, stages.len())),
        ))
    }

    fn set_state(&self, graph: GraphHandle, target: State) -> Result<()> {
        self.apply(graph, target)
    }

    fn set_state_blocking(&self, graph: GraphHandle, target: State) -> Result<()> {
        // The mock applies transitions synchronously, so blocking and
        // fire-and-forget collapse into the same path.
        self.apply(graph, target)
    }

    fn state(&self, graph: GraphHandle) -> State {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .filter(|g| g.alive)
            .map(|g| g.state)
            .unwrap_or(State::Null)
    }

    fn graph_alive(&self, graph: GraphHandle) -> bool {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(graph.0)
            .map(|g| g.alive)
            .unwrap_or(false)
    }

    fn bus(&self, graph: GraphHandle) -> BusHandle {
        BusHandle(graph.0)
    }

    fn clock(&self, graph: GraphHandle) -> ClockHandle {
        ClockHandle(graph.0)
    }

    fn set_auto_flush(&self, graph: GraphHandle, enabled: bool) {
        if let Some(g) = self.inner.lock().unwrap().graphs.get_mut(graph.0) {
            g.auto_flush = enabled;
        }
    }

    fn poll_message(&self, bus: BusHandle) -> Option<RawMessage> {
        let mut inner = self.inner.lock().unwrap();
        let pending = inner.graphs.get_mut(bus.0)?.queue.pop_front()?;
        Some(RawMessage {
            handle: pending.handle,
            kind: pending.kind,
            detail: pending.detail,
        })
    }

    fn release_message(&self, message: MessageHandle) {
        self.inner.lock().unwrap().messages.remove(message.0);
    }

    fn release_graph(&self, graph: GraphHandle) {
        let mut inner = self.inner.lock().unwrap();
        let flush = {
            let Some(g) = inner.graphs.get_mut(graph.0) else {
                return;
            };
            g.released += 1;
            if !g.alive {
                return;
            }
            g.alive = false;
            debug!(graph = %g.name, "releasing graph");
            g.auto_flush
        };
        if flush {
            inner.flush(graph);
        }
    }
}

// ============================================================================
// Launch description parsing
// ============================================================================

/// A stage in a parsed launch description.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedStage {
    name: String,
    properties: Vec<(String, String)>,
}

/// Parse a launch description string into its stages.
fn parse_launch(input: &str) -> Result<Vec<ParsedStage>> {
    launch
        .parse(input.trim())
        .map_err(|e| Error::Parse(e.to_string()))
}

/// Parse a complete `!`-chained launch description.
fn launch(input: &mut &str) -> WResult<Vec<ParsedStage>> {
    let stages = separated(1.., stage, link_separator).parse_next(input)?;

    // Ensure we consumed all input
    multispace0.parse_next(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }

    Ok(stages)
}

/// Parse a stage (name + optional properties).
fn stage(input: &mut &str) -> WResult<ParsedStage> {
    let _ = multispace0.parse_next(input)?;
    let name: &str = identifier.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    let properties: Vec<(String, String)> = repeat(0.., property).parse_next(input)?;

    Ok(ParsedStage {
        name: name.to_string(),
        properties,
    })
}

/// Parse the link separator `!`.
fn link_separator(input: &mut &str) -> WResult<()> {
    let _ = multispace0.parse_next(input)?;
    let _ = '!'.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(())
}

/// Parse an identifier (stage name or property name).
fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

/// Parse a property (key=value). The mock keeps values as raw strings;
/// interpreting them is the element's job.
fn property(input: &mut &str) -> WResult<(String, String)> {
    let _ = multispace0.parse_next(input)?;

    let checkpoint = *input;

    let key: &str = match identifier.parse_next(input) {
        Ok(k) => k,
        Err(_) => {
            *input = checkpoint;
            return Err(ContextError::new());
        }
    };

    let _ = multispace0.parse_next(input)?;

    if input.starts_with('=') {
        let _ = '='.parse_next(input)?;
    } else {
        // Not a property, backtrack
        *input = checkpoint;
        return Err(ContextError::new());
    }

    let _ = multispace0.parse_next(input)?;
    let value = property_value.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;

    Ok((key.to_string(), value))
}

/// Parse a property value, quoted or bare.
fn property_value(input: &mut &str) -> WResult<String> {
    alt((quoted_string, bare_string)).parse_next(input)
}

/// Parse a quoted string.
fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Parse a bare value. Stops at whitespace, `!` or `=`.
fn bare_string(input: &mut &str) -> WResult<String> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '!' && c != '=')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain() {
        let stages = parse_launch("filesrc location=/in.bin ! passthrough ! nullsink").unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].name, "filesrc");
        assert_eq!(
            stages[0].properties[0],
            ("location".to_string(), "/in.bin".to_string())
        );
        assert_eq!(stages[2].name, "nullsink");
    }

    #[test]
    fn test_parse_quoted_value() {
        let stages = parse_launch(r#"filesrc location="/p with spaces" ! nullsink"#).unwrap();
        assert_eq!(
            stages[0].properties[0],
            ("location".to_string(), "/p with spaces".to_string())
        );
    }

    #[test]
    fn test_parse_no_spaces() {
        let stages = parse_launch("a!b!c").unwrap();
        assert_eq!(stages.len(), 3);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_launch("src ! @@@").is_err());
        assert!(parse_launch("!").is_err());
        assert!(parse_launch("").is_err());
    }

    #[test]
    fn test_generated_names_are_sequential() {
        let engine = MockEngine::new();
        let a = engine.new_graph("").unwrap();
        let b = engine.new_graph("").unwrap();
        assert_eq!(engine.graph_name(a).as_deref(), Some("pipeline0"));
        assert_eq!(engine.graph_name(b).as_deref(), Some("pipeline1"));
    }

    #[test]
    fn test_transition_walks_lattice() {
        let engine = MockEngine::new();
        let graph = engine.new_graph("walk").unwrap();
        engine.set_state(graph, State::Playing).unwrap();
        assert_eq!(engine.state(graph), State::Playing);

        // Null -> Ready -> Paused -> Playing, one message per hop.
        let bus = engine.bus(graph);
        let hops: Vec<MessageKind> = std::iter::from_fn(|| {
            engine.poll_message(bus).map(|raw| {
                let kind = raw.kind;
                engine.release_message(raw.handle);
                kind
            })
        })
        .collect();
        assert_eq!(
            hops,
            vec![
                MessageKind::StateChanged {
                    from: State::Null,
                    to: State::Ready
                },
                MessageKind::StateChanged {
                    from: State::Ready,
                    to: State::Paused
                },
                MessageKind::StateChanged {
                    from: State::Paused,
                    to: State::Playing
                },
            ]
        );
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_auto_flush_on_null_transition() {
        let engine = MockEngine::new();
        let graph = engine.new_graph("flush").unwrap();
        engine.set_state(graph, State::Playing).unwrap();
        engine.emit_other(graph);
        assert!(engine.pending_on_bus(graph) > 0);

        engine.set_state(graph, State::Null).unwrap();
        assert_eq!(engine.pending_on_bus(graph), 0);
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_auto_flush_disabled_keeps_pending() {
        let engine = MockEngine::new();
        let graph = engine.new_graph("noflush").unwrap();
        engine.set_auto_flush(graph, false);
        engine.set_state(graph, State::Ready).unwrap();
        engine.set_state(graph, State::Null).unwrap();
        // The Ready->Null hop message plus the Null->Ready one stay queued.
        assert_eq!(engine.pending_on_bus(graph), 2);
        assert_eq!(engine.outstanding_messages(), 2);
    }

    #[test]
    fn test_release_marks_graph_dead() {
        let engine = MockEngine::new();
        let graph = engine.new_graph("dead").unwrap();
        engine.set_state(graph, State::Ready).unwrap();
        engine.release_graph(graph);

        assert!(!engine.graph_alive(graph));
        assert_eq!(engine.state(graph), State::Null);
        assert_eq!(engine.release_count(graph), 1);
        assert!(matches!(
            engine.set_state(graph, State::Playing),
            Err(Error::StateChange { .. })
        ));
    }

    #[test]
    fn test_allocation_failure_is_one_shot() {
        let engine = MockEngine::new();
        engine.fail_next_allocation();
        assert!(matches!(
            engine.new_graph("x"),
            Err(Error::Allocation(_))
        ));
        assert!(engine.new_graph("x").is_ok());
    }
}
