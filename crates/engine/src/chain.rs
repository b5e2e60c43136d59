//! Chain index and flow validation.
//!
//! A flow is a singly linked chain: every step has at most one outgoing
//! connection.  [`ChainIndex`] is built once per run and answers the three
//! lookups the executor needs in O(1).
//!
//! Rules enforced while building the index:
//! 1. Step IDs must be unique within the flow.
//! 2. A step may connect to at most one target (repeats of the same
//!    connection are collapsed).
//!
//! [`validate_flow`] adds the checks a caller wants before accepting a flow:
//! known connection endpoints, exactly one start step, and no revisited step
//! on the walk from start.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::models::{FlowModel, Step};

/// Read-only lookups over a [`FlowModel`].
#[derive(Debug)]
pub struct ChainIndex<'a> {
    steps: HashMap<&'a str, &'a Step>,
    next: HashMap<&'a str, &'a str>,
    starts: Vec<&'a Step>,
}

impl<'a> ChainIndex<'a> {
    /// Index the flow's steps by ID and its connections by source.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateStepId`] if two steps share an ID.
    /// - [`EngineError::MultipleOutgoing`] if a step has more than one outgoing connection.
    pub fn build(flow: &'a FlowModel) -> Result<Self, EngineError> {
        let mut steps = HashMap::with_capacity(flow.steps.len());
        for step in &flow.steps {
            if steps.insert(step.id.as_str(), step).is_some() {
                return Err(EngineError::DuplicateStepId { step_id: step.id.clone() });
            }
        }

        let mut next = HashMap::with_capacity(flow.connections.len());
        for conn in &flow.connections {
            match next.entry(conn.source.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(conn.target.as_str());
                }
                // Repeated connection to the same target.
                Entry::Occupied(slot) if *slot.get() == conn.target => {}
                Entry::Occupied(_) => {
                    let count = flow
                        .connections
                        .iter()
                        .filter(|c| c.source == conn.source)
                        .map(|c| c.target.as_str())
                        .collect::<HashSet<_>>()
                        .len();
                    return Err(EngineError::MultipleOutgoing {
                        step_id: conn.source.clone(),
                        count,
                    });
                }
            }
        }

        let starts = flow.steps.iter().filter(|s| s.is_start()).collect();

        Ok(Self { steps, next, starts })
    }

    /// Step with the given ID, if present.
    pub fn find_step(&self, id: &str) -> Option<&'a Step> {
        self.steps.get(id).copied()
    }

    /// Target of the connection leaving `id`, if any.
    pub fn next_step_id(&self, id: &str) -> Option<&'a str> {
        self.next.get(id).copied()
    }

    /// The flow's start step.
    ///
    /// Returns `Ok(None)` when there is none and
    /// [`EngineError::MultipleStarts`] when the start is ambiguous.
    pub fn find_start(&self) -> Result<Option<&'a Step>, EngineError> {
        match self.starts.as_slice() {
            [] => Ok(None),
            [start] => Ok(Some(*start)),
            many => Err(EngineError::MultipleStarts { count: many.len() }),
        }
    }
}

/// Validate a flow and return the IDs of the steps visited from start, in order.
///
/// # Errors
/// Any [`EngineError`]: duplicate IDs, multiple outgoing connections,
/// unknown endpoints, a missing or ambiguous start, or a walk that revisits a step.
pub fn validate_flow(flow: &FlowModel) -> Result<Vec<String>, EngineError> {
    let index = ChainIndex::build(flow)?;

    for conn in &flow.connections {
        if index.find_step(&conn.source).is_none() {
            return Err(EngineError::UnknownStepReference {
                step_id: conn.source.clone(),
                side: "source",
            });
        }
        if index.find_step(&conn.target).is_none() {
            return Err(EngineError::UnknownStepReference {
                step_id: conn.target.clone(),
                side: "target",
            });
        }
    }

    let start = index.find_start()?.ok_or(EngineError::MissingStart)?;

    let mut order = vec![start.id.clone()];
    let mut seen: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut current = index.next_step_id(&start.id);

    while let Some(id) = current {
        if !seen.insert(id) {
            return Err(EngineError::Cycle { step_id: id.to_owned() });
        }
        order.push(id.to_owned());
        current = index.next_step_id(id);
    }

    Ok(order)
}
