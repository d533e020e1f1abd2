// src/transformations/testing.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{names, Transformation, TransformationError};
use crate::sheets::definitions::{CellMap, CellValue};

type Behaviour = dyn Fn(usize, &CellMap) -> Result<CellMap, TransformationError> + Send + Sync;

/// Configurable unit for tests. The behaviour receives the call number
/// (starting at 0) and the inputs.
pub struct StubTransformation {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    idempotent: bool,
    calls: Arc<AtomicUsize>,
    behaviour: Box<Behaviour>,
}

impl StubTransformation {
    /// Writes `"<first input>!"` to every output.
    pub fn new(name: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        let first = inputs.first().map(|s| s.to_string());
        let out = names(outputs);
        Self::with_behaviour(name, inputs, outputs, move |_, values| {
            let seed = first
                .as_ref()
                .and_then(|c| values.get(c))
                .map(|v| v.to_string())
                .unwrap_or_default();
            Ok(out
                .iter()
                .map(|o| (o.clone(), CellValue::from(format!("{}!", seed))))
                .collect())
        })
    }

    pub fn with_behaviour<F>(name: &str, inputs: &[&str], outputs: &[&str], behaviour: F) -> Self
    where
        F: Fn(usize, &CellMap) -> Result<CellMap, TransformationError> + Send + Sync + 'static,
    {
        StubTransformation {
            name: name.to_string(),
            inputs: names(inputs),
            outputs: names(outputs),
            idempotent: true,
            calls: Arc::new(AtomicUsize::new(0)),
            behaviour: Box::new(behaviour),
        }
    }

    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    /// Shared counter of `execute` calls, usable after the stub is registered.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Transformation for StubTransformation {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    fn execute(&self, inputs: &CellMap) -> Result<CellMap, TransformationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behaviour)(call, inputs)
    }
}
