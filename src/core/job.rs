//! Matrix job domain model

use crate::core::{config::set_binding, matrix::JobSpec, state::JobState};
use std::collections::HashMap;

/// A single isolated run of the pipeline for one matrix entry
#[derive(Debug, Clone)]
pub struct Job {
    pub number: usize,

    pub name: String,

    /// Variables visible to this job, in manifest order
    pub variables: Vec<(String, String)>,

    /// Failure does not fail the pipeline
    pub allow_failure: bool,

    /// Runtime state
    pub state: JobState,
}

impl Job {
    pub fn from_spec(spec: &JobSpec) -> Self {
        Self {
            number: spec.number,
            name: spec.name.clone(),
            variables: spec.variables.clone(),
            allow_failure: spec.allow_failure,
            state: JobState::Pending,
        }
    }

    /// Label used in logs and output (`#3 PYTHON=C:\Python35`)
    pub fn label(&self) -> String {
        format!("#{} {}", self.number, self.name)
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_variable(&mut self, key: String, value: String) {
        set_binding(&mut self.variables, key, value);
    }

    /// Variables available to `{{ name }}` placeholders
    pub fn template_variables(&self) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = self.variables.iter().cloned().collect();
        vars.insert("job_number".to_string(), self.number.to_string());
        vars.insert("job_name".to_string(), self.name.clone());
        vars
    }

    /// Whether this job's result counts against the pipeline
    pub fn counts_as_failure(&self) -> bool {
        self.state.is_failed() && !self.allow_failure
    }
}
