//! Matrix expansion - one job per `environment.matrix` entry

use crate::core::config::{bindings_contain, set_binding, Bindings, ManifestConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A job produced by expanding the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// 1-based position in the matrix
    pub number: usize,

    /// `KEY=value, ...` of the matrix entry, or `default`
    pub name: String,

    /// The matrix entry's own bindings
    pub matrix_bindings: Bindings,

    /// Global bindings overlaid with the matrix entry
    pub variables: Bindings,

    /// Failure of this job does not fail the pipeline
    pub allow_failure: bool,
}

/// Display name for a matrix entry
pub fn job_name(bindings: &Bindings) -> String {
    if bindings.is_empty() {
        return "default".to_string();
    }
    bindings
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Expand the manifest's matrix into jobs
///
/// An empty matrix still yields one job carrying only the global variables.
pub fn expand(config: &ManifestConfig) -> Result<Vec<JobSpec>> {
    let globals = config.global_bindings()?;
    let allow_failures = config.allow_failures()?;
    let mut entries = config.matrix_entries()?;
    if entries.is_empty() {
        entries.push(Bindings::new());
    }

    let jobs = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut variables = globals.clone();
            for (key, value) in &entry {
                set_binding(&mut variables, key.clone(), value.clone());
            }

            let allow_failure = allow_failures
                .iter()
                .any(|allowed| bindings_contain(&entry, allowed));

            JobSpec {
                number: index + 1,
                name: job_name(&entry),
                matrix_bindings: entry,
                variables,
                allow_failure,
            }
        })
        .collect();

    Ok(jobs)
}
