//! Find the target process by exact name.
use crate::procfs::{ProcError, ProcessHandle, ProcessTable};

/// Why the target process could not be located this tick.
///
/// The supervisor treats both variants the same way: wait and try again.
#[derive(Debug)]
pub enum LocateError {
    /// The process table itself could not be enumerated.
    Enumeration { source: ProcError },
    /// Enumeration worked but no process reported the requested name.
    NotFound { name: String },
}

impl std::fmt::Display for LocateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocateError::Enumeration { source } => {
                write!(f, "failed to enumerate processes: {}", source)
            }
            LocateError::NotFound { name } => write!(f, "no process named {:?}", name),
        }
    }
}

impl std::error::Error for LocateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LocateError::Enumeration { source } => Some(source),
            LocateError::NotFound { .. } => None,
        }
    }
}

/// Return a handle to the first process, in enumeration order, whose name is
/// exactly `name`.
///
/// Matching is case-sensitive with no partial matches. When several processes
/// share the name, the first one enumerated wins; there is no tie-break.
pub fn locate<T: ProcessTable + ?Sized>(
    table: &T,
    name: &str,
) -> Result<ProcessHandle, LocateError> {
    let pids = table
        .list_pids()
        .map_err(|source| LocateError::Enumeration { source })?;

    for pid in pids {
        // Processes routinely exit between listing and opening.
        let Ok(handle) = table.open(pid) else {
            continue;
        };
        if handle.name() == name {
            return Ok(handle);
        }
    }

    Err(LocateError::NotFound {
        name: name.to_string(),
    })
}
