//! Shared compilation cache
//!
//! Health rules are evaluated once per resource per reconcile tick, so the
//! same expressions compile over and over. Compiled programs are cached
//! process-wide, keyed by the expression text plus the sorted declared
//! variable names. The cache is flushed wholesale when it outgrows its bound;
//! rule sets are small and stable enough that eviction order does not matter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::program::Program;

const MAX_CACHED_PROGRAMS: usize = 1024;

static PROGRAMS: Lazy<RwLock<HashMap<String, Arc<Program>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the cached program for `expression` under `variables`, compiling
/// and inserting it on a miss. Compilation failures are not cached.
pub fn cached_program(expression: &str, variables: &[&str]) -> Result<Arc<Program>> {
    let key = cache_key(expression, variables);

    if let Ok(programs) = PROGRAMS.read()
        && let Some(program) = programs.get(&key)
    {
        return Ok(Arc::clone(program));
    }

    let program = Arc::new(Program::compile(expression, variables)?);
    if let Ok(mut programs) = PROGRAMS.write() {
        if programs.len() >= MAX_CACHED_PROGRAMS {
            tracing::debug!(entries = programs.len(), "flushing program cache");
            programs.clear();
        }
        programs.insert(key, Arc::clone(&program));
    }
    Ok(program)
}

fn cache_key(expression: &str, variables: &[&str]) -> String {
    let mut names: Vec<&str> = variables.to_vec();
    names.sort_unstable();
    let mut key = String::with_capacity(expression.len() + 16);
    key.push_str(expression);
    for name in names {
        key.push('\0');
        key.push_str(name);
    }
    key
}
