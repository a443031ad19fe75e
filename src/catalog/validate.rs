//! Dependency integrity checks for finished catalogs.

use std::collections::HashMap;

use crate::catalog::Location;
use crate::error::{BuildError, BuildResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

/// Verify every dependency key resolves to a location of the same list and that the
/// dependency graph is acyclic.
pub fn validate_dependencies(locations: &[Location]) -> BuildResult<()> {
  let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
  for (index, location) in locations.iter().enumerate() {
    for key in &location.keys {
      by_key.entry(key.as_str()).or_default().push(index);
    }
  }

  for location in locations {
    for dependency in &location.dependencies {
      if !by_key.contains_key(dependency.as_str()) {
        return Err(BuildError::Catalog(format!(
          "location `{}` depends on unknown key `{dependency}`",
          location.primary_key()
        )));
      }
    }
  }

  let edges: Vec<Vec<usize>> = locations
    .iter()
    .map(|location| {
      location
        .dependencies
        .iter()
        .flat_map(|dependency| by_key[dependency.as_str()].iter().copied())
        .collect()
    })
    .collect();

  let mut marks = vec![Mark::Unvisited; locations.len()];
  for start in 0..locations.len() {
    if marks[start] != Mark::Unvisited {
      continue;
    }
    // Iterative depth-first search; the stack holds (location, next edge index).
    let mut stack = vec![(start, 0usize)];
    marks[start] = Mark::InProgress;
    while let Some((current, next)) = stack.pop() {
      let Some(&target) = edges[current].get(next) else {
        marks[current] = Mark::Done;
        continue;
      };
      stack.push((current, next + 1));

      match marks[target] {
        Mark::InProgress => {
          return Err(BuildError::Catalog(format!(
            "dependency cycle through `{}` and `{}`",
            locations[current].primary_key(),
            locations[target].primary_key()
          )));
        }
        Mark::Unvisited => {
          marks[target] = Mark::InProgress;
          stack.push((target, 0));
        }
        Mark::Done => {}
      }
    }
  }
  Ok(())
}
