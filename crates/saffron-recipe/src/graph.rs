use std::collections::{HashMap, HashSet};

use crate::error::RecipeError;
use crate::step::Step;

/// Dependency graph over one step list.
///
/// Built from `depends_on` declarations; building fails on duplicate step
/// names, unknown references and cycles, so execution never discovers a
/// malformed graph mid-run. Nested `parallel` lists get their own graph
/// when the executor recurses into them.
#[derive(Debug, Clone)]
pub struct StepGraph {
  /// Step names in declaration order. Scheduling ties break in this order.
  order: Vec<String>,
  /// Step name -> names that depend on it.
  downstream: HashMap<String, Vec<String>>,
  /// Step name -> names it depends on.
  upstream: HashMap<String, Vec<String>>,
}

impl StepGraph {
  /// Build and check the graph for a step list.
  pub fn build(steps: &[Step]) -> Result<Self, RecipeError> {
    let mut order = Vec::with_capacity(steps.len());
    let mut seen = HashSet::new();

    for step in steps {
      if !seen.insert(step.name.clone()) {
        return Err(RecipeError::DuplicateStep {
          name: step.name.clone(),
        });
      }
      order.push(step.name.clone());
    }

    let mut downstream: HashMap<String, Vec<String>> = HashMap::new();
    let mut upstream: HashMap<String, Vec<String>> = HashMap::new();
    for name in &order {
      downstream.entry(name.clone()).or_default();
      upstream.entry(name.clone()).or_default();
    }

    for step in steps {
      for dep in &step.depends_on {
        if !seen.contains(dep.step()) {
          return Err(RecipeError::UnknownDependency {
            step: step.name.clone(),
            dependency: dep.step().to_string(),
          });
        }
        downstream
          .get_mut(dep.step())
          .expect("dependency checked above")
          .push(step.name.clone());
        upstream
          .get_mut(&step.name)
          .expect("step inserted above")
          .push(dep.step().to_string());
      }
    }

    let graph = Self {
      order,
      downstream,
      upstream,
    };
    graph.check_acyclic()?;
    Ok(graph)
  }

  /// Step names in declaration order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Steps that directly depend on `name`.
  pub fn downstream(&self, name: &str) -> &[String] {
    self.downstream.get(name).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Steps `name` directly depends on.
  pub fn upstream(&self, name: &str) -> &[String] {
    self.upstream.get(name).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// All transitive dependents of `name` (strict descendants).
  pub fn descendants(&self, name: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut stack: Vec<&str> = self.downstream(name).iter().map(String::as_str).collect();
    while let Some(current) = stack.pop() {
      if out.insert(current.to_string()) {
        stack.extend(self.downstream(current).iter().map(String::as_str));
      }
    }
    out
  }

  /// Check for cycles using DFS coloring.
  fn check_acyclic(&self) -> Result<(), RecipeError> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.order.iter().map(|n| (n.as_str(), 0u8)).collect();

    fn dfs<'a>(
      node: &'a str,
      downstream: &'a HashMap<String, Vec<String>>,
      color: &mut HashMap<&'a str, u8>,
    ) -> Option<&'a str> {
      color.insert(node, 1);

      if let Some(next) = downstream.get(node) {
        for neighbor in next {
          match color.get(neighbor.as_str()) {
            // Back edge: the cycle runs through `neighbor`.
            Some(1) => return Some(neighbor.as_str()),
            Some(0) => {
              if let Some(hit) = dfs(neighbor.as_str(), downstream, color) {
                return Some(hit);
              }
            }
            _ => {}
          }
        }
      }

      color.insert(node, 2);
      None
    }

    for name in &self.order {
      if color.get(name.as_str()) == Some(&0)
        && let Some(step) = dfs(name.as_str(), &self.downstream, &mut color)
      {
        return Err(RecipeError::DependencyCycle {
          step: step.to_string(),
        });
      }
    }

    Ok(())
  }
}
