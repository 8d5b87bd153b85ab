//! Depth-bounded, cycle-guarded walk over a JSON payload.

use serde_json::Value;
use std::collections::HashSet;

/// An array node found in a payload, with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode<'v> {
    /// Path from the root, e.g. `$.state.variations[0].itemIds`
    pub path: String,
    /// Depth of the array node (root is 0)
    pub depth: usize,
    /// The array elements
    pub items: &'v [Value],
}

/// Enumerates every array-valued node in a payload.
#[derive(Debug, Clone, Copy)]
pub struct ArrayVisitor {
    max_depth: usize,
}

impl ArrayVisitor {
    /// Visitor that never descends below `max_depth`.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Configured depth limit.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// All array nodes in pre-order, shallower nodes before their children.
    #[must_use]
    pub fn arrays<'v>(&self, root: &'v Value) -> Vec<ArrayNode<'v>> {
        let mut found = Vec::new();
        let mut visited: HashSet<*const Value> = HashSet::new();
        let mut stack: Vec<(String, usize, &'v Value)> = vec![("$".to_string(), 0, root)];

        while let Some((path, depth, node)) = stack.pop() {
            if !visited.insert(std::ptr::from_ref(node)) {
                continue;
            }

            match node {
                Value::Array(items) => {
                    found.push(ArrayNode {
                        path: path.clone(),
                        depth,
                        items,
                    });
                    if depth < self.max_depth {
                        // Reverse so children pop in document order.
                        for (index, child) in items.iter().enumerate().rev() {
                            if child.is_array() || child.is_object() {
                                stack.push((format!("{path}[{index}]"), depth + 1, child));
                            }
                        }
                    }
                }
                Value::Object(map) => {
                    if depth < self.max_depth {
                        let children: Vec<_> = map.iter().collect();
                        for (key, child) in children.into_iter().rev() {
                            if child.is_array() || child.is_object() {
                                stack.push((format!("{path}.{key}"), depth + 1, child));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        found
    }
}

/// Follow a dotted path (`params.itemIds`) from `root`.
#[must_use]
pub fn lookup_path<'v>(root: &'v Value, dotted: &str) -> Option<&'v Value> {
    dotted
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |node, segment| node.get(segment))
}

/// First value stored under `key` anywhere in the payload, breadth first.
#[must_use]
pub fn find_key<'v>(root: &'v Value, key: &str, max_depth: usize) -> Option<&'v Value> {
    let mut queue = std::collections::VecDeque::from([(root, 0usize)]);
    while let Some((node, depth)) = queue.pop_front() {
        match node {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    return Some(found);
                }
                if depth < max_depth {
                    queue.extend(map.values().map(|child| (child, depth + 1)));
                }
            }
            Value::Array(items) if depth < max_depth => {
                queue.extend(items.iter().map(|child| (child, depth + 1)));
            }
            _ => {}
        }
    }
    None
}
