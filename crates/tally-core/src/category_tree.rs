//! In-memory chart of accounts
//!
//! Categories live in a flat arena and refer to each other by index, so
//! walking or pruning the tree never fights the borrow checker and a bad
//! `parent_id` can't produce an ownership cycle.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Category;

#[derive(Debug, Clone)]
struct Node {
    category: Category,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A category with its position in the tree, as yielded by [`CategoryTree::walk`]
#[derive(Debug, Clone, Serialize)]
pub struct CategoryEntry<'a> {
    pub category: &'a Category,
    pub depth: usize,
    /// Codes from the root down to this category, joined with `/`
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<Node>,
    by_id: HashMap<i64, usize>,
    roots: Vec<usize>,
}

impl CategoryTree {
    /// Build from a flat list of rows
    ///
    /// Fails if a `parent_id` names a category that is not in the list or
    /// if following parents ever loops.
    pub fn build(mut categories: Vec<Category>) -> Result<Self> {
        categories.sort_by(|a, b| a.code.cmp(&b.code));

        let by_id: HashMap<i64, usize> = categories
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.id, idx))
            .collect();

        let mut nodes: Vec<Node> = categories
            .into_iter()
            .map(|category| Node {
                category,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for idx in 0..nodes.len() {
            let parent_id = nodes[idx].category.parent_id;
            match parent_id {
                None => roots.push(idx),
                Some(parent_id) => {
                    let parent = *by_id.get(&parent_id).ok_or_else(|| {
                        Error::ReferentialIntegrity(format!(
                            "category {} has unknown parent {}",
                            nodes[idx].category.code, parent_id
                        ))
                    })?;
                    nodes[idx].parent = Some(parent);
                    nodes[parent].children.push(idx);
                }
            }
        }

        let tree = Self {
            nodes,
            by_id,
            roots,
        };
        tree.check_acyclic()?;
        Ok(tree)
    }

    fn check_acyclic(&self) -> Result<()> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let mut cursor = node.parent;
            let mut steps = 0;
            while let Some(parent) = cursor {
                steps += 1;
                if parent == idx || steps > self.nodes.len() {
                    return Err(Error::domain(format!(
                        "category {} is its own ancestor",
                        node.category.code
                    )));
                }
                cursor = self.nodes[parent].parent;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.by_id.get(&id).map(|&idx| &self.nodes[idx].category)
    }

    pub fn parent(&self, id: i64) -> Option<&Category> {
        let idx = *self.by_id.get(&id)?;
        self.nodes[idx]
            .parent
            .map(|parent| &self.nodes[parent].category)
    }

    /// Top-level categories, ordered by code
    pub fn roots(&self) -> impl Iterator<Item = &Category> + '_ {
        self.roots.iter().map(|&idx| &self.nodes[idx].category)
    }

    /// Direct children, ordered by code. Empty for unknown ids.
    pub fn children(&self, id: i64) -> impl Iterator<Item = &Category> + '_ {
        self.by_id
            .get(&id)
            .map(|&idx| self.nodes[idx].children.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&child| &self.nodes[child].category)
    }

    /// Parents of `id`, nearest first
    pub fn ancestors(&self, id: i64) -> Vec<&Category> {
        let mut out = Vec::new();
        let Some(&idx) = self.by_id.get(&id) else {
            return out;
        };
        let mut cursor = self.nodes[idx].parent;
        while let Some(parent) = cursor {
            out.push(&self.nodes[parent].category);
            cursor = self.nodes[parent].parent;
        }
        out
    }

    /// Root-first chain ending at `id` (empty for unknown ids)
    pub fn path(&self, id: i64) -> Vec<&Category> {
        let Some(category) = self.get(id) else {
            return Vec::new();
        };
        let mut path = self.ancestors(id);
        path.reverse();
        path.push(category);
        path
    }

    /// Everything below `id`, depth-first
    pub fn descendants(&self, id: i64) -> Vec<&Category> {
        let mut out = Vec::new();
        if let Some(&idx) = self.by_id.get(&id) {
            let mut stack: Vec<usize> = self.nodes[idx].children.iter().rev().copied().collect();
            while let Some(next) = stack.pop() {
                out.push(&self.nodes[next].category);
                stack.extend(self.nodes[next].children.iter().rev().copied());
            }
        }
        out
    }

    /// True if `candidate` sits somewhere below `ancestor`
    pub fn is_descendant(&self, candidate: i64, ancestor: i64) -> bool {
        self.ancestors(candidate).iter().any(|c| c.id == ancestor)
    }

    /// Every category in depth-first order with its depth and code path
    pub fn walk(&self) -> Vec<CategoryEntry<'_>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize, String)> = self
            .roots
            .iter()
            .rev()
            .map(|&idx| (idx, 0, self.nodes[idx].category.code.clone()))
            .collect();

        while let Some((idx, depth, path)) = stack.pop() {
            let node = &self.nodes[idx];
            for &child in node.children.iter().rev() {
                let child_path = format!("{}/{}", path, self.nodes[child].category.code);
                stack.push((child, depth + 1, child_path));
            }
            out.push(CategoryEntry {
                category: &node.category,
                depth,
                path,
            });
        }
        out
    }
}
