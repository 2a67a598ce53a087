//! Keeps `ancestors` and `level` consistent with the parent pointers.
//!
//! The maintainer is the only writer of those two fields. It is invoked
//! explicitly by [`crate::catalog::Catalog`]: `recompute_self` before a
//! category is persisted, `cascade_to_children` after a parent or name change
//! has been persisted.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::category::{Category, CategoryTreeNode, MAX_CATEGORY_LEVEL, MAX_PARENT_LEVEL};
use crate::error::{CatalogError, CatalogResult};
use crate::identity::CategoryId;
use crate::store::CategoryStore;

pub struct HierarchyMaintainer {
    categories: Arc<dyn CategoryStore>,
}

impl HierarchyMaintainer {
    pub fn new(categories: Arc<dyn CategoryStore>) -> Self {
        Self { categories }
    }

    /// Derive `category`'s ancestors and level from its current `parent`.
    pub async fn recompute_self(&self, category: &mut Category) -> CatalogResult<()> {
        match category.parent.clone() {
            Some(parent_id) => {
                let parent = self
                    .categories
                    .get(&parent_id)
                    .await?
                    .ok_or(CatalogError::ParentNotFound(parent_id))?;
                category.place_under(&parent);
            }
            None => category.place_at_root(),
        }
        Ok(())
    }

    /// Checks for a parent given at creation time. `own_id` is the
    /// caller-assigned id of the new category, if any.
    pub async fn validate_parent_for_new(
        &self,
        own_id: Option<&CategoryId>,
        parent_id: &CategoryId,
    ) -> CatalogResult<()> {
        if own_id == Some(parent_id) {
            return Err(CatalogError::SelfParent(parent_id.clone()));
        }
        let parent = self
            .categories
            .get(parent_id)
            .await?
            .ok_or_else(|| CatalogError::ParentNotFound(parent_id.clone()))?;
        if parent.level > MAX_PARENT_LEVEL {
            return Err(CatalogError::MaxDepthExceeded(format!(
                "parent '{}' is at level {}; categories cannot be nested deeper than level {}",
                parent.name, parent.level, MAX_CATEGORY_LEVEL
            )));
        }
        Ok(())
    }

    /// Checks for moving an existing category under `parent_id`: no self
    /// parenting, no cycle through a descendant, and the whole moved subtree
    /// must still fit within the depth limit.
    pub async fn validate_new_parent(
        &self,
        category: &Category,
        parent_id: &CategoryId,
    ) -> CatalogResult<()> {
        if &category.id == parent_id {
            return Err(CatalogError::SelfParent(category.id.clone()));
        }
        let parent = self
            .categories
            .get(parent_id)
            .await?
            .ok_or_else(|| CatalogError::ParentNotFound(parent_id.clone()))?;
        if parent.descends_from(&category.id) || self.reaches(&parent, &category.id).await? {
            return Err(CatalogError::CyclicParent {
                category: category.id.clone(),
                parent: parent_id.clone(),
            });
        }
        let height = self.subtree_height(&category.id).await?;
        let deepest = parent.level as usize + 1 + height;
        if deepest > MAX_CATEGORY_LEVEL as usize {
            return Err(CatalogError::MaxDepthExceeded(format!(
                "moving '{}' under '{}' would place a category at level {}; the maximum is {}",
                category.name, parent.name, deepest, MAX_CATEGORY_LEVEL
            )));
        }
        Ok(())
    }

    /// Whether `target` is on the parent chain of `start`, following stored
    /// `parent` pointers rather than the denormalized `ancestors`, which may
    /// be stale after an interrupted cascade.
    async fn reaches(&self, start: &Category, target: &CategoryId) -> CatalogResult<bool> {
        let mut visited: HashSet<CategoryId> = HashSet::from([start.id.clone()]);
        let mut cursor = start.parent.clone();
        while let Some(id) = cursor {
            if &id == target {
                return Ok(true);
            }
            if !visited.insert(id.clone()) {
                warn!("Parent loop through {} found while walking up from {}", id, start.id);
                return Ok(false);
            }
            cursor = match self.categories.get(&id).await? {
                Some(next) => next.parent,
                None => None,
            };
        }
        Ok(false)
    }

    /// Rewrite ancestors and level of every transitive descendant of `root`,
    /// which must already hold its persisted hierarchy. Depth-first with an
    /// explicit stack; each child is written before its own children are
    /// fetched. A failing write aborts the walk and leaves earlier writes in
    /// place. Returns the number of descendants rewritten.
    pub async fn cascade_to_children(&self, root: &Category) -> CatalogResult<usize> {
        let mut visited: HashSet<CategoryId> = HashSet::from([root.id.clone()]);
        let mut stack: Vec<(CategoryId, Vec<CategoryId>, u8)> =
            vec![(root.id.clone(), root.ancestors.clone(), root.level)];
        let mut updated = 0;

        while let Some((parent_id, parent_ancestors, parent_level)) = stack.pop() {
            let children = self.categories.children(&parent_id).await?;
            for child in children.into_iter().rev() {
                if !visited.insert(child.id.clone()) {
                    warn!(
                        "Category {} reached twice while cascading from {}; skipping",
                        child.id, root.id
                    );
                    continue;
                }
                let mut ancestors = parent_ancestors.clone();
                ancestors.push(parent_id.clone());
                let level = parent_level.saturating_add(1);

                if child.ancestors != ancestors || child.level != level {
                    let found = self
                        .categories
                        .set_hierarchy(&child.id, &ancestors, level, Utc::now())
                        .await?;
                    if !found {
                        debug!("Category {} vanished during cascade", child.id);
                        continue;
                    }
                    debug!("Cascaded hierarchy to {} (level {})", child.id, level);
                    updated += 1;
                }
                stack.push((child.id, ancestors, level));
            }
        }

        info!(
            "Hierarchy cascade from {} rewrote {} descendant(s)",
            root.id, updated
        );
        Ok(updated)
    }

    /// `root` and all its transitive descendants, breadth-first (parents
    /// before children). Missing `root` yields an empty list.
    pub async fn collect_subtree(&self, root: &CategoryId) -> CatalogResult<Vec<Category>> {
        let Some(first) = self.categories.get(root).await? else {
            return Ok(Vec::new());
        };
        let mut visited: HashSet<CategoryId> = HashSet::from([first.id.clone()]);
        let mut queue: VecDeque<CategoryId> = VecDeque::from([first.id.clone()]);
        let mut subtree = vec![first];

        while let Some(id) = queue.pop_front() {
            for child in self.categories.children(&id).await? {
                if visited.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    subtree.push(child);
                }
            }
        }
        Ok(subtree)
    }

    /// Number of levels below `root` (0 for a leaf).
    pub async fn subtree_height(&self, root: &CategoryId) -> CatalogResult<usize> {
        let mut visited: HashSet<CategoryId> = HashSet::from([root.clone()]);
        let mut stack: Vec<(CategoryId, usize)> = vec![(root.clone(), 0)];
        let mut height = 0;

        while let Some((id, depth)) = stack.pop() {
            height = height.max(depth);
            for child in self.categories.children(&id).await? {
                if visited.insert(child.id.clone()) {
                    stack.push((child.id, depth + 1));
                }
            }
        }
        Ok(height)
    }

    /// Assemble a nested tree from a flat listing. Categories whose parent is
    /// absent from the listing are treated as roots. Siblings keep the order
    /// of the input.
    pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryTreeNode> {
        let index: HashMap<CategoryId, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); categories.len()];
        let mut roots = Vec::new();
        for (i, category) in categories.iter().enumerate() {
            match category.parent.as_ref().and_then(|p| index.get(p)) {
                Some(&parent) if parent != i => children[parent].push(i),
                _ => roots.push(i),
            }
        }

        roots
            .into_iter()
            .map(|i| assemble(i, &categories, &children))
            .collect()
    }
}

fn assemble(i: usize, arena: &[Category], children: &[Vec<usize>]) -> CategoryTreeNode {
    let category = &arena[i];
    CategoryTreeNode {
        id: category.id.clone(),
        name: category.name.clone(),
        slug: category.slug.clone(),
        level: category.level,
        product_count: category.stats.product_count,
        children: children[i]
            .iter()
            .map(|&c| assemble(c, arena, children))
            .collect(),
    }
}
