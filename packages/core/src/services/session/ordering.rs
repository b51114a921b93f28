//! Moves and sibling order
//!
//! Sibling indices are kept dense: a placement renumbers the parent's
//! children that are not removed to `0..n`, and a node leaving its parent
//! (move or removal) closes the gap it leaves behind. Only nodes whose index
//! actually changes are written, so untouched inherited siblings stay
//! unmaterialized.

use super::Session;
use crate::db::SessionEvent;
use crate::models::NodeAccess;
use crate::services::error::{RepositoryError, Result};
use crate::utils;
use tracing::debug;

/// Where a node goes among its siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Placement {
    Before(String),
    After(String),
    Last,
}

impl Session {
    /// Move the node directly before `reference`, changing parents if needed
    pub async fn move_before(&mut self, identifier: &str, reference: &str) -> Result<()> {
        self.move_next_to(identifier, reference, Placement::Before(reference.to_string()))
            .await
    }

    /// Move the node directly after `reference`, changing parents if needed
    pub async fn move_after(&mut self, identifier: &str, reference: &str) -> Result<()> {
        self.move_next_to(identifier, reference, Placement::After(reference.to_string()))
            .await
    }

    /// Make the node the last child of `target`
    pub async fn move_into(&mut self, identifier: &str, target: &str) -> Result<()> {
        self.ensure_live()?;
        let node = self.load(identifier).await?;
        if node.is_root() {
            return Err(RepositoryError::node("The root node cannot be moved."));
        }
        let target = self.load(target).await?;
        if target.path() == node.path() || utils::is_descendant_of(target.path(), node.path()) {
            return Err(RepositoryError::node(format!(
                "Cannot move {} into its own subtree",
                node.path()
            )));
        }
        if node.parent_path() == target.path() {
            return Ok(());
        }

        let new_path = utils::child_path(target.path(), node.name());
        self.relocate(identifier, &new_path).await?;
        self.place(identifier, Placement::Last).await
    }

    async fn move_next_to(
        &mut self,
        identifier: &str,
        reference: &str,
        placement: Placement,
    ) -> Result<()> {
        self.ensure_live()?;
        if identifier == reference {
            return Ok(());
        }
        let node = self.load(identifier).await?;
        if node.is_root() {
            return Err(RepositoryError::node("The root node cannot be moved."));
        }
        let reference = self.load(reference).await?;
        if reference.is_root() {
            return Err(RepositoryError::node(
                "Cannot place a node before or after the root node.",
            ));
        }
        if utils::is_descendant_of(reference.path(), node.path()) {
            return Err(RepositoryError::node(format!(
                "Cannot move {} into its own subtree",
                node.path()
            )));
        }

        if reference.parent_path() != node.parent_path() {
            let new_path = utils::child_path(reference.parent_path(), node.name());
            self.relocate(identifier, &new_path).await?;
        }
        self.place(identifier, placement).await
    }

    /// Move a node to `new_path` under another parent and close the gap at
    /// its old position
    async fn relocate(&mut self, identifier: &str, new_path: &str) -> Result<()> {
        if self.find_raw(new_path).await?.is_some() {
            return Err(RepositoryError::node_exists(new_path));
        }
        let node = self.cached(identifier)?;
        let old_parent = node.parent_path().to_string();
        let old_index = node.index();
        self.move_subtree(identifier, new_path).await?;
        self.close_gap(&old_parent, old_index).await
    }

    /// Give the node `new_path` and rewrite the paths of all its descendants.
    ///
    /// The subtree is collected before any path changes.
    pub(super) async fn move_subtree(&mut self, identifier: &str, new_path: &str) -> Result<()> {
        let old_path = self.load(identifier).await?.path().to_string();
        let subtree = self.collect_subtree(identifier).await?;

        for (member, path) in &subtree {
            let target = utils::rebase(path, &old_path, new_path).ok_or_else(|| {
                RepositoryError::invalid_path(path.as_str(), format!("not below {}", old_path))
            })?;
            self.touch(member, |node| node.set_path(&target))?;
        }

        debug!(
            "Moved {} to {} ({} nodes)",
            old_path,
            new_path,
            subtree.len()
        );
        self.emit(SessionEvent::NodePathChanged {
            identifier: identifier.to_string(),
            old_path,
            new_path: new_path.to_string(),
        });
        Ok(())
    }

    /// Put the node at `placement` among its current siblings and renumber them
    pub(super) async fn place(&mut self, identifier: &str, placement: Placement) -> Result<()> {
        let parent_path = self.cached(identifier)?.parent_path().to_string();
        let mut order: Vec<String> = self
            .raw_children(&parent_path)
            .await?
            .into_iter()
            .filter(|sibling| !sibling.is_removed() && sibling.identifier() != identifier)
            .map(|sibling| sibling.identifier().to_string())
            .collect();

        let position = match &placement {
            Placement::Last => order.len(),
            Placement::Before(reference) | Placement::After(reference) => {
                let found = order
                    .iter()
                    .position(|sibling| sibling == reference)
                    .ok_or_else(|| {
                        RepositoryError::node(format!(
                            "Node {} is not a sibling of node {}",
                            reference, identifier
                        ))
                    })?;
                if matches!(placement, Placement::After(_)) {
                    found + 1
                } else {
                    found
                }
            }
        };
        order.insert(position, identifier.to_string());
        self.renumber(&order)
    }

    /// Assign indices `0..n` in the given order, writing only changed ones
    fn renumber(&mut self, order: &[String]) -> Result<()> {
        for (index, member) in order.iter().enumerate() {
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            if self.cached(member)?.index() != index {
                self.touch(member, |node| Ok(node.set_index(index)))?;
            }
        }
        Ok(())
    }

    /// Shift the siblings after a departed node's `index` up by one
    pub(super) async fn close_gap(&mut self, parent_path: &str, index: u32) -> Result<()> {
        let followers: Vec<(String, u32)> = self
            .raw_children(parent_path)
            .await?
            .into_iter()
            .filter(|sibling| !sibling.is_removed() && sibling.index() > index)
            .map(|sibling| (sibling.identifier().to_string(), sibling.index()))
            .collect();
        for (member, current) in followers {
            self.touch(&member, |node| Ok(node.set_index(current - 1)))?;
        }
        Ok(())
    }
}
