//! Node creation, property writes, removal and copies
//!
//! Every write goes through [`Session::modify`] / [`Session::touch`], so an
//! inherited node is materialized into the session's workspace before the
//! change is applied and the change is staged in the unit of work.

use super::ordering::Placement;
use super::Session;
use crate::models::{
    ContentNode, Node, NodeAccess, PropertyChange, SharedContentObject, UNSTRUCTURED,
};
use crate::services::error::{RepositoryError, Result};
use crate::utils;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::debug;

impl Session {
    //
    // CREATION
    //

    /// Create a child of `parent` with the type's default property values
    /// and auto-created child nodes.
    ///
    /// `node_type` defaults to `unstructured`; a fresh identifier is
    /// generated unless one is given.
    pub async fn create_node(
        &mut self,
        parent: &str,
        name: &str,
        node_type: Option<&str>,
        identifier: Option<&str>,
    ) -> Result<ContentNode> {
        let created = self
            .create_single_node(parent, name, node_type, identifier)
            .await?;
        let top = created.identifier().to_string();

        // (node, types from the top node down to this one)
        let mut pending = VecDeque::from([(top.clone(), vec![created.node_type().to_string()])]);
        while let Some((identifier, lineage)) = pending.pop_front() {
            let Some(current_type) = lineage.last() else {
                continue;
            };
            let node_type = self.node_types.get_node_type(current_type)?;

            for (name, value) in node_type.default_values_for_properties() {
                self.set_property(&identifier, &name, value).await?;
            }

            for (child_name, child_type) in node_type.auto_created_child_nodes() {
                let mut child_lineage = lineage.clone();
                child_lineage.push(child_type.clone());
                if lineage.contains(&child_type) {
                    return Err(RepositoryError::CyclicNodeType {
                        chain: child_lineage,
                    });
                }
                let child = self
                    .create_single_node(&identifier, &child_name, Some(&child_type), None)
                    .await?;
                pending.push_back((child.identifier().to_string(), child_lineage));
            }
        }

        self.cached(&top)
    }

    /// Create a single child of `parent` as the last sibling, without
    /// defaults or auto-created children
    pub async fn create_single_node(
        &mut self,
        parent: &str,
        name: &str,
        node_type: Option<&str>,
        identifier: Option<&str>,
    ) -> Result<ContentNode> {
        self.ensure_live()?;
        utils::validate_name(name)?;
        let parent = self.load(parent).await?;

        let node_type = node_type.unwrap_or(UNSTRUCTURED);
        if self.node_types.get_node_type(node_type)?.is_abstract() {
            return Err(RepositoryError::node(format!(
                "Cannot create a node of the abstract type \"{}\"",
                node_type
            )));
        }

        let path = utils::child_path(parent.path(), name);
        if self.find_raw(&path).await?.is_some() {
            return Err(RepositoryError::node_exists(path));
        }
        if let Some(identifier) = identifier {
            if self.identifier_in_use(identifier).await? {
                return Err(RepositoryError::IdentifierInUse {
                    identifier: identifier.to_string(),
                });
            }
        }

        let index = self
            .raw_children(parent.path())
            .await?
            .iter()
            .filter(|sibling| !sibling.is_removed())
            .count();

        let mut node = Node::new(path, self.workspace_name(), identifier.map(str::to_string))?;
        node.set_node_type(node_type);
        node.set_index(u32::try_from(index).unwrap_or(u32::MAX));
        Ok(self.stage_new(node))
    }

    /// Identifiers staged for removal stay taken until the removal is saved
    async fn identifier_in_use(&mut self, identifier: &str) -> Result<bool> {
        if self.loaded.contains_key(identifier) || self.unit_of_work.is_removed(identifier) {
            return Ok(true);
        }
        for workspace in self.chain_names() {
            if self.store.has_identifier(&workspace, identifier).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    //
    // PROPERTIES
    //

    pub async fn get_property(&mut self, identifier: &str, name: &str) -> Result<Option<Value>> {
        self.ensure_live()?;
        self.load(identifier).await?.get_property(name)
    }

    /// Set a property; equal values are not staged
    pub async fn set_property(&mut self, identifier: &str, name: &str, value: Value) -> Result<()> {
        self.ensure_live()?;
        self.load(identifier).await?;
        let (change, _) = self.modify(identifier, |node| node.set_property(name, value))?;
        match change {
            PropertyChange::Unchanged => return Ok(()),
            PropertyChange::Added => self.stage_added_property(identifier, name),
            PropertyChange::Updated => {
                self.unit_of_work.register_property_as_dirty(identifier, name);
            }
            PropertyChange::Delegated => {}
        }
        self.unit_of_work.register_node_as_dirty(identifier);
        Ok(())
    }

    /// Remove an inline property; fails if the node does not have it
    pub async fn remove_property(&mut self, identifier: &str, name: &str) -> Result<()> {
        self.ensure_live()?;
        self.load(identifier).await?;
        let (removed, _) = self.modify(identifier, |node| node.remove_property(name))?;
        if removed {
            self.unit_of_work.register_property_as_removed(identifier, name);
            self.unit_of_work.register_node_as_dirty(identifier);
        }
        Ok(())
    }

    /// A property that is re-added after a staged removal still has its
    /// record, so it becomes an update
    fn stage_added_property(&mut self, identifier: &str, name: &str) {
        if self.unit_of_work.is_property_removed(identifier, name) {
            self.unit_of_work.register_property_as_dirty(identifier, name);
        } else {
            self.unit_of_work.register_property_as_new(identifier, name);
        }
    }

    pub async fn set_content_object(
        &mut self,
        identifier: &str,
        object: SharedContentObject,
    ) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_content_object(object)))
    }

    pub async fn unset_content_object(&mut self, identifier: &str) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.unset_content_object()))
    }

    //
    // NODE FIELDS
    //

    pub async fn set_node_type(&mut self, identifier: &str, node_type: &str) -> Result<bool> {
        self.ensure_live()?;
        self.node_types.get_node_type(node_type)?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_node_type(node_type)))
    }

    /// Overwrite the sibling index without reordering the other siblings
    pub async fn set_index(&mut self, identifier: &str, index: u32) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_index(index)))
    }

    pub async fn set_hidden(&mut self, identifier: &str, hidden: bool) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_hidden(hidden)))
    }

    pub async fn set_hidden_before(
        &mut self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_hidden_before(at)))
    }

    pub async fn set_hidden_after(
        &mut self,
        identifier: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_hidden_after(at)))
    }

    pub async fn set_hidden_in_index(&mut self, identifier: &str, hidden: bool) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_hidden_in_index(hidden)))
    }

    pub async fn set_access_roles(&mut self, identifier: &str, roles: Vec<String>) -> Result<bool> {
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_access_roles(roles)))
    }

    /// Rename a node, rewriting the paths of all its descendants
    pub async fn set_name(&mut self, identifier: &str, name: &str) -> Result<()> {
        self.ensure_live()?;
        let node = self.load(identifier).await?;
        if node.is_root() {
            return Err(RepositoryError::node("The root node cannot be renamed."));
        }
        utils::validate_name(name)?;
        if node.name() == name {
            return Ok(());
        }

        let new_path = utils::child_path(node.parent_path(), name);
        if self.find_raw(&new_path).await?.is_some() {
            return Err(RepositoryError::node_exists(new_path));
        }
        self.move_subtree(identifier, &new_path).await
    }

    //
    // REMOVAL
    //

    /// Remove a node and its whole subtree.
    ///
    /// Records of a bottom workspace are deleted on save; derived workspaces
    /// keep them flagged as removed so they keep hiding the inherited record.
    /// The following siblings move up one index.
    pub async fn remove(&mut self, identifier: &str) -> Result<()> {
        self.ensure_live()?;
        let node = self.load(identifier).await?;
        if node.is_root() {
            return Err(RepositoryError::node("The root node cannot be removed."));
        }
        let parent_path = node.parent_path().to_string();
        let index = node.index();

        let subtree = self.collect_subtree(identifier).await?;
        debug!("Removing {} ({} nodes)", node.path(), subtree.len());
        for (member, _) in subtree.into_iter().rev() {
            self.remove_single(&member)?;
        }
        self.close_gap(&parent_path, index).await
    }

    fn remove_single(&mut self, identifier: &str) -> Result<()> {
        if !self.workspace().is_bottom() {
            self.touch(identifier, |node| Ok(node.set_removed(true)))?;
            return Ok(());
        }

        let never_saved = self.unit_of_work.is_new(identifier);
        if let Some(node) = self.loaded.remove(identifier) {
            self.unit_of_work.register_node_as_removed(node.into_record());
        }
        if never_saved {
            self.unit_of_work.clear_removed_node(identifier);
        }
        Ok(())
    }

    /// `true` removes the node like [`Session::remove`]; `false` clears the
    /// removed flag of a node kept in a derived workspace
    pub async fn set_removed(&mut self, identifier: &str, removed: bool) -> Result<()> {
        if removed {
            return self.remove(identifier).await;
        }
        self.ensure_live()?;
        self.load(identifier).await?;
        self.touch(identifier, |node| Ok(node.set_removed(false)))?;
        Ok(())
    }

    //
    // COPIES
    //

    /// Take over properties, type, index, visibility settings, access roles
    /// and content object from `source`
    pub async fn make_similar(&mut self, identifier: &str, source: &ContentNode) -> Result<()> {
        self.ensure_live()?;
        let before = self.load(identifier).await?.record().inline_properties().clone();
        self.modify(identifier, |node| node.make_similar_to(source))?;
        let after = self.cached(identifier)?.record().inline_properties().clone();
        self.stage_property_differences(identifier, &before, &after);
        self.unit_of_work.register_node_as_dirty(identifier);
        Ok(())
    }

    fn stage_property_differences(
        &mut self,
        identifier: &str,
        before: &Map<String, Value>,
        after: &Map<String, Value>,
    ) {
        for (name, value) in after {
            match before.get(name) {
                None => self.stage_added_property(identifier, name),
                Some(previous) if previous != value => {
                    self.unit_of_work.register_property_as_dirty(identifier, name);
                }
                Some(_) => {}
            }
        }
    }

    /// Copy the node and its visible descendants to a new child `name` of
    /// `parent`, placed last. Returns the copy.
    pub async fn copy_into(
        &mut self,
        identifier: &str,
        parent: &str,
        name: &str,
    ) -> Result<ContentNode> {
        self.ensure_live()?;
        utils::validate_name(name)?;
        let parent = self.load(parent).await?;
        let plan = self.copy_plan(identifier).await?;

        let mut copies: Vec<String> = Vec::with_capacity(plan.len());
        for (source, parent_slot) in &plan {
            let (target_parent, target_name) = match parent_slot {
                None => (parent.identifier().to_string(), name),
                Some(slot) => (copies[*slot].clone(), source.name()),
            };
            let copy = self
                .create_single_node(&target_parent, target_name, Some(source.node_type()), None)
                .await?;
            let copy_identifier = copy.identifier().to_string();
            let index = copy.index();

            self.make_similar(&copy_identifier, source).await?;
            self.touch(&copy_identifier, |node| Ok(node.set_index(index)))?;
            copies.push(copy_identifier);
        }

        let top = copies
            .first()
            .cloned()
            .ok_or_else(|| RepositoryError::item_not_found(format!("node {}", identifier)))?;
        self.place(&top, Placement::Last).await?;
        debug!("Copied {} nodes below {}", copies.len(), parent.path());
        self.cached(&top)
    }

    /// Copy the node to a new sibling `name` of `reference`, placed before it
    pub async fn copy_before(
        &mut self,
        identifier: &str,
        reference: &str,
        name: &str,
    ) -> Result<ContentNode> {
        let parent = self.reference_parent(reference).await?;
        let copy = self.copy_into(identifier, &parent, name).await?;
        self.move_before(copy.identifier(), reference).await?;
        self.cached(copy.identifier())
    }

    /// Copy the node to a new sibling `name` of `reference`, placed after it
    pub async fn copy_after(
        &mut self,
        identifier: &str,
        reference: &str,
        name: &str,
    ) -> Result<ContentNode> {
        let parent = self.reference_parent(reference).await?;
        let copy = self.copy_into(identifier, &parent, name).await?;
        self.move_after(copy.identifier(), reference).await?;
        self.cached(copy.identifier())
    }

    async fn reference_parent(&mut self, reference: &str) -> Result<String> {
        self.ensure_live()?;
        let reference = self.load(reference).await?;
        if reference.is_root() {
            return Err(RepositoryError::node(
                "Cannot place a node before or after the root node.",
            ));
        }
        let parent = self
            .find_raw(reference.parent_path())
            .await?
            .ok_or_else(|| RepositoryError::item_not_found(reference.parent_path()))?;
        Ok(parent.identifier().to_string())
    }

    /// Visible subtree in pre-order, each entry with the plan slot of its
    /// parent. Collected up front so a copy into the node's own subtree
    /// does not pick up the copies.
    async fn copy_plan(&mut self, identifier: &str) -> Result<Vec<(ContentNode, Option<usize>)>> {
        let top = self.load(identifier).await?;
        let mut plan = Vec::new();
        let mut pending = vec![(top, None)];
        while let Some((node, parent_slot)) = pending.pop() {
            let slot = plan.len();
            let children = self.get_child_nodes(node.identifier(), None).await?;
            plan.push((node, parent_slot));
            pending.extend(children.into_iter().rev().map(|child| (child, Some(slot))));
        }
        Ok(plan)
    }
}
