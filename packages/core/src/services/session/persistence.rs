//! Flushing staged changes
//!
//! `save` validates first and writes second, in three phases: new nodes,
//! dirty nodes, removed nodes. Each staging entry is cleared right after it
//! has been written, so when a store call fails the unit of work still holds
//! exactly what did not reach the store. Nothing already written is rolled
//! back.

use super::Session;
use crate::db::SessionEvent;
use crate::models::{Node, NodeAccess, PropertyRecord, PropertyType};
use crate::services::error::{RepositoryError, Result};
use serde_json::Value;
use tracing::{info, warn};

impl Session {
    /// Write all staged changes to the store
    pub async fn save(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.validate_pending_changes().await?;

        let workspace = self.workspace_name();
        let mut created = 0;
        let mut updated = 0;
        let mut removed = 0;

        for identifier in self.unit_of_work.new_node_ids() {
            let node = self.cached(&identifier)?.into_record();
            self.store
                .create_node(node.clone())
                .await
                .map_err(|e| flush_failed(&workspace, "create node", &identifier, e))?;
            for name in self.unit_of_work.new_property_names(&identifier) {
                let record = self.property_record(&node, &name);
                self.store
                    .create_property(record)
                    .await
                    .map_err(|e| flush_failed(&workspace, "create property", &identifier, e))?;
                self.unit_of_work.clear_new_property(&identifier, &name);
            }
            // The node record was just written whole
            for name in self.unit_of_work.dirty_property_names(&identifier) {
                self.unit_of_work.clear_dirty_property(&identifier, &name);
            }
            for name in self.unit_of_work.removed_property_names(&identifier) {
                self.unit_of_work.clear_removed_property(&identifier, &name);
            }
            self.unit_of_work.clear_new_node(&identifier);
            created += 1;
        }

        for identifier in self.unit_of_work.dirty_node_ids() {
            let node = self.cached(&identifier)?.into_record();
            self.store
                .update_node(node.clone())
                .await
                .map_err(|e| flush_failed(&workspace, "update node", &identifier, e))?;
            for name in self.unit_of_work.new_property_names(&identifier) {
                let record = self.property_record(&node, &name);
                self.store
                    .create_property(record)
                    .await
                    .map_err(|e| flush_failed(&workspace, "create property", &identifier, e))?;
                self.unit_of_work.clear_new_property(&identifier, &name);
            }
            for name in self.unit_of_work.dirty_property_names(&identifier) {
                let record = self.property_record(&node, &name);
                self.store
                    .update_property(record)
                    .await
                    .map_err(|e| flush_failed(&workspace, "update property", &identifier, e))?;
                self.unit_of_work.clear_dirty_property(&identifier, &name);
            }
            for name in self.unit_of_work.removed_property_names(&identifier) {
                self.store
                    .delete_property(&workspace, &identifier, &name)
                    .await
                    .map_err(|e| flush_failed(&workspace, "delete property", &identifier, e))?;
                self.unit_of_work.clear_removed_property(&identifier, &name);
            }
            self.unit_of_work.clear_dirty_node(&identifier);
            updated += 1;
        }

        for node in self.unit_of_work.removed_nodes() {
            let identifier = node.identifier();
            self.store
                .delete_node(node.workspace(), identifier)
                .await
                .map_err(|e| flush_failed(&workspace, "delete node", identifier, e))?;
            self.unit_of_work.clear_removed_node(identifier);
            removed += 1;
        }

        info!(
            "Saved workspace {}: {} created, {} updated, {} removed",
            workspace, created, updated, removed
        );
        self.emit(SessionEvent::ChangesSaved {
            workspace,
            created,
            updated,
            removed,
        });
        Ok(())
    }

    /// Fail if a node staged for removal is still referenced by a node that
    /// stays.
    ///
    /// A reference no longer counts once its property is staged for removal
    /// or the referring node now holds another value.
    async fn validate_pending_changes(&self) -> Result<()> {
        let workspace = self.workspace_name();
        for node in self.unit_of_work.removed_nodes() {
            let identifier = node.identifier();
            if !self.store.is_reference_target(&workspace, identifier).await? {
                continue;
            }
            for property in self.store.find_referrers(&workspace, identifier).await? {
                let referrer = property.node_identifier.as_str();
                if self.unit_of_work.is_removed(referrer)
                    || self.unit_of_work.is_property_removed(referrer, &property.name)
                    || self.reference_changed(referrer, &property.name, identifier)
                {
                    continue;
                }
                return Err(RepositoryError::ReferentialIntegrity {
                    identifier: identifier.to_string(),
                    referrer: referrer.to_string(),
                    property: property.name,
                });
            }
        }
        Ok(())
    }

    fn reference_changed(&self, referrer: &str, name: &str, target: &str) -> bool {
        self.loaded.get(referrer).is_some_and(|node| {
            node.record().inline_properties().get(name) != Some(&Value::String(target.to_string()))
        })
    }

    fn property_record(&self, node: &Node, name: &str) -> PropertyRecord {
        let property_type = self
            .node_types
            .get_node_type(node.node_type())
            .map(|node_type| node_type.property_type(name))
            .unwrap_or(PropertyType::Undefined);
        PropertyRecord {
            node_identifier: node.identifier().to_string(),
            workspace: node.workspace().to_string(),
            name: name.to_string(),
            value: node
                .inline_properties()
                .get(name)
                .cloned()
                .unwrap_or(Value::Null),
            property_type,
        }
    }
}

fn flush_failed(
    workspace: &str,
    step: &str,
    identifier: &str,
    error: anyhow::Error,
) -> RepositoryError {
    warn!(
        "Save of workspace {} stopped at {} for {}: {}; earlier writes are kept",
        workspace, step, identifier, error
    );
    RepositoryError::Storage(error)
}
