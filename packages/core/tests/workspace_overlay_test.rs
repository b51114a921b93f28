//! Workspace Overlay Tests
//!
//! A derived workspace reads through to its base. Writing to an inherited
//! node materializes a clone in the derived workspace; the base record is
//! never touched.

#[cfg(test)]
mod workspace_overlay_tests {
    use anyhow::Result;
    use nodetree_core::config::{RepositoryConfig, WorkspaceConfig};
    use nodetree_core::db::{InMemoryStore, NodeStore, SessionEvent};
    use nodetree_core::models::NodeAccess;
    use nodetree_core::services::{ContextOptions, Repository, RepositoryError};
    use serde_json::json;
    use std::sync::Arc;

    async fn layered_repository() -> Result<(Repository, Arc<InMemoryStore>)> {
        let config = RepositoryConfig {
            workspaces: vec![
                WorkspaceConfig::new("live"),
                WorkspaceConfig::with_base("user-admin", "live"),
            ],
            ..RepositoryConfig::default()
        };
        let store = Arc::new(InMemoryStore::new());
        let repository = Repository::new(config, store.clone()).await?;
        Ok((repository, store))
    }

    /// Save a /page node with two properties in live and return its identifier
    async fn publish_page(repository: &Repository) -> Result<String> {
        let mut live = repository.login("live").await?;
        let root = live.root_node().await?;
        let page = live.create_node(root.identifier(), "page", None, None).await?;
        live.set_property(page.identifier(), "title", json!("Original")).await?;
        live.set_property(page.identifier(), "subtitle", json!("Sub")).await?;
        live.save().await?;
        Ok(page.identifier().to_string())
    }

    #[tokio::test]
    async fn test_inherited_node_reads_the_base_record() -> Result<()> {
        let (repository, _store) = layered_repository().await?;
        let page_id = publish_page(&repository).await?;

        let mut admin = repository.login("user-admin").await?;
        let page = admin.get_node("/page").await?.expect("page should be inherited");

        assert!(page.is_overlay());
        assert_eq!(page.identifier(), page_id);
        assert_eq!(page.workspace(), "live");
        assert_eq!(page.get_property("title")?, Some(json!("Original")));
        assert!(admin.root_node().await?.is_overlay());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_materializes_a_clone() -> Result<()> {
        let (repository, store) = layered_repository().await?;
        let page_id = publish_page(&repository).await?;

        let mut admin = repository.login("user-admin").await?;
        admin.get_node("/page").await?;
        let mut events = admin.subscribe_to_events();

        admin.set_property(&page_id, "title", json!("Changed")).await?;

        let page = admin.get_node_by_identifier(&page_id).await?;
        assert_eq!(page.identifier(), page_id);
        assert_eq!(page.workspace(), "user-admin");
        assert_eq!(page.get_property("title")?, Some(json!("Changed")));
        assert_eq!(page.get_property("subtitle")?, Some(json!("Sub")));
        assert!(page.as_overlay().map_or(false, |overlay| overlay.is_materialized()));

        match events.try_recv()? {
            SessionEvent::NodeMaterialized {
                identifier,
                workspace,
            } => {
                assert_eq!(identifier, page_id);
                assert_eq!(workspace, "user-admin");
            }
            other => panic!("Expected NodeMaterialized, got {:?}", other),
        }

        // The clone is staged as a new record with all of its properties
        assert!(admin.unit_of_work().is_new(&page_id));
        assert_eq!(admin.pending_changes().new_properties, 2);
        assert_eq!(admin.pending_changes().dirty_properties, 0);

        assert_eq!(store.node_count("user-admin").await, 0);
        admin.save().await?;
        assert_eq!(store.node_count("user-admin").await, 1);

        let base = store
            .get_node_by_identifier("live", &page_id)
            .await?
            .expect("live record should still exist");
        assert_eq!(base.get_property("title")?, Some(json!("Original")));

        let mut live = repository.login("live").await?;
        let seen_live = live.get_node("/page").await?.expect("page in live");
        assert_eq!(seen_live.get_property("title")?, Some(json!("Original")));

        let mut admin = repository.login("user-admin").await?;
        let seen_admin = admin.get_node("/page").await?.expect("page in user-admin");
        assert!(!seen_admin.is_overlay());
        assert_eq!(seen_admin.get_property("title")?, Some(json!("Changed")));
        Ok(())
    }

    #[tokio::test]
    async fn test_removal_in_derived_workspace_is_a_soft_delete() -> Result<()> {
        let (repository, store) = layered_repository().await?;
        let page_id = publish_page(&repository).await?;

        let mut admin = repository.login("user-admin").await?;
        admin.get_node("/page").await?;
        admin.remove(&page_id).await?;

        assert!(admin.get_node("/page").await?.is_none());
        assert_eq!(admin.pending_changes().removed_nodes, 0);
        admin.save().await?;
        assert_eq!(store.node_count("live").await, 2);

        let mut admin = repository.login("user-admin").await?;
        assert!(admin.get_node("/page").await?.is_none());

        let mut inspector = repository
            .login_with_options("user-admin", ContextOptions::show_all())
            .await?;
        let tombstone = inspector.get_node("/page").await?.expect("tombstone");
        assert!(tombstone.is_removed());
        assert_eq!(tombstone.workspace(), "user-admin");

        // Restoring clears the flag again
        inspector.set_removed(&page_id, false).await?;
        inspector.save().await?;
        let mut admin = repository.login("user-admin").await?;
        assert!(admin.get_node("/page").await?.is_some());

        let mut live = repository.login("live").await?;
        assert!(live.get_node("/page").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_nodes_created_in_derived_workspace_stay_there() -> Result<()> {
        let (repository, _store) = layered_repository().await?;
        publish_page(&repository).await?;

        let mut admin = repository.login("user-admin").await?;
        let root = admin.root_node().await?;
        let draft = admin.create_node(root.identifier(), "draft", None, None).await?;
        assert_eq!(draft.workspace(), "user-admin");
        assert_eq!(draft.index(), 1);
        admin.save().await?;

        let mut live = repository.login("live").await?;
        assert!(live.get_node("/draft").await?.is_none());
        assert!(matches!(
            live.get_node_by_identifier(draft.identifier()).await,
            Err(RepositoryError::ItemNotFound(_))
        ));

        let mut admin = repository.login("user-admin").await?;
        let root = admin.root_node().await?;
        let names: Vec<String> = admin
            .get_child_nodes(root.identifier(), None)
            .await?
            .iter()
            .map(|child| child.name().to_string())
            .collect();
        assert_eq!(names, vec!["page".to_string(), "draft".to_string()]);
        Ok(())
    }
}
