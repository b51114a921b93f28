//! Event Emission Tests
//!
//! Sessions broadcast path changes, materializations of inherited nodes and
//! successful saves. Each operation emits exactly one event, and failed
//! operations emit none.

#[cfg(test)]
mod event_emission_tests {
    use anyhow::Result;
    use nodetree_core::config::{RepositoryConfig, WorkspaceConfig};
    use nodetree_core::db::{InMemoryStore, SessionEvent, StoreOperationKind};
    use nodetree_core::models::NodeAccess;
    use nodetree_core::services::{Repository, Session};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::broadcast::Receiver;
    use tokio::time::{timeout, Duration};

    async fn create_session() -> Result<(Repository, Arc<InMemoryStore>, Session)> {
        let store = Arc::new(InMemoryStore::new());
        let repository = Repository::new(RepositoryConfig::default(), store.clone()).await?;
        let session = repository.login("live").await?;
        Ok((repository, store, session))
    }

    async fn next_event(rx: &mut Receiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    fn assert_no_more_events(rx: &mut Receiver<SessionEvent>) {
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_rename_emits_one_path_change() -> Result<()> {
        let (_repository, _store, mut session) = create_session().await?;
        let root = session.root_node().await?;
        let folder = session.create_node(root.identifier(), "a", None, None).await?;
        session.create_node(folder.identifier(), "x", None, None).await?;
        session.save().await?;

        let mut rx = session.subscribe_to_events();
        session.set_name(folder.identifier(), "b").await?;

        match next_event(&mut rx).await {
            SessionEvent::NodePathChanged {
                identifier,
                old_path,
                new_path,
            } => {
                assert_eq!(identifier, folder.identifier());
                assert_eq!(old_path, "/a");
                assert_eq!(new_path, "/b");
            }
            other => panic!("Expected NodePathChanged, got {:?}", other),
        }
        assert_no_more_events(&mut rx);
        Ok(())
    }

    #[tokio::test]
    async fn test_reordering_within_parent_emits_nothing() -> Result<()> {
        let (_repository, _store, mut session) = create_session().await?;
        let root = session.root_node().await?;
        let a = session.create_node(root.identifier(), "a", None, None).await?;
        let b = session.create_node(root.identifier(), "b", None, None).await?;

        let mut rx = session.subscribe_to_events();
        session.move_before(b.identifier(), a.identifier()).await?;
        assert_no_more_events(&mut rx);

        session.move_into(b.identifier(), a.identifier()).await?;
        let event = next_event(&mut rx).await;
        assert_eq!(event.identifier(), Some(b.identifier()));
        assert!(matches!(
            event,
            SessionEvent::NodePathChanged { ref new_path, .. } if new_path == "/a/b"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_overlay_materializes_once() -> Result<()> {
        let config = RepositoryConfig {
            workspaces: vec![
                WorkspaceConfig::new("live"),
                WorkspaceConfig::with_base("user-admin", "live"),
            ],
            ..RepositoryConfig::default()
        };
        let repository = Repository::in_memory(config).await?;
        let mut live = repository.login("live").await?;
        let root = live.root_node().await?;
        let page = live.create_node(root.identifier(), "page", None, None).await?;
        live.save().await?;

        let mut admin = repository.login("user-admin").await?;
        admin.get_node("/page").await?;
        let mut rx = admin.subscribe_to_events();

        admin.set_property(page.identifier(), "title", json!("One")).await?;
        admin.set_hidden(page.identifier(), true).await?;

        let event = next_event(&mut rx).await;
        assert_eq!(
            event,
            SessionEvent::NodeMaterialized {
                identifier: page.identifier().to_string(),
                workspace: "user-admin".to_string(),
            }
        );
        assert_no_more_events(&mut rx);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_reports_counts() -> Result<()> {
        let (_repository, _store, mut session) = create_session().await?;
        let root = session.root_node().await?;
        let keep = session.create_node(root.identifier(), "keep", None, None).await?;
        let gone = session.create_node(root.identifier(), "gone", None, None).await?;
        session.save().await?;

        session.create_node(root.identifier(), "n1", None, None).await?;
        session.create_node(root.identifier(), "n2", None, None).await?;
        session.remove(gone.identifier()).await?;
        session.set_property(keep.identifier(), "title", json!("Kept")).await?;

        let mut rx = session.subscribe_to_events();
        session.save().await?;

        assert_eq!(
            next_event(&mut rx).await,
            SessionEvent::ChangesSaved {
                workspace: "live".to_string(),
                created: 2,
                updated: 1,
                removed: 1,
            }
        );
        assert_no_more_events(&mut rx);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_emits_nothing() -> Result<()> {
        let (_repository, store, mut session) = create_session().await?;
        let root = session.root_node().await?;
        session.create_node(root.identifier(), "n1", None, None).await?;

        let mut rx = session.subscribe_to_events();
        store.fail_next(StoreOperationKind::CreateNode).await;
        assert!(session.save().await.is_err());
        assert_no_more_events(&mut rx);

        session.save().await?;
        assert!(matches!(
            next_event(&mut rx).await,
            SessionEvent::ChangesSaved { created: 1, .. }
        ));
        Ok(())
    }

    #[test]
    fn test_events_serialize_with_type_tag() -> Result<()> {
        let event = SessionEvent::NodePathChanged {
            identifier: "42".into(),
            old_path: "/a".into(),
            new_path: "/b".into(),
        };
        assert_eq!(
            serde_json::to_value(&event)?,
            json!({
                "type": "nodePathChanged",
                "identifier": "42",
                "oldPath": "/a",
                "newPath": "/b"
            })
        );
        Ok(())
    }
}
