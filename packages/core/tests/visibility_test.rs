//! Visibility Tests
//!
//! Sessions filter nodes by their removed flag, visibility window and access
//! roles unless the context switches say otherwise. Also covers logout.

#[cfg(test)]
mod visibility_tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use nodetree_core::config::RepositoryConfig;
    use nodetree_core::db::InMemoryStore;
    use nodetree_core::models::NodeAccess;
    use nodetree_core::services::{
        ContextOptions, FixedClock, Repository, RepositoryError, Session, StaticRoles,
    };
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn editor_repository(store: Arc<InMemoryStore>) -> Result<Repository> {
        Ok(Repository::new(RepositoryConfig::default(), store)
            .await?
            .with_clock(Arc::new(FixedClock(now())))
            .with_security_context(Arc::new(StaticRoles::new(["Editor"]))))
    }

    /// One child of the root per filter case, saved
    async fn populate(session: &mut Session) -> Result<()> {
        let root = session.root_node().await?;
        let root = root.identifier().to_string();

        let hidden = session.create_node(&root, "hidden", None, None).await?;
        session.set_hidden(hidden.identifier(), true).await?;

        let scheduled = session.create_node(&root, "scheduled", None, None).await?;
        session
            .set_hidden_before(scheduled.identifier(), Some(now() + Duration::days(1)))
            .await?;

        let expired = session.create_node(&root, "expired", None, None).await?;
        session
            .set_hidden_after(expired.identifier(), Some(now() - Duration::days(1)))
            .await?;

        let editors = session.create_node(&root, "editors", None, None).await?;
        session
            .set_access_roles(editors.identifier(), vec!["Editor".to_string()])
            .await?;

        let admins = session.create_node(&root, "admins", None, None).await?;
        session
            .set_access_roles(admins.identifier(), vec!["Administrator".to_string()])
            .await?;

        let public = session.create_node(&root, "public", None, None).await?;
        session
            .set_access_roles(public.identifier(), vec!["Everybody".to_string()])
            .await?;

        session.create_node(&root, "plain", None, None).await?;

        let running = session.create_node(&root, "running", None, None).await?;
        session
            .set_hidden_before(running.identifier(), Some(now() - Duration::hours(1)))
            .await?;
        session
            .set_hidden_after(running.identifier(), Some(now() + Duration::hours(1)))
            .await?;

        session.save().await?;
        Ok(())
    }

    async fn child_names(session: &mut Session) -> Result<Vec<String>> {
        let root = session.root_node().await?;
        Ok(session
            .get_child_nodes(root.identifier(), None)
            .await?
            .iter()
            .map(|child| child.name().to_string())
            .collect())
    }

    #[tokio::test]
    async fn test_default_context_filters_children() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let repository = editor_repository(store).await?;
        let mut writer = repository.login("live").await?;
        populate(&mut writer).await?;

        let mut reader = repository.login("live").await?;
        assert_eq!(
            child_names(&mut reader).await?,
            vec!["editors", "public", "plain", "running"]
        );
        assert!(reader.get_node("/hidden").await?.is_none());
        assert!(reader.get_node("/admins").await?.is_none());
        assert!(!reader.node_exists("/expired").await?);

        // Lookups by identifier are not filtered
        let mut inspector = repository
            .login_with_options("live", ContextOptions::show_all())
            .await?;
        let everything = inspector.get_node("/hidden").await?.expect("hidden node");
        let by_id = reader.get_node_by_identifier(everything.identifier()).await?;
        assert!(by_id.is_hidden());
        Ok(())
    }

    #[tokio::test]
    async fn test_show_all_admits_every_child() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let repository = editor_repository(store).await?;
        let mut writer = repository.login("live").await?;
        populate(&mut writer).await?;

        let mut inspector = repository
            .login_with_options("live", ContextOptions::show_all())
            .await?;
        assert_eq!(
            child_names(&mut inspector).await?,
            vec![
                "hidden",
                "scheduled",
                "expired",
                "editors",
                "admins",
                "public",
                "plain",
                "running"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_anonymous_user_does_not_see_restricted_nodes() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let repository = editor_repository(store.clone()).await?;
        let mut writer = repository.login("live").await?;
        populate(&mut writer).await?;

        let anonymous = Repository::new(RepositoryConfig::default(), store)
            .await?
            .with_clock(Arc::new(FixedClock(now())));
        let mut reader = anonymous.login("live").await?;
        assert_eq!(child_names(&mut reader).await?, vec!["public", "plain", "running"]);

        let options = ContextOptions {
            show_inaccessible: true,
            ..ContextOptions::default()
        };
        let mut reader = anonymous.login_with_options("live", options).await?;
        assert_eq!(
            child_names(&mut reader).await?,
            vec!["editors", "admins", "public", "plain", "running"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_logout_closes_the_session() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let repository = editor_repository(store.clone()).await?;
        let mut session = repository.login("live").await?;
        let root = session.root_node().await?;
        session.create_node(root.identifier(), "unsaved", None, None).await?;

        session.logout().await?;
        assert!(!session.is_live());
        assert!(!session.has_pending_changes());
        assert_eq!(store.disconnect_count(), 1);

        assert!(matches!(session.root_node().await, Err(RepositoryError::SessionClosed)));
        assert!(matches!(session.save().await, Err(RepositoryError::SessionClosed)));
        assert!(matches!(session.logout().await, Err(RepositoryError::SessionClosed)));
        assert_eq!(store.disconnect_count(), 1);

        // Nothing staged before logout reached the store
        let mut next = repository.login("live").await?;
        assert!(next.get_node("/unsaved").await?.is_none());
        Ok(())
    }
}
