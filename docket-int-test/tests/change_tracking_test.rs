// Tests for snapshot based change detection
use docket::doc;
use docket::session::ChangeType;
use docket_int_test::test_util::{cleanup, create_test_context, run_test, User};

#[test]
fn test_loaded_object_is_unchanged() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            assert_eq!(session.entity(user)?.id.as_deref(), Some("users/1"));
            assert!(!session.has_changed(user)?);
            assert!(!session.has_changes()?);
            assert!(session.what_changed()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_field_change_is_reported() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            session.entity_mut(user)?.age = 31;

            let changes = session.what_changed()?;
            let user_changes = &changes["users/1"];
            assert_eq!(user_changes.len(), 1);
            assert_eq!(user_changes[0].change(), ChangeType::FieldChanged);
            assert_eq!(user_changes[0].field_name(), "age");
            assert_eq!(user_changes[0].field_old_value(), "30");
            assert_eq!(user_changes[0].field_new_value(), "31");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_reverting_a_change_makes_the_object_clean() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            session.entity_mut(user)?.name = "Bob".to_string();
            assert!(session.has_changed(user)?);

            session.entity_mut(user)?.name = "Ann".to_string();
            assert!(!session.has_changed(user)?);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_metadata_change_is_a_change() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            session.metadata_for_mut(user)?.put("Department", "Sales")?;

            assert!(session.has_changed(user)?);
            let changes = session.what_changed()?;
            assert_eq!(changes["users/1"][0].field_name(), "Department");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_explicit_version_request_is_a_change() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            session.explicitly_version(user)?;
            assert!(session.has_changed(user)?);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_new_object_is_reported_as_added() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let user = session.store(User::new("Ann", 30))?;

            let changes = session.what_changed()?;
            assert_eq!(changes.len(), 1);
            assert_eq!(changes["users/1"][0].change(), ChangeType::DocumentAdded);
            assert_eq!(session.document_id(user)?.as_deref(), Some("users/1"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_clear_forgets_tracked_objects() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let user = session.store(User::new("Ann", 30))?;
            session.clear();

            assert_eq!(session.number_of_entities_in_unit_of_work(), 0);
            assert!(!session.has_changes()?);
            assert!(session.entity(user).is_err());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_caching_scope_serves_the_same_conversion() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let user = session.load::<User>("users/1")?.unwrap();
            {
                let mut scope = session.caching_scope();
                assert!(!scope.has_changed(user)?);
                assert!(!scope.has_changes()?);
            }
            assert!(!session.is_caching());
            Ok(())
        },
        cleanup,
    )
}
