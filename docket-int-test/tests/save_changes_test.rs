// Tests for the save pipeline against the in-memory transport
use docket::common::Value;
use docket::doc;
use docket::document::Etag;
use docket::errors::ErrorKind;
use docket::session::CommandData;
use docket_int_test::test_util::{
    cleanup, create_optimistic_test_context, create_test_context, run_test, Order, User,
};

#[test]
fn test_save_new_objects() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let ann = session.store(User::new("Ann", 30))?;
            let bob = session.store(User::new("Bob", 40))?;
            session.save_changes()?;

            assert_eq!(ctx.transport().document_count(), 2);
            assert_eq!(session.document_id(ann)?.as_deref(), Some("users/1"));
            assert_eq!(session.document_id(bob)?.as_deref(), Some("users/2"));
            assert_eq!(session.number_of_requests(), 1);
            assert!(!session.has_changes()?);

            let stored = ctx.transport().get_document("users/2").unwrap();
            assert_eq!(stored.data().get_str("name"), Some("Bob"));
            assert_eq!(stored.metadata().get_str("Raven-Entity-Name"), Some("Users"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_save_without_changes_sends_nothing() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.save_changes()?;
            assert!(ctx.transport().submitted_batches().is_empty());
            assert_eq!(session.number_of_requests(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_second_save_sends_only_the_update() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let ann = session.store(User::new("Ann", 30))?;
            session.store(User::new("Bob", 40))?;
            session.save_changes()?;

            session.entity_mut(ann)?.age = 31;
            session.save_changes()?;

            let batch = ctx.transport().last_batch().unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].key(), Some("users/1"));
            assert_eq!(
                ctx.transport().get_document("users/1").unwrap().data().get("age"),
                Some(&Value::from(31))
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_deferred_commands_go_first() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("logs/1", doc! { text: "old" }, doc! {})?;

            let mut session = ctx.store().open_session();
            session.store(User::new("Ann", 30))?;
            session.defer([CommandData::delete("logs/1", None)]);
            session.save_changes()?;

            let batch = ctx.transport().last_batch().unwrap();
            assert_eq!(batch.len(), 2);
            assert_eq!(batch[0], CommandData::delete("logs/1", None));
            assert!(batch[1].is_put());
            assert!(!ctx.transport().contains("logs/1"));
            assert_eq!(session.deferred_commands_count(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_optimistic_update_detects_concurrent_write() {
    run_test(
        create_optimistic_test_context,
        |ctx| {
            let mut writer = ctx.store().open_session();
            let ann = writer.store(User::new("Ann", 30))?;
            writer.save_changes()?;

            let mut other = ctx.store().open_session();
            let same = other.load::<User>("users/1")?.unwrap();
            other.entity_mut(same)?.age = 50;
            other.save_changes()?;

            writer.entity_mut(ann)?.age = 31;
            let err = writer.save_changes().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StaleData);

            let stored = ctx.transport().get_document("users/1").unwrap();
            assert_eq!(stored.data().get("age"), Some(&Value::from(50)));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_new_object_with_existing_key_is_rejected_by_server() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/7", doc! { name: "Existing", age: 1 }, doc! {})?;

            let mut session = ctx.store().open_session();
            session.store_with_etag(User::new("Ann", 30), Etag::empty())?;
            let mut ann = User::new("Ann", 30);
            ann.id = Some("users/7".to_string());
            session.store_with(ann, Etag::empty(), "users/7")?;

            let err = session.save_changes().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StaleData);
            assert_eq!(ctx.transport().document_count(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_last_written_etag_follows_saves() {
    run_test(
        create_test_context,
        |ctx| {
            let store = ctx.store();
            assert!(store.last_written_etag().is_none());

            let mut session = store.open_session();
            let ann = session.store(User::new("Ann", 30))?;
            session.save_changes()?;

            let etag = session.etag_for(ann)?;
            assert!(etag.is_some());
            assert_eq!(store.last_written_etag(), etag);
            assert_eq!(
                ctx.transport().get_document("users/1").unwrap().etag(),
                etag.as_ref()
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_custom_identity_field() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let order = session.store(Order {
                order_no: None,
                customer: "customers/1".to_string(),
                products: vec!["products/1".to_string()],
            })?;
            session.save_changes()?;

            assert_eq!(session.entity(order)?.order_no.as_deref(), Some("orders/1"));
            let stored = ctx.transport().get_document("orders/1").unwrap();
            assert!(!stored.data().contains_key("order_no"));
            assert_eq!(stored.data().get_str("customer"), Some("customers/1"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_failed_save_keeps_changes_for_retry() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let ann = session.load::<User>("users/1")?.unwrap();
            session.entity_mut(ann)?.age = 31;

            ctx.transport().fail_next_batch();
            let err = session.save_changes().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TransportError);
            assert!(session.has_changed(ann)?);

            session.save_changes()?;
            assert!(!session.has_changed(ann)?);
            assert_eq!(
                ctx.transport().get_document("users/1").unwrap().data().get("age"),
                Some(&Value::from(31))
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refresh_picks_up_server_state() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;

            let mut session = ctx.store().open_session();
            let ann = session.load::<User>("users/1")?.unwrap();
            session.entity_mut(ann)?.age = 99;

            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 45 }, doc! {})?;
            session.refresh(ann)?;

            assert_eq!(session.entity(ann)?.age, 45);
            assert!(!session.has_changed(ann)?);
            assert_eq!(
                session.etag_for(ann)?.as_ref(),
                ctx.transport().get_document("users/1").unwrap().etag()
            );
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refresh_of_deleted_document() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let ann = session.store(User::new("Ann", 30))?;
            session.save_changes()?;

            let mut other = ctx.store().open_session();
            other.delete_by_key("users/1")?;
            other.save_changes()?;

            let err = session.refresh(ann).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refresh_of_unsaved_object() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.set_generate_document_keys_on_store(false);
            let ann = session.store(User::new("Ann", 30))?;

            let err = session.refresh(ann).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_non_authoritative_documents() {
    run_test(
        create_test_context,
        |ctx| {
            ctx.transport()
                .put_document("users/1", doc! { name: "Ann", age: 30 }, doc! {})?;
            ctx.transport().mark_non_authoritative("users/1");

            let mut session = ctx.store().open_session();
            let err = session.load::<User>("users/1").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NonAuthoritativeData);

            let mut relaxed = ctx.store().open_session();
            relaxed.set_allow_non_authoritative_information(true);
            assert!(relaxed.load::<User>("users/1")?.is_some());
            Ok(())
        },
        cleanup,
    )
}
