// Tests for included documents and known-missing keys
use docket::doc;
use docket::document::JsonDocument;
use docket_int_test::test_util::{cleanup, create_test_context, run_test, Order, User};

#[test]
fn test_included_document_loads_without_request() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.track_included_document(JsonDocument::new(
                "users/3",
                doc! { name: "Cid", age: 52 },
                doc! {},
            ));
            assert!(session.is_loaded("users/3"));

            let cid = session.load::<User>("users/3")?.unwrap();
            assert_eq!(session.entity(cid)?.name, "Cid");
            assert_eq!(session.number_of_requests(), 0);
            assert_eq!(ctx.transport().fetch_count(), 0);
            assert!(session.is_loaded("users/3"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_known_missing_key_is_never_fetched() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.register_missing("users/404");
            assert!(session.is_deleted("USERS/404"));
            assert!(session.load::<User>("users/404")?.is_none());
            assert_eq!(ctx.transport().fetch_count(), 0);

            session.unregister_missing("users/404");
            assert!(!session.is_deleted("users/404"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_id_already_included() {
    run_test(
        create_test_context,
        |ctx| {
            let order = doc! {
                customer: "customers/1",
                products: ["products/1", "products/2"],
            };
            ctx.transport().put_document("orders/1", order.clone(), doc! {})?;

            let mut session = ctx.store().open_session();
            assert!(!session.check_if_id_already_included(&["orders/1"], &[]));

            let loaded = session.load::<Order>("orders/1")?.unwrap();
            assert_eq!(session.entity(loaded)?.products.len(), 2);
            assert!(session.check_if_id_already_included(&["orders/1"], &[]));
            assert!(!session.check_if_id_already_included(&["orders/1"], &["customer"]));

            session.track_included_document(JsonDocument::new(
                "customers/1",
                doc! { name: "Acme" },
                doc! {},
            ));
            assert!(session.check_if_id_already_included(&["orders/1"], &["customer"]));
            assert!(!session.check_if_id_already_included(&["orders/1"], &["products"]));

            session.register_missing_includes(&[order], &["products"]);
            assert!(session.is_deleted("products/1"));
            assert!(session.is_deleted("products/2"));
            assert!(!session.is_deleted("customers/1"));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_known_missing_ids_count_as_included() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.register_missing("orders/9");
            assert!(session.check_if_id_already_included(&["orders/9"], &["customer"]));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_by_key_drops_included_document() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            session.track_included_document(JsonDocument::new(
                "users/3",
                doc! { name: "Cid", age: 52 },
                doc! {},
            ));
            session.delete_by_key("users/3")?;

            assert!(!session.is_loaded("users/3"));
            assert!(session.load::<User>("users/3")?.is_none());
            assert_eq!(session.deferred_commands_count(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_placeholder_for_missing_document() {
    run_test(
        create_test_context,
        |ctx| {
            let mut session = ctx.store().open_session();
            let tracked = session.track_document::<User>(JsonDocument::new(
                "users/8",
                doc! {},
                doc! { "Raven-Document-Does-Not-Exists": true },
            ))?;
            assert!(tracked.is_none());
            assert_eq!(session.number_of_entities_in_unit_of_work(), 0);
            Ok(())
        },
        cleanup,
    )
}
