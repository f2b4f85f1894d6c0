use cpstore_core::db::open_db_in_memory;
use cpstore_core::{
    new_partition_key, DbClient, DbIterator, DocumentDbClient, PartitionKey, ResourceDocument,
    ResourceId, SqliteDatabase, Subscription, SubscriptionDocument, SubscriptionState,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn setup(max_page_size: u32) -> DocumentDbClient {
    let db = SqliteDatabase::with_max_page_size(open_db_in_memory().unwrap(), max_page_size);
    DocumentDbClient::new(Arc::new(db), Duration::from_secs(30)).unwrap()
}

fn register(client: &DocumentDbClient, subscription_id: &str) -> SubscriptionDocument {
    let mut doc =
        SubscriptionDocument::new(subscription_id, Subscription::new(SubscriptionState::Registered));
    client.create_subscription_doc(subscription_id, &mut doc).unwrap();
    doc
}

fn listed_ids(client: &DocumentDbClient) -> BTreeSet<String> {
    client
        .list_all_subscription_docs()
        .collect_all()
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect()
}

#[test]
fn mixed_case_ids_share_one_document() {
    let client = setup(100);
    let created = register(&client, "ABCDEF01-2345-6789-ABCD-EF0123456789");
    assert_eq!(created.id, "abcdef01-2345-6789-abcd-ef0123456789");
    assert_eq!(created.partition_key, created.id);

    let fetched = client
        .get_subscription_doc("abcdef01-2345-6789-ABCD-ef0123456789")
        .unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.subscription.state, SubscriptionState::Registered);
    assert_eq!(
        new_partition_key("ABCDEF01-2345-6789-ABCD-EF0123456789").as_str(),
        fetched.partition_key
    );
}

#[test]
fn lists_subscriptions_across_partitions() {
    // Small pages force the index itself to span several pages.
    let client = setup(2);
    let expected: BTreeSet<String> = ["Sub-One", "SUB-TWO", "sub-three"]
        .iter()
        .map(|id| register(&client, id).id)
        .collect();

    // Resources in those partitions must not show up or change the count.
    for i in 0..5 {
        let id = ResourceId::parse(&format!("/subscriptions/Sub-One/resourceGroups/rg{i}")).unwrap();
        client
            .create_resource_doc(&mut ResourceDocument::new(id))
            .unwrap();
    }

    assert_eq!(listed_ids(&client), expected);
}

#[test]
fn index_entries_without_documents_are_skipped() {
    let client = setup(100);
    register(&client, "present");
    client
        .partition_index()
        .upsert(&PartitionKey::new("ghost"))
        .unwrap();

    let mut iter = client.list_all_subscription_docs();
    let ids: Vec<String> = iter.by_ref().map(|doc| doc.id).collect();
    assert_eq!(ids, vec!["present".to_string()]);
    assert!(iter.error().is_none());
    assert!(iter.continuation_token().is_none());
}

#[test]
fn index_upsert_is_idempotent() {
    let client = setup(100);
    register(&client, "sub");
    let index = client.partition_index();
    index.upsert(&PartitionKey::new("SUB")).unwrap();
    index.upsert(&PartitionKey::new("sub")).unwrap();

    let keys = index.list_keys().collect_all().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].id, "sub");
}

#[test]
fn update_and_delete_subscription() {
    let client = setup(100);
    register(&client, "Sub");

    assert!(client
        .update_subscription_doc("SUB", &mut |doc| {
            doc.subscription.state = SubscriptionState::Unregistered;
            true
        })
        .unwrap());
    assert_eq!(
        client.get_subscription_doc("sub").unwrap().subscription.state,
        SubscriptionState::Unregistered
    );

    client.delete_subscription_doc("sUb").unwrap();
    client.delete_subscription_doc("sub").unwrap();
    assert!(client.get_subscription_doc("sub").unwrap_err().is_not_found());

    // The index entry stays behind and listing skips it.
    assert_eq!(client.partition_index().list_keys().count(), 1);
    assert!(listed_ids(&client).is_empty());
}

#[test]
fn creating_twice_is_a_conflict() {
    let client = setup(100);
    register(&client, "dup");

    let mut again = SubscriptionDocument::new("DUP", Subscription::new(SubscriptionState::Warned));
    let err = client.create_subscription_doc("DUP", &mut again).unwrap_err();
    assert!(err.store_error().unwrap().is_conflict());
}
