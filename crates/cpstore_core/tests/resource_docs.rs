use cpstore_core::db::open_db_in_memory;
use cpstore_core::model::document::RESOURCES_CONTAINER;
use cpstore_core::repo::RepoError;
use cpstore_core::store::{ItemQuery, QueryOptions};
use cpstore_core::{
    Container, Database, DbClient, DbIterator, DocumentDbClient, PartitionKey, ProvisioningState,
    ResourceDocument, ResourceId, SqliteDatabase,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const CLUSTER: &str = "/subscriptions/Sub-A/resourceGroups/MyGroup/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/Cluster1";

fn setup(max_page_size: u32) -> (DocumentDbClient, SqliteDatabase) {
    let db = SqliteDatabase::with_max_page_size(open_db_in_memory().unwrap(), max_page_size);
    let client = DocumentDbClient::new(Arc::new(db.clone()), Duration::from_secs(30)).unwrap();
    (client, db)
}

fn rid(value: &str) -> ResourceId {
    ResourceId::parse(value).unwrap()
}

fn create(client: &DocumentDbClient, id: &str) -> ResourceDocument {
    let mut doc = ResourceDocument::new(rid(id));
    client.create_resource_doc(&mut doc).unwrap();
    doc
}

fn create_pools(client: &DocumentDbClient, count: usize) -> BTreeSet<String> {
    (0..count)
        .map(|i| {
            let doc = create(client, &format!("{CLUSTER}/nodePools/Pool{i}"));
            doc.key
        })
        .collect()
}

#[test]
fn create_normalizes_keys_and_get_returns_caller_casing() {
    let (client, _) = setup(100);
    let created = create(&client, CLUSTER);

    assert_eq!(created.partition_key, "sub-a");
    assert_eq!(created.key, CLUSTER.to_lowercase());
    assert_eq!(created.id, created.id.to_lowercase());
    assert!(created.etag.is_some());

    let shouted = rid(&CLUSTER.to_uppercase());
    let fetched = client.get_resource_doc(&shouted).unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.resource_id.as_str(), shouted.as_str());
    assert!(fetched.etag.is_some());
}

#[test]
fn get_missing_resource_is_not_found() {
    let (client, _) = setup(100);
    let err = client.get_resource_doc(&rid(CLUSTER)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn update_applies_mutation_and_changes_etag() {
    let (client, _) = setup(100);
    let created = create(&client, CLUSTER);

    let changed = client
        .update_resource_doc(&rid(CLUSTER), &mut |doc| {
            doc.provisioning_state = ProvisioningState::Succeeded;
            true
        })
        .unwrap();
    assert!(changed);

    let fetched = client.get_resource_doc(&rid(CLUSTER)).unwrap();
    assert_eq!(fetched.provisioning_state, ProvisioningState::Succeeded);
    assert_ne!(fetched.etag, created.etag);
}

#[test]
fn delete_is_idempotent() {
    let (client, _) = setup(100);
    create(&client, CLUSTER);

    client.delete_resource_doc(&rid(CLUSTER)).unwrap();
    assert!(client.get_resource_doc(&rid(CLUSTER)).unwrap_err().is_not_found());

    client.delete_resource_doc(&rid(CLUSTER)).unwrap();
}

#[test]
fn full_drain_returns_every_child_across_pages() {
    let (client, _) = setup(3);
    create(&client, CLUSTER);
    let expected = create_pools(&client, 7);
    // Shares the textual prefix but is not below the cluster.
    create(&client, &format!("{CLUSTER}0/nodePools/Other"));

    let mut iter = client.list_resource_docs(&rid(CLUSTER), -1, None);
    let keys: BTreeSet<String> = iter.by_ref().map(|doc| doc.key).collect();

    assert_eq!(keys, expected);
    assert!(iter.error().is_none());
    assert!(iter.continuation_token().is_none());
}

#[test]
fn prefix_match_ignores_case() {
    let (client, _) = setup(100);
    let expected = create_pools(&client, 2);

    let docs = client
        .list_resource_docs(&rid(&CLUSTER.to_lowercase()), 0, None)
        .collect_all()
        .unwrap();
    let keys: BTreeSet<String> = docs.into_iter().map(|doc| doc.key).collect();
    assert_eq!(keys, expected);
}

const UMLAUT_GROUP: &str = "/subscriptions/Sub-A/resourceGroups/ÜBER";

#[test]
fn non_ascii_ids_round_trip_through_lookups() {
    let (client, db) = setup(100);
    let cluster = format!("{UMLAUT_GROUP}/providers/Microsoft.RedHatOpenShift/hcpOpenShiftClusters/Ärger");
    let created = create(&client, &cluster);
    assert_eq!(
        created.key,
        "/subscriptions/sub-a/resourcegroups/über/providers/microsoft.redhatopenshift/hcpopenshiftclusters/ärger"
    );

    let same = client.get_resource_doc(&rid(&cluster)).unwrap();
    assert_eq!(same.id, created.id);
    let lowered = client.get_resource_doc(&rid(&cluster.to_lowercase())).unwrap();
    assert_eq!(lowered.id, created.id);
    assert_eq!(lowered.resource_id.as_str(), cluster.to_lowercase());

    let listed = client
        .list_resource_docs(&rid("/subscriptions/sub-a/resourceGroups/über"), -1, None)
        .collect_all()
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);

    client.delete_resource_doc(&rid(&cluster)).unwrap();
    assert!(client.get_resource_doc(&rid(&cluster)).unwrap_err().is_not_found());
    let container = db.container(RESOURCES_CONTAINER).unwrap();
    let remaining = container
        .query_items(
            &PartitionKey::new("sub-a"),
            &ItemQuery::All,
            &QueryOptions::default(),
        )
        .unwrap();
    assert!(remaining.items.is_empty());
}

#[test]
fn non_ascii_prefix_does_not_match_other_groups() {
    let (client, _) = setup(100);
    create(&client, &format!("{UMLAUT_GROUP}/providers/Microsoft.X/clusters/A"));
    create(&client, "/subscriptions/Sub-A/resourceGroups/UBER/providers/Microsoft.X/clusters/B");

    let listed = client
        .list_resource_docs(&rid("/subscriptions/SUB-A/resourceGroups/über"), -1, None)
        .collect_all()
        .unwrap();
    let names: Vec<&str> = listed.iter().map(|doc| doc.resource_id.name()).collect();
    assert_eq!(names, vec!["A"]);
}

#[test]
fn single_page_listing_can_be_resumed() {
    let (client, _) = setup(100);
    let expected = create_pools(&client, 5);

    let mut first = client.list_resource_docs(&rid(CLUSTER), 2, None);
    let first_keys: Vec<String> = first.by_ref().map(|doc| doc.key).collect();
    assert_eq!(first_keys.len(), 2);
    let token = first.continuation_token().map(str::to_string);
    assert!(token.is_some());

    let mut rest = client.list_resource_docs(&rid(CLUSTER), -1, token);
    let rest_keys: Vec<String> = rest.by_ref().map(|doc| doc.key).collect();
    assert_eq!(rest_keys.len(), 3);
    assert!(rest.continuation_token().is_none());

    let all: BTreeSet<String> = first_keys.into_iter().chain(rest_keys).collect();
    assert_eq!(all, expected);
}

#[test]
fn undecodable_item_ends_listing_with_error() {
    let (client, db) = setup(100);
    create(&client, &format!("{CLUSTER}/nodePools/Pool0"));

    let container = db.container(RESOURCES_CONTAINER).unwrap();
    let broken = format!("{CLUSTER}/nodePools/Broken");
    let corrupt = format!(
        r#"{{"id":"corrupt","key":"{}","resourceId":"{broken}"}}"#,
        broken.to_lowercase()
    );
    container
        .create_item(&PartitionKey::new("sub-a"), corrupt.as_bytes())
        .unwrap();
    create(&client, &format!("{CLUSTER}/nodePools/Pool2"));

    let mut iter = client.list_resource_docs(&rid(CLUSTER), -1, None);
    assert!(iter.next().is_some());
    assert!(iter.next().is_none());
    assert!(matches!(iter.error(), Some(RepoError::Unmarshal { .. })));

    let err = client
        .list_resource_docs(&rid(CLUSTER), -1, None)
        .collect_all()
        .unwrap_err();
    assert!(matches!(err, RepoError::Unmarshal { .. }));
}

#[test]
fn garbage_continuation_token_is_reported() {
    let (client, _) = setup(100);
    create_pools(&client, 1);

    let mut iter = client.list_resource_docs(&rid(CLUSTER), -1, Some("garbage".to_string()));
    assert!(iter.next().is_none());
    let err = iter.take_error().unwrap();
    assert!(matches!(
        err.store_error(),
        Some(cpstore_core::StoreError::InvalidContinuationToken(_))
    ));
}
