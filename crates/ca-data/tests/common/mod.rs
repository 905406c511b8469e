//! Audit scenarios shared by the in-memory and SQLite test suites.
//!
//! Each scenario takes a fresh, empty store with the catalog schema.

use std::sync::Arc;

use ca_data::{
    row, AuditConfig, AuditRow, CatalogContext, ColumnDef, ColumnType, Entity, EntityModel,
    ExecutionContext, Product, SaveError, SaveOptions, Store, StoreError, UnitOfWork,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tokio_test::{assert_err, assert_ok};

/// A note whose creation time is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub body: String,
    pub created_at: Option<String>,
}

static NOTE_MODEL: EntityModel = EntityModel {
    table_name: "Notes",
    columns: &[
        ColumnDef::key("id", ColumnType::Integer).generated_on_add(),
        ColumnDef::new("body", ColumnType::Text),
        ColumnDef::new("created_at", ColumnType::Timestamp)
            .nullable()
            .generated_on_add(),
    ],
};

impl Entity for Note {
    fn model() -> &'static EntityModel {
        &NOTE_MODEL
    }
}

/// Catalog tables plus `Notes`.
pub fn models() -> Vec<&'static EntityModel> {
    let mut models = CatalogContext::<ca_data::MemoryStore>::models();
    models.push(Note::model());
    models
}

pub fn alice() -> ExecutionContext {
    ExecutionContext::create("alice")
}

pub fn catalog<S: Store + 'static>(store: &Arc<S>) -> CatalogContext<S> {
    CatalogContext::new(store.clone(), AuditConfig::default())
}

async fn product_audits<S: Store + 'static>(catalog: &CatalogContext<S>) -> Vec<AuditRow> {
    catalog.audit_log().find_by_table("Products").await.unwrap()
}

/// Insert a product and return its generated id.
async fn seed_widget<S: Store + 'static>(store: &Arc<S>, price: f64) -> i64 {
    let mut catalog = catalog(store);
    let widget = catalog
        .products()
        .add(Product::new("Widget").with_price(price))
        .unwrap();
    catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();
    let id = catalog.products().get(widget).unwrap().id;
    id
}

pub async fn nothing_to_save_writes_no_audits<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    let rows = assert_ok!(catalog.save_changes(&alice(), SaveOptions::default()).await);
    assert_eq!(rows, 0);

    let id = seed_widget(&store, 1.0).await;
    let mut reader = catalog;
    reader.products().find(&row! { "id" => id }).await.unwrap().unwrap();
    let rows = reader.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    assert_eq!(rows, 0);
    assert_eq!(reader.audit_log().count().await.unwrap(), 1);
}

pub async fn insert_records_generated_key<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    let widget = catalog.products().add(Product::new("Widget")).unwrap();

    let rows = catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    assert_eq!(rows, 1);
    let id = catalog.products().get(widget).unwrap().id;
    assert!(id > 0);

    let audits = product_audits(&catalog).await;
    assert_eq!(audits.len(), 1);
    let audit = &audits[0];
    assert_eq!(audit.table_name, "Products");
    assert_eq!(audit.action, "Added");
    assert_eq!(audit.username.as_deref(), Some("alice"));
    assert_eq!(audit.key_values_map().unwrap(), row! { "id" => id });
    assert_eq!(audit.new_values.as_deref(), Some(r#"{"name":"Widget","price":0.0}"#));
    assert!(audit.old_values.is_none());
}

pub async fn update_records_changed_columns_only<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    let widget = catalog
        .products()
        .add(Product::new("Widget").with_price(10.0))
        .unwrap();
    catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    catalog.products().get_mut(widget).unwrap().price = 12.0;
    let rows = catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();
    assert_eq!(rows, 1);

    let id = catalog.products().get(widget).unwrap().id;
    let history = catalog
        .audit_log()
        .find_by_entity("Products", &row! { "id" => id })
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    let update = &history[1];
    assert_eq!(update.action, "Modified");
    assert_eq!(update.key_values_map().unwrap(), row! { "id" => id });
    assert_eq!(update.old_values_map().unwrap(), row! { "price" => 10.0 });
    assert_eq!(update.new_values_map().unwrap(), row! { "price" => 12.0 });
}

pub async fn delete_records_original_values<S: Store + 'static>(store: Arc<S>) {
    let id = seed_widget(&store, 10.0).await;

    let mut catalog = catalog(&store);
    let widget = catalog.products().find(&row! { "id" => id }).await.unwrap().unwrap();
    catalog.products().get_mut(widget).unwrap().name = "Renamed before delete".to_string();
    catalog.products().remove(widget).unwrap();

    let ctx = ExecutionContext::anonymous();
    let rows = catalog.save_changes(&ctx, SaveOptions::default()).await.unwrap();
    assert_eq!(rows, 1);

    let audits = product_audits(&catalog).await;
    assert_eq!(audits.len(), 2);
    let delete = &audits[1];
    assert_eq!(delete.action, "Deleted");
    assert_eq!(delete.username, None);
    assert_eq!(delete.key_values_map().unwrap(), row! { "id" => id });
    assert_eq!(
        delete.old_values_map().unwrap(),
        row! { "name" => "Widget", "price" => 10.0 }
    );
    assert!(delete.new_values.is_none());
    assert!(catalog.products().all().await.unwrap().is_empty());
}

pub async fn audit_rows_are_not_audited<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    catalog.products().add(Product::new("Widget")).unwrap();
    catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    assert!(catalog.audits().local().is_empty());
    let rows = catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    assert_eq!(rows, 0);
    assert_eq!(catalog.audit_log().count().await.unwrap(), 1);
    let tables: Vec<String> = catalog
        .audit_log()
        .find_recent(10)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.table_name)
        .collect();
    assert_eq!(tables, vec!["Products"]);
}

pub async fn records_follow_tracking_order<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    for name in ["A", "B", "C"] {
        catalog.products().add(Product::new(name)).unwrap();
    }
    assert_eq!(catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap(), 3);

    let names: Vec<String> = product_audits(&catalog)
        .await
        .iter()
        .map(|a| a.new_values_map().unwrap()["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

pub async fn failed_commit_writes_no_audits<S: Store + 'static>(store: Arc<S>) {
    let id = seed_widget(&store, 1.0).await;

    let mut catalog = catalog(&store);
    let duplicate = Product {
        id,
        name: "Duplicate".to_string(),
        price: 2.0,
    };
    catalog.products().add(duplicate).unwrap();
    catalog.products().add(Product::new("Innocent")).unwrap();

    let err = assert_err!(catalog.save_changes(&alice(), SaveOptions::default()).await);

    assert!(!err.is_data_committed());
    assert!(matches!(err, SaveError::Commit(StoreError::Constraint { .. })));
    assert_eq!(catalog.audit_log().count().await.unwrap(), 1);
    assert_eq!(catalog.products().all().await.unwrap().len(), 1);
}

pub async fn disabled_audit_passes_through<S: Store + 'static>(store: Arc<S>) {
    let config = AuditConfig {
        enabled: false,
        ..AuditConfig::default()
    };
    let mut catalog = CatalogContext::new(store, config);
    catalog.products().add(Product::new("Widget")).unwrap();

    let rows = catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();

    assert_eq!(rows, 1);
    assert_eq!(catalog.audit_log().count().await.unwrap(), 0);
}

pub async fn generated_values_resolve_after_commit<S: Store + 'static>(store: Arc<S>) {
    let mut catalog = catalog(&store);
    let note = catalog
        .session_mut()
        .add(Note {
            body: "first".to_string(),
            ..Default::default()
        })
        .unwrap();

    let records = catalog.auditing().snapshot_changes(&alice()).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].key_values.is_empty());
    assert_eq!(records[0].new_values, row! { "body" => "first" });
    let pending: Vec<&str> = records[0].pending_columns.iter().map(|c| c.name).collect();
    assert_eq!(pending, vec!["id", "created_at"]);

    let rows = catalog.save_changes(&alice(), SaveOptions::default()).await.unwrap();
    assert_eq!(rows, 1);

    let saved = catalog.session().get(note).unwrap().clone();
    assert!(saved.id > 0);
    let created_at = saved.created_at.clone().unwrap();
    assert!(DateTime::parse_from_rfc3339(&created_at).is_ok());

    let audits = catalog.audit_log().find_by_table("Notes").await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].key_values_map().unwrap(), row! { "id" => saved.id });
    assert_eq!(
        audits[0].new_values_map().unwrap(),
        row! { "body" => "first", "created_at" => created_at }
    );
}
