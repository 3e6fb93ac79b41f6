//! # Store and Catalog Test Suite
//!
//! End-to-end scenarios over a real LMDB environment. Every test opens its own
//! store inside a temporary directory, so tests never share state and leave
//! nothing behind.
//!
//! ## Test Categories
//!
//! ### 1. Seeding and Import
//! - Seed counts, reference integrity, repeated seeding
//! - Bulk import of the bundled order and review datasets
//!
//! ### 2. Collection Operations
//! - Inserts with and without `_id`, find options, updates, deletes
//! - Index declaration, listing and dropping
//!
//! ### 3. Catalog Scenarios
//! - Aggregations with known answers (revenue, group counts, joins)
//! - Running every entry of a domain in order
//! - Inert entries and text search
//!
//! ### 4. Lifecycle
//! - Reset, close and reopen
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test test_seed_       # Seeding
//! cargo test test_catalog_    # Catalog scenarios
//! ```

#[cfg(test)]
pub mod tests {
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::app_response::AppResponse;
    use crate::catalog::{self, Domain, Outcome};
    use crate::collection::{FindOptions, ID_INDEX_NAME};
    use crate::config::StoreConfig;
    use crate::local_db_model::to_cents;
    use crate::local_db_state::AppDbState;
    use crate::seed;

    fn open_store() -> (TempDir, AppDbState) {
        let tmp = TempDir::new().unwrap();
        let db = AppDbState::init(&StoreConfig::new(tmp.path(), "kmidbt")).unwrap();
        (tmp, db)
    }

    fn seeded_store() -> (TempDir, AppDbState) {
        let (tmp, db) = open_store();
        seed::seed_database(&db).unwrap();
        seed::import_bundled_ecommerce(&db).unwrap();
        (tmp, db)
    }

    fn run(db: &AppDbState, key: &str) -> Outcome {
        catalog::entry(key).unwrap().run(db, false).unwrap()
    }

    fn ids(docs: &[Value]) -> Vec<i64> {
        docs.iter().filter_map(|doc| doc["_id"].as_i64()).collect()
    }

    // ===============================
    // SEEDING AND IMPORT
    // ===============================

    #[test]
    fn test_seed_counts() {
        let (_tmp, db) = open_store();
        let report = seed::seed_database(&db).unwrap();

        assert_eq!(report.count("departments"), Some(11));
        assert_eq!(report.count("employees"), Some(25));
        assert_eq!(report.count("salaries"), Some(19));
        assert_eq!(report.count("products"), Some(10));
        assert_eq!(report.count("customers"), Some(8));
        assert_eq!(report.count("orders"), None);
    }

    #[test]
    fn test_seed_references_resolve() {
        let (_tmp, db) = seeded_store();
        assert!(seed::verify_references(&db).unwrap().is_empty());

        db.collection("employees")
            .insert_one(json!({"_id": 999, "first_name": "Ghost", "manager_id": 100, "department_id": 999}))
            .unwrap();
        let dangling = seed::verify_references(&db).unwrap();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].field, "department_id");
        assert_eq!(dangling[0].value, json!(999));
    }

    #[test]
    fn test_seed_twice_is_rejected_without_partial_writes() {
        let (_tmp, db) = open_store();
        seed::seed_database(&db).unwrap();

        let err = seed::seed_database(&db).unwrap_err();
        assert!(err.is_duplicate_key(), "unexpected error: {}", err);
        assert_eq!(db.count("departments").unwrap(), 11);
        assert_eq!(db.count("employees").unwrap(), 25);
        assert_eq!(db.count("customers").unwrap(), 8);
    }

    #[test]
    fn test_import_bundled_datasets() {
        let (_tmp, db) = open_store();
        seed::seed_database(&db).unwrap();

        assert_eq!(seed::import_bundled_ecommerce(&db).unwrap(), 20);
        assert_eq!(db.count("orders").unwrap(), 8);
        assert_eq!(db.count("reviews").unwrap(), 12);
        assert!(seed::bundled_dataset("orders").is_some());
        assert!(seed::bundled_dataset("salaries").is_none());
    }

    #[test]
    fn test_import_rejects_non_arrays() {
        let (_tmp, db) = open_store();
        let result = seed::import_json_str(&db, "orders", r#"{"_id": 1}"#);
        assert!(matches!(result, Err(AppResponse::BadRequest(_))));
        assert_eq!(db.count("orders").unwrap(), 0);
    }

    #[test]
    fn test_import_orders_are_schemaless() {
        let (_tmp, db) = open_store();
        let orders = r#"[
            {"_id": 1, "customer_id": 1001, "status": "returned",
             "items": [{"product_id": 2, "quantity": 2, "price": 29.99}],
             "subtotal": 59.98, "tax": 4.80, "shipping": 0.0, "total": 64.78},
            {"_id": 2, "customer_id": 1002, "status": "pending", "total": 10.0}
        ]"#;

        assert_eq!(seed::import_json_str(&db, "orders", orders).unwrap(), 2);
        let returned = db.collection("orders").find(&json!({"status": "returned"})).unwrap();
        assert_eq!(ids(&returned), vec![1]);
        assert!(returned[0].get("shipping_address").is_none());
    }

    #[test]
    fn test_import_json_file() {
        let (tmp, db) = open_store();
        let path = tmp.path().join("reviews.json");
        std::fs::write(&path, seed::BUNDLED_REVIEWS).unwrap();

        assert_eq!(seed::import_json_file(&db, "reviews", &path).unwrap(), 12);
        assert!(seed::import_json_file(&db, "reviews", &tmp.path().join("missing.json")).is_err());
    }

    // ===============================
    // COLLECTION OPERATIONS
    // ===============================

    #[test]
    fn test_insert_one_generates_id() {
        let (_tmp, db) = open_store();
        let notes = db.collection("notes");

        let result = notes.insert_one(json!({"text": "hello"})).unwrap();
        let id = result.inserted_id.as_str().unwrap().to_string();
        assert_eq!(id.len(), 36);

        let stored = notes.find_by_id(&result.inserted_id).unwrap().unwrap();
        assert_eq!(stored["text"], "hello");
        assert_eq!(stored.as_object().unwrap().keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn test_insert_rejects_non_documents_and_empty_batches() {
        let (_tmp, db) = open_store();
        let notes = db.collection("notes");

        assert!(matches!(notes.insert_one(json!([1, 2])), Err(AppResponse::ValidationError(_))));
        assert!(matches!(notes.insert_many(Vec::new()), Err(AppResponse::BadRequest(_))));
    }

    #[test]
    fn test_insert_many_is_all_or_nothing() {
        let (_tmp, db) = open_store();
        let notes = db.collection("notes");
        notes.insert_one(json!({"_id": 2})).unwrap();

        let result = notes.insert_many(vec![json!({"_id": 1}), json!({"_id": 2}), json!({"_id": 3})]);
        assert!(matches!(result, Err(AppResponse::DuplicateKey { .. })));
        assert_eq!(notes.count_documents(&json!({})).unwrap(), 1);
    }

    #[test]
    fn test_find_options() {
        let (_tmp, db) = seeded_store();
        let products = db.collection("products");

        let options = FindOptions::default()
            .projection(json!({"name": 1}))
            .sort(json!({"price": -1}))
            .skip(1)
            .limit(2);
        let docs = products.find_with_options(&json!({}), &options).unwrap();

        assert_eq!(ids(&docs), vec![5, 7]);
        let keys: Vec<&String> = docs[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["_id", "name"]);
    }

    #[test]
    fn test_find_natural_order_and_projection_errors() {
        let (_tmp, db) = seeded_store();
        let employees = db.collection("employees");

        let it = employees.find(&json!({"department_id": 60})).unwrap();
        assert_eq!(ids(&it), vec![103, 104, 105, 106, 107]);

        let mixed = FindOptions::default().projection(json!({"first_name": 1, "salary": 0}));
        assert!(employees.find_with_options(&json!({}), &mixed).is_err());

        let by_score = FindOptions::default().sort(json!({"score": {"$meta": "textScore"}}));
        assert!(matches!(
            employees.find_with_options(&json!({}), &by_score),
            Err(AppResponse::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_text_score_projection_needs_text_query() {
        let (_tmp, db) = seeded_store();
        let products = db.collection("products");
        products.create_index(&json!({"name": "text", "description": "text"})).unwrap();

        let scored = FindOptions::default().projection(json!({"name": 1, "score": {"$meta": "textScore"}}));
        assert!(matches!(
            products.find_with_options(&json!({"price": {"$lt": 50}}), &scored),
            Err(AppResponse::InvalidQuery(_))
        ));

        let docs = products
            .find_with_options(&json!({"$text": {"$search": "wireless"}}), &scored)
            .unwrap();
        assert!(!docs.is_empty());
        assert!(docs.iter().all(|doc| doc["score"].as_f64().unwrap() > 0.0));

        let pipeline = [json!({"$project": {"score": {"$meta": "textScore"}}})];
        assert!(matches!(products.aggregate(&pipeline), Err(AppResponse::InvalidQuery(_))));
    }

    #[test]
    fn test_update_counts() {
        let (_tmp, db) = seeded_store();
        let products = db.collection("products");

        let result = products
            .update_many(&json!({"category": "Accessories"}), &json!({"$inc": {"stock": 20}}))
            .unwrap();
        assert_eq!(result.matched_count, 6);
        assert_eq!(result.modified_count, 6);
        assert_eq!(products.find_by_id(&json!(2)).unwrap().unwrap()["stock"], 170);

        // Setting a value that is already there matches without modifying.
        let result = products
            .update_one(&json!({"_id": 1}), &json!({"$set": {"category": "Electronics"}}))
            .unwrap();
        assert_eq!((result.matched_count, result.modified_count), (1, 0));

        let result = products
            .update_many(&json!({"category": "Garden"}), &json!({"$set": {"stock": 0}}))
            .unwrap();
        assert_eq!((result.matched_count, result.modified_count), (0, 0));

        assert!(products.update_one(&json!({"_id": 1}), &json!({"price": 10})).is_err());
    }

    #[test]
    fn test_delete_counts() {
        let (_tmp, db) = seeded_store();
        let reviews = db.collection("reviews");

        assert_eq!(reviews.delete_one(&json!({"customer_id": 1001})).unwrap().deleted_count, 1);
        assert_eq!(reviews.delete_many(&json!({"rating": {"$lt": 4}})).unwrap().deleted_count, 2);
        assert_eq!(reviews.delete_many(&json!({"rating": 0})).unwrap().deleted_count, 0);
        assert_eq!(reviews.count_documents(&json!({})).unwrap(), 9);
    }

    #[test]
    fn test_delete_all_then_find() {
        let (_tmp, db) = seeded_store();
        let reviews = db.collection("reviews");

        assert_eq!(reviews.delete_many(&json!({})).unwrap().deleted_count, 12);
        assert!(reviews.find(&json!({})).unwrap().is_empty());
        assert_eq!(reviews.count_documents(&json!({})).unwrap(), 0);
        assert!(reviews.find_one(&json!({"rating": 5})).unwrap().is_none());
    }

    #[test]
    fn test_failed_first_batch_leaves_empty_collection() {
        let (_tmp, db) = open_store();
        let notes = db.collection("notes");

        let result = notes.insert_many(vec![json!({"_id": 1}), json!({"_id": 1})]);
        assert!(matches!(result, Err(AppResponse::DuplicateKey { .. })));
        assert_eq!(notes.count_documents(&json!({})).unwrap(), 0);
        assert!(notes.find(&json!({})).unwrap().is_empty());
        assert_eq!(db.count("notes").unwrap(), 0);
    }

    #[test]
    fn test_index_lifecycle() {
        let (_tmp, db) = seeded_store();
        let products = db.collection("products");

        assert_eq!(products.create_index(&json!({"price": 1})).unwrap(), "price_1");
        assert_eq!(products.create_index(&json!({"price": 1})).unwrap(), "price_1");
        assert_eq!(
            products.create_index(&json!({"name": "text", "description": "text"})).unwrap(),
            "name_text_description_text"
        );
        assert!(matches!(
            products.create_index(&json!({"tags": "text"})),
            Err(AppResponse::BadRequest(_))
        ));

        let names: Vec<String> = products.list_indexes().unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec![ID_INDEX_NAME, "price_1", "name_text_description_text"]);

        products.drop_index("price_1").unwrap();
        assert!(matches!(products.drop_index("price_1"), Err(AppResponse::IndexNotFound(_))));
        assert!(matches!(products.drop_index(ID_INDEX_NAME), Err(AppResponse::BadRequest(_))));
        assert_eq!(products.list_indexes().unwrap().len(), 2);
    }

    // ===============================
    // CATALOG SCENARIOS
    // ===============================

    #[test]
    fn test_catalog_lookup() {
        assert_eq!(catalog::entries(Some(Domain::Hr)).len(), 32);
        assert_eq!(catalog::entries(Some(Domain::Ecommerce)).len(), 50);

        let all = catalog::entries(None);
        assert_eq!(all.len(), 82);
        let mut keys: Vec<String> = all.iter().map(|entry| entry.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 82);

        let entry = catalog::entry("hr-17").unwrap();
        assert_eq!(entry.title, "Average salary by department");
        assert!(!entry.request.is_write());
        assert!(catalog::entry("hr-21").unwrap().request.is_write());
        assert!(all.iter().filter(|entry| entry.inert).all(|entry| entry.request.is_write()));
        assert_eq!(catalog::entry("e-commerce-48").unwrap().number, 48);
        assert!(matches!(catalog::entry("hr-99"), Err(AppResponse::NotFound(_))));
        assert!(matches!(catalog::entry("sales-1"), Err(AppResponse::BadRequest(_))));
        assert!(matches!(catalog::entry("hr"), Err(AppResponse::BadRequest(_))));
    }

    #[test]
    fn test_catalog_total_revenue() {
        let (_tmp, db) = seeded_store();
        let outcome = run(&db, "ecommerce-23");
        let rows = outcome.documents();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["_id"], Value::Null);
        assert_eq!(rows[0]["order_count"], 8);
        assert_eq!(to_cents(rows[0]["total_revenue"].as_f64().unwrap()), 484803);
    }

    #[test]
    fn test_catalog_products_by_category() {
        let (_tmp, db) = seeded_store();
        let outcome = run(&db, "ecommerce-14");
        let rows = outcome.documents();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["_id"], "Accessories");
        assert_eq!(rows[0]["count"], 6);
        let total: i64 = rows.iter().filter_map(|row| row["count"].as_i64()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_catalog_hr_aggregations() {
        let (_tmp, db) = seeded_store();

        let by_department = run(&db, "hr-17");
        assert_eq!(by_department.documents()[0]["_id"], 90);
        assert_eq!(by_department.documents().len(), 11);

        // The group of employees without a manager has nobody to join.
        let managers = run(&db, "hr-20");
        assert_eq!(managers.documents().len(), 6);
        assert_eq!(managers.documents()[0]["manager_name"], "Steven King");
        assert_eq!(managers.documents()[0]["reports_count"], 7);

        let it = run(&db, "hr-15");
        assert_eq!(it.documents().len(), 5);
        assert!(it.documents().iter().all(|row| row["department_name"] == "IT"));

        match run(&db, "hr-14") {
            Outcome::Dereferenced { source, target } => {
                assert_eq!(source["first_name"], "Alexander");
                assert_eq!(target.unwrap()["department_name"], "IT");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_catalog_department_lookup_rows() {
        let (_tmp, db) = seeded_store();
        run(&db, "hr-22");

        let joined = db
            .collection("departments")
            .aggregate(&[json!({"$lookup": {
                "from": "employees",
                "localField": "_id",
                "foreignField": "department_id",
                "as": "staff"
            }})])
            .unwrap();
        let data_science = joined.iter().find(|dept| dept["_id"] == 120).unwrap();
        assert_eq!(data_science["staff"], json!([]));

        let unwound = db
            .collection("departments")
            .aggregate(&[
                json!({"$lookup": {"from": "employees", "localField": "_id", "foreignField": "department_id", "as": "staff"}}),
                json!({"$unwind": "$staff"}),
            ])
            .unwrap();
        assert_eq!(unwound.len(), 25);
        assert!(unwound.iter().all(|row| row["_id"] != 120));
    }

    #[test]
    fn test_catalog_loyalty_points() {
        let (_tmp, db) = seeded_store();
        let customers = db.collection("customers");

        customers
            .update_one(&json!({"_id": 1001}), &json!({"$inc": {"loyalty_points": 25}}))
            .unwrap();
        customers
            .update_one(&json!({"_id": 1001}), &json!({"$inc": {"loyalty_points": 25}}))
            .unwrap();
        assert_eq!(customers.find_by_id(&json!(1001)).unwrap().unwrap()["loyalty_points"], 500);

        run(&db, "ecommerce-33");
        match run(&db, "ecommerce-37") {
            Outcome::Updated(result) => assert_eq!(result.modified_count, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(customers.find_by_id(&json!(1009)).unwrap().unwrap()["loyalty_points"], 50);
    }

    #[test]
    fn test_catalog_text_search() {
        let (_tmp, db) = seeded_store();

        let missing = catalog::entry("ecommerce-49").unwrap().run(&db, false);
        assert!(matches!(missing, Err(AppResponse::IndexNotFound(_))));

        run(&db, "ecommerce-48");
        let wireless = run(&db, "ecommerce-49");
        assert!(ids(wireless.documents()).contains(&2));

        let scored = run(&db, "ecommerce-50");
        let scores: Vec<f64> = scored
            .documents()
            .iter()
            .map(|doc| doc["score"].as_f64().unwrap())
            .collect();
        assert!(!scores.is_empty());
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
        assert!(ids(scored.documents()).contains(&1));
    }

    #[test]
    fn test_catalog_inert_entries_need_force() {
        let (_tmp, db) = seeded_store();
        let entry = catalog::entry("hr-29").unwrap();
        assert!(entry.inert);

        assert!(matches!(entry.run(&db, false).unwrap(), Outcome::Skipped { .. }));
        assert_eq!(db.count("departments").unwrap(), 11);

        run(&db, "hr-22");
        match entry.run(&db, true).unwrap() {
            Outcome::Deleted(result) => assert_eq!(result.deleted_count, 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(db.count("departments").unwrap(), 11);
    }

    #[test]
    fn test_catalog_run_hr_in_order() {
        let (_tmp, db) = seeded_store();
        for entry in catalog::entries(Some(Domain::Hr)) {
            let outcome = entry.run(&db, false);
            assert!(outcome.is_ok(), "{} failed: {:?}", entry.key(), outcome);
        }

        // Employee 300 is inserted, raised and deleted again.
        assert_eq!(db.count("employees").unwrap(), 25);
        assert_eq!(db.count("departments").unwrap(), 13);
        let hunold = db.collection("employees").find_by_id(&json!(103)).unwrap().unwrap();
        assert_eq!(hunold["email_domain"], "@company.com");
        assert!((hunold["salary"].as_f64().unwrap() - 9900.0).abs() < 1e-6);
    }

    #[test]
    fn test_catalog_run_ecommerce_in_order() {
        let (_tmp, db) = seeded_store();
        for entry in catalog::entries(Some(Domain::Ecommerce)) {
            let outcome = entry.run(&db, false);
            assert!(outcome.is_ok(), "{} failed: {:?}", entry.key(), outcome);
        }

        assert_eq!(db.count("products").unwrap(), 11);
        assert_eq!(db.count("customers").unwrap(), 9);
        let order = db.collection("orders").find_by_id(&json!(2009)).unwrap().unwrap();
        assert_eq!(order["status"], "shipped");
        let chair = db.collection("products").find_by_id(&json!(11)).unwrap().unwrap();
        assert_eq!(chair["stock"], 24);
        assert_eq!(chair["price"], 279.99);

        // Inserts are not idempotent.
        let again = catalog::entry("ecommerce-33").unwrap().run(&db, false);
        assert!(matches!(again, Err(AppResponse::DuplicateKey { .. })));
    }

    #[test]
    fn test_catalog_outcome_json() {
        let (_tmp, db) = seeded_store();
        let outcome = run(&db, "ecommerce-35");
        assert_eq!(outcome.to_json().unwrap(), json!({"matched_count": 0, "modified_count": 0}));

        let skipped = catalog::entry("ecommerce-43").unwrap().run(&db, false).unwrap();
        assert_eq!(skipped.to_json().unwrap(), json!({"skipped": "ecommerce-43 is inert"}));
    }

    // ===============================
    // LIFECYCLE
    // ===============================

    #[test]
    fn test_reset_database() {
        let (_tmp, db) = seeded_store();
        db.collection("products").create_index(&json!({"price": 1})).unwrap();

        db.reset_database().unwrap();
        assert_eq!(db.count("employees").unwrap(), 0);
        assert!(db.collection("employees").find(&json!({})).unwrap().is_empty());
        assert_eq!(db.count("orders").unwrap(), 0);
        assert_eq!(db.collection("products").list_indexes().unwrap().len(), 1);

        // A reset store can be seeded again.
        seed::seed_database(&db).unwrap();
        assert_eq!(db.count("employees").unwrap(), 25);
    }

    #[test]
    fn test_clear_all_records() {
        let (_tmp, db) = seeded_store();
        db.collection("reviews").create_index(&json!({"rating": -1})).unwrap();

        assert_eq!(db.clear_all_records("reviews").unwrap(), 12);
        assert_eq!(db.count("reviews").unwrap(), 0);
        assert_eq!(db.count("orders").unwrap(), 8);
        assert_eq!(db.collection("reviews").list_indexes().unwrap().len(), 2);
        assert_eq!(db.clear_all_records("never_written").unwrap(), 0);
    }

    #[test]
    fn test_metadata_collection_is_reserved() {
        let (_tmp, db) = seeded_store();
        let products = db.collection("products");
        products.create_index(&json!({"name": "text", "description": "text"})).unwrap();

        assert!(matches!(
            db.collection("_meta").find(&json!({})),
            Err(AppResponse::ValidationError(_))
        ));
        assert!(matches!(db.clear_all_records("_meta"), Err(AppResponse::ValidationError(_))));
        assert!(matches!(db.count("_meta"), Err(AppResponse::ValidationError(_))));

        // Index specs survive the rejected calls.
        assert_eq!(products.list_indexes().unwrap().len(), 2);
        let hits = products.find(&json!({"$text": {"$search": "wireless"}})).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_close_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path(), "kmidbt");

        let db = AppDbState::init(&config).unwrap();
        seed::seed_database(&db).unwrap();
        db.collection("products").create_index(&json!({"price": 1})).unwrap();
        db.close_database().unwrap();

        let db = AppDbState::init(&config).unwrap();
        assert_eq!(db.count("employees").unwrap(), 25);
        assert_eq!(db.collection("products").list_indexes().unwrap().len(), 2);
        assert!(config.environment_path().ends_with("kmidbt.lmdb"));
    }

    #[test]
    fn test_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let result = AppDbState::init(&StoreConfig::new(tmp.path(), "a/b"));
        assert!(matches!(result, Err(AppResponse::ValidationError(_))));

        let result = AppDbState::init(&StoreConfig::new(tmp.path(), "kmidbt").with_map_size(1024));
        assert!(matches!(result, Err(AppResponse::ValidationError(_))));
    }
}
