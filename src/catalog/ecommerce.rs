use serde_json::{json, Value};

use super::{aggregate, all, find, find_with, CatalogEntry, Domain, Request, Theme};
use crate::collection::FindOptions;

fn entry(number: u32, title: &'static str, theme: Theme, request: Request) -> CatalogEntry {
    CatalogEntry::new(Domain::Ecommerce, number, title, theme, request)
}

fn update_one(collection: &'static str, filter: Value, update: Value) -> Request {
    Request::UpdateOne {
        collection,
        filter,
        update,
    }
}

fn insert_one(collection: &'static str, document: Value) -> Request {
    Request::InsertOne {
        collection,
        document,
    }
}

fn seattle() -> Value {
    json!({"street": "555 Broadway", "city": "Seattle", "state": "WA", "zip": "98101", "country": "USA"})
}

fn customer_name() -> Value {
    json!({"$concat": ["$customer.first_name", " ", "$customer.last_name"]})
}

fn join(from: &str, local: &str, foreign: &str, as_field: &str) -> Value {
    json!({"$lookup": {"from": from, "localField": local, "foreignField": foreign, "as": as_field}})
}

pub(super) fn entries() -> Vec<CatalogEntry> {
    vec![
        // Basic product queries
        entry(1, "Find all products", Theme::BasicQuery, find("products", all())),
        entry(2, "Find electronics products", Theme::BasicQuery, find("products", json!({"category": "Electronics"}))),
        entry(3, "Find products under $50", Theme::BasicQuery, find("products", json!({"price": {"$lt": 50}}))),
        entry(
            4,
            "Find products with low stock (less than 50)",
            Theme::BasicQuery,
            find("products", json!({"stock": {"$lt": 50}})),
        ),
        entry(5, "Find products by tag", Theme::BasicQuery, find("products", json!({"tags": "laptop"}))),
        entry(
            6,
            "Search products by name (case-insensitive)",
            Theme::BasicQuery,
            find("products", json!({"name": {"$regex": "laptop", "$options": "i"}})),
        ),
        // Embedded documents
        entry(
            7,
            "Find products with specific CPU specification",
            Theme::EmbeddedDocuments,
            find("products", json!({"specifications.cpu": "Intel i7"})),
        ),
        entry(
            8,
            "Find wireless connectivity products",
            Theme::EmbeddedDocuments,
            find("products", json!({"specifications.connectivity": {"$regex": "wireless", "$options": "i"}})),
        ),
        entry(
            9,
            "Find products with noise cancelling feature",
            Theme::EmbeddedDocuments,
            find("products", json!({"specifications.noise_cancelling": true})),
        ),
        entry(
            10,
            "Find customers in a specific city",
            Theme::EmbeddedDocuments,
            find("customers", json!({"address.city": "New York"})),
        ),
        entry(
            11,
            "Find customers in California",
            Theme::EmbeddedDocuments,
            find("customers", json!({"address.state": "CA"})),
        ),
        // Arrays
        entry(
            12,
            "Find products with multiple specific tags",
            Theme::ArrayOperations,
            find("products", json!({"tags": {"$all": ["laptop", "computer"]}})),
        ),
        entry(
            13,
            "Find products with any of these tags",
            Theme::ArrayOperations,
            find("products", json!({"tags": {"$in": ["wireless", "bluetooth"]}})),
        ),
        entry(
            14,
            "Count products by category",
            Theme::ArrayOperations,
            aggregate(
                "products",
                json!([
                    {"$group": {"_id": "$category", "count": {"$sum": 1}, "avg_price": {"$avg": "$price"}}},
                    {"$sort": {"count": -1}}
                ]),
            ),
        ),
        // Customers
        entry(
            15,
            "Find VIP customers (loyalty points > 1000)",
            Theme::CustomerQueries,
            find("customers", json!({"loyalty_points": {"$gt": 1000}})),
        ),
        entry(
            16,
            "Find customers registered in 2023",
            Theme::CustomerQueries,
            find("customers", json!({"registration_date": {"$gte": "2023-01-01", "$lt": "2024-01-01"}})),
        ),
        entry(
            17,
            "Customers sorted by loyalty points",
            Theme::CustomerQueries,
            find_with("customers", all(), FindOptions::default().sort(json!({"loyalty_points": -1}))),
        ),
        // Orders
        entry(18, "Find all orders for a specific customer", Theme::OrderQueries, find("orders", json!({"customer_id": 1001}))),
        entry(19, "Find orders with status delivered", Theme::OrderQueries, find("orders", json!({"status": "delivered"}))),
        entry(20, "Find orders over $1000", Theme::OrderQueries, find("orders", json!({"total": {"$gt": 1000}}))),
        entry(
            21,
            "Find orders containing a specific product",
            Theme::OrderQueries,
            find("orders", json!({"items.product_id": 1})),
        ),
        entry(
            22,
            "Find orders with more than 2 items",
            Theme::OrderQueries,
            find("orders", json!({"$expr": {"$gt": [{"$size": "$items"}, 2]}})),
        ),
        entry(
            23,
            "Calculate total revenue",
            Theme::OrderQueries,
            aggregate(
                "orders",
                json!([{"$group": {
                    "_id": null,
                    "total_revenue": {"$sum": "$total"},
                    "order_count": {"$sum": 1},
                    "avg_order_value": {"$avg": "$total"}
                }}]),
            ),
        ),
        // Joins
        entry(
            24,
            "Orders with customer information",
            Theme::Relationships,
            aggregate(
                "orders",
                json!([
                    join("customers", "customer_id", "_id", "customer"),
                    {"$unwind": "$customer"},
                    {"$project": {
                        "order_id": "$_id",
                        "order_date": 1,
                        "total": 1,
                        "customer_name": customer_name(),
                        "customer_email": "$customer.email"
                    }}
                ]),
            ),
        ),
        entry(
            25,
            "Find customer's total spending",
            Theme::Relationships,
            aggregate(
                "orders",
                json!([
                    {"$group": {"_id": "$customer_id", "total_spent": {"$sum": "$total"}, "order_count": {"$sum": 1}}},
                    join("customers", "_id", "_id", "customer"),
                    {"$unwind": "$customer"},
                    {"$project": {
                        "customer_name": customer_name(),
                        "total_spent": {"$round": ["$total_spent", 2]},
                        "order_count": 1,
                        "avg_order_value": {"$round": [{"$divide": ["$total_spent", "$order_count"]}, 2]}
                    }},
                    {"$sort": {"total_spent": -1}}
                ]),
            ),
        ),
        entry(
            26,
            "Products with their reviews",
            Theme::Relationships,
            aggregate(
                "products",
                json!([
                    join("reviews", "_id", "product_id", "reviews"),
                    {"$project": {
                        "name": 1,
                        "price": 1,
                        "review_count": {"$size": "$reviews"},
                        "avg_rating": {"$avg": "$reviews.rating"}
                    }},
                    {"$sort": {"review_count": -1}}
                ]),
            ),
        ),
        entry(
            27,
            "Top rated products (average rating >= 4.5)",
            Theme::Relationships,
            aggregate(
                "reviews",
                json!([
                    {"$group": {
                        "_id": "$product_id",
                        "avg_rating": {"$avg": "$rating"},
                        "review_count": {"$sum": 1},
                        "total_helpful": {"$sum": "$helpful_count"}
                    }},
                    {"$match": {"avg_rating": {"$gte": 4.5}}},
                    join("products", "_id", "_id", "product"),
                    {"$unwind": "$product"},
                    {"$project": {
                        "product_name": "$product.name",
                        "category": "$product.category",
                        "price": "$product.price",
                        "avg_rating": {"$round": ["$avg_rating", 2]},
                        "review_count": 1,
                        "total_helpful": 1
                    }},
                    {"$sort": {"avg_rating": -1, "review_count": -1}}
                ]),
            ),
        ),
        // Analytics
        entry(
            28,
            "Sales by product category",
            Theme::Analytics,
            aggregate(
                "orders",
                json!([
                    {"$unwind": "$items"},
                    join("products", "items.product_id", "_id", "product"),
                    {"$unwind": "$product"},
                    {"$group": {
                        "_id": "$product.category",
                        "total_sales": {"$sum": {"$multiply": ["$items.quantity", "$items.price"]}},
                        "units_sold": {"$sum": "$items.quantity"}
                    }},
                    {"$sort": {"total_sales": -1}}
                ]),
            ),
        ),
        entry(
            29,
            "Best selling products",
            Theme::Analytics,
            aggregate(
                "orders",
                json!([
                    {"$unwind": "$items"},
                    {"$group": {
                        "_id": "$items.product_id",
                        "product_name": {"$first": "$items.product_name"},
                        "total_quantity": {"$sum": "$items.quantity"},
                        "total_revenue": {"$sum": {"$multiply": ["$items.quantity", "$items.price"]}}
                    }},
                    {"$sort": {"total_quantity": -1}},
                    {"$limit": 10}
                ]),
            ),
        ),
        entry(
            30,
            "Monthly order trends",
            Theme::Analytics,
            aggregate(
                "orders",
                json!([
                    {"$group": {
                        "_id": {"$substr": ["$order_date", 0, 7]},
                        "order_count": {"$sum": 1},
                        "total_revenue": {"$sum": "$total"},
                        "avg_order_value": {"$avg": "$total"}
                    }},
                    {"$sort": {"_id": 1}}
                ]),
            ),
        ),
        entry(
            31,
            "Customer purchase frequency",
            Theme::Analytics,
            aggregate(
                "orders",
                json!([
                    {"$group": {
                        "_id": "$customer_id",
                        "order_count": {"$sum": 1},
                        "first_order": {"$min": "$order_date"},
                        "last_order": {"$max": "$order_date"}
                    }},
                    join("customers", "_id", "_id", "customer"),
                    {"$unwind": "$customer"},
                    {"$project": {
                        "customer_name": customer_name(),
                        "order_count": 1,
                        "first_order": 1,
                        "last_order": 1,
                        "loyalty_points": "$customer.loyalty_points"
                    }},
                    {"$sort": {"order_count": -1}}
                ]),
            ),
        ),
        // Inserts
        entry(
            32,
            "Add a new product",
            Theme::Insert,
            insert_one(
                "products",
                json!({
                    "_id": 11,
                    "name": "Ergonomic Chair",
                    "category": "Furniture",
                    "price": 299.99,
                    "stock": 25,
                    "description": "Comfortable ergonomic office chair",
                    "specifications": {"material": "Mesh", "adjustable": true, "lumbar_support": true},
                    "tags": ["chair", "office", "ergonomic"]
                }),
            ),
        ),
        entry(
            33,
            "Add a new customer",
            Theme::Insert,
            insert_one(
                "customers",
                json!({
                    "_id": 1009,
                    "first_name": "Alice",
                    "last_name": "Cooper",
                    "email": "alice.cooper@email.com",
                    "phone": "+1-555-0109",
                    "address": seattle(),
                    "registration_date": "2024-03-28",
                    "loyalty_points": 0
                }),
            ),
        ),
        entry(
            34,
            "Create a new order with embedded items",
            Theme::Insert,
            insert_one(
                "orders",
                json!({
                    "_id": 2009,
                    "customer_id": 1009,
                    "order_date": "2024-03-28",
                    "status": "processing",
                    "items": [{"product_id": 11, "product_name": "Ergonomic Chair", "quantity": 1, "price": 299.99}],
                    "subtotal": 299.99,
                    "tax": 24.00,
                    "shipping": 19.99,
                    "total": 343.98,
                    "shipping_address": seattle()
                }),
            ),
        ),
        // Updates
        entry(35, "Update product price", Theme::Update, update_one("products", json!({"_id": 11}), json!({"$set": {"price": 279.99}}))),
        entry(
            36,
            "Increase stock for multiple products",
            Theme::Update,
            Request::UpdateMany {
                collection: "products",
                filter: json!({"category": "Accessories"}),
                update: json!({"$inc": {"stock": 20}}),
            },
        ),
        entry(
            37,
            "Add loyalty points to a customer",
            Theme::Update,
            update_one("customers", json!({"_id": 1009}), json!({"$inc": {"loyalty_points": 50}})),
        ),
        entry(
            38,
            "Update order status",
            Theme::Update,
            update_one("orders", json!({"_id": 2009}), json!({"$set": {"status": "shipped"}})),
        ),
        entry(
            39,
            "Add a tag to products",
            Theme::Update,
            Request::UpdateMany {
                collection: "products",
                filter: json!({"category": "Electronics"}),
                update: json!({"$addToSet": {"tags": "tech"}}),
            },
        ),
        // Reviews
        entry(
            40,
            "Add a product review",
            Theme::Reviews,
            insert_one(
                "reviews",
                json!({
                    "_id": 3013,
                    "product_id": 11,
                    "customer_id": 1009,
                    "rating": 5,
                    "title": "Best chair I've ever owned",
                    "comment": "Extremely comfortable for long work sessions. Back pain is gone!",
                    "review_date": "2024-04-05",
                    "helpful_count": 0
                }),
            ),
        ),
        entry(
            41,
            "Update helpful count for a review",
            Theme::Reviews,
            update_one("reviews", json!({"_id": 3013}), json!({"$inc": {"helpful_count": 1}})),
        ),
        entry(
            42,
            "Find all reviews by a customer",
            Theme::Reviews,
            aggregate(
                "reviews",
                json!([
                    {"$match": {"customer_id": 1001}},
                    join("products", "product_id", "_id", "product"),
                    {"$unwind": "$product"},
                    {"$project": {
                        "product_name": "$product.name",
                        "rating": 1,
                        "title": 1,
                        "comment": 1,
                        "review_date": 1
                    }}
                ]),
            ),
        ),
        // Deletes
        entry(
            43,
            "Delete a product",
            Theme::Delete,
            Request::DeleteOne {
                collection: "products",
                filter: json!({"_id": 11}),
            },
        )
        .inert(),
        entry(
            44,
            "Delete old reviews (older than 2023)",
            Theme::Delete,
            Request::DeleteMany {
                collection: "reviews",
                filter: json!({"review_date": {"$lt": "2023-01-01"}}),
            },
        )
        .inert(),
        // Inventory
        entry(
            45,
            "Products needing restock (stock < 50)",
            Theme::Inventory,
            find_with(
                "products",
                json!({"stock": {"$lt": 50}}),
                FindOptions::default()
                    .projection(json!({"name": 1, "category": 1, "stock": 1, "price": 1}))
                    .sort(json!({"stock": 1})),
            ),
        ),
        entry(
            46,
            "Update stock after order (decrease inventory)",
            Theme::Inventory,
            update_one("products", json!({"_id": 11}), json!({"$inc": {"stock": -1}})),
        ),
        entry(
            47,
            "Total inventory value by category",
            Theme::Inventory,
            aggregate(
                "products",
                json!([
                    {"$group": {
                        "_id": "$category",
                        "total_units": {"$sum": "$stock"},
                        "inventory_value": {"$sum": {"$multiply": ["$stock", "$price"]}}
                    }},
                    {"$project": {
                        "category": "$_id",
                        "total_units": 1,
                        "inventory_value": {"$round": ["$inventory_value", 2]}
                    }},
                    {"$sort": {"inventory_value": -1}}
                ]),
            ),
        ),
        // Text search
        entry(
            48,
            "Create text index on product descriptions",
            Theme::TextSearch,
            Request::CreateIndex {
                collection: "products",
                keys: json!({"name": "text", "description": "text"}),
            },
        ),
        entry(
            49,
            "Search products by text",
            Theme::TextSearch,
            find("products", json!({"$text": {"$search": "wireless"}})),
        ),
        entry(
            50,
            "Search with relevance score",
            Theme::TextSearch,
            find_with(
                "products",
                json!({"$text": {"$search": "laptop computer"}}),
                FindOptions::default()
                    .projection(json!({"score": {"$meta": "textScore"}}))
                    .sort(json!({"score": {"$meta": "textScore"}})),
            ),
        ),
    ]
}
