//! Sample data: the fixed HR and e-commerce records loaded on first start,
//! the bundled order and review datasets, and a reference check over the
//! loaded collections.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::app_response::{AppResponse, Result};
use crate::document::{display_id, path_values, ID_FIELD};
use crate::local_db_model::{
    to_cents, Address, Customer, Department, Employee, Order, Product, SalaryRecord,
    Specifications, ToDocument,
};
use crate::local_db_state::AppDbState;

pub const BUNDLED_ORDERS: &str = include_str!("../data/ecommerce/orders.json");
pub const BUNDLED_REVIEWS: &str = include_str!("../data/ecommerce/reviews.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub counts: Vec<(String, usize)>,
}

impl SeedReport {
    pub fn count(&self, collection: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, count)| *count)
    }
}

/// Loads departments, employees, salaries, products and customers, in that
/// order. Records are inserted unconditionally: a store that already holds
/// them fails with [`AppResponse::DuplicateKey`].
pub fn seed_database(db: &AppDbState) -> Result<SeedReport> {
    let mut report = SeedReport { counts: Vec::new() };

    info!("Loading HR sample data...");
    load(db, &departments(), &mut report)?;
    load(db, &employees(), &mut report)?;
    load(db, &salaries(), &mut report)?;

    info!("Loading E-commerce sample data...");
    load(db, &products(), &mut report)?;
    load(db, &customers(), &mut report)?;

    info!("Sample data loading complete");
    Ok(report)
}

fn load<T: ToDocument>(db: &AppDbState, records: &[T], report: &mut SeedReport) -> Result<()> {
    let collection = db.collection(T::COLLECTION);
    collection.insert_models(records)?;
    let count = collection.count_documents(&serde_json::json!({}))?;
    info!("{} loaded: {}", capitalize(T::COLLECTION), count);
    report.counts.push((T::COLLECTION.to_string(), count));
    Ok(())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Inserts a JSON array of documents into `collection`.
pub fn import_json_str(db: &AppDbState, collection: &str, json: &str) -> Result<usize> {
    let documents = match serde_json::from_str::<Value>(json)? {
        Value::Array(documents) => documents,
        other => {
            return Err(AppResponse::BadRequest(format!(
                "expected a JSON array of documents, got {}",
                type_name(&other)
            )))
        }
    };

    if collection == Order::COLLECTION {
        for doc in &documents {
            let id = doc.get(ID_FIELD).map(display_id).unwrap_or_default();
            match order_totals_balance(doc) {
                Some(true) => {}
                Some(false) => warn!("Order {} totals do not add up", id),
                None => debug!("Order {} has no amounts to check", id),
            }
        }
    }

    let count = documents.len();
    db.collection(collection).insert_many(documents)?;
    info!("Imported {} documents into '{}'", count, collection);
    Ok(count)
}

/// Whether an order document's amounts add up: `subtotal` equals the line
/// items and `total = subtotal + tax + shipping`. `None` when a field is
/// missing or not a number. Orders are schemaless, so this never rejects.
fn order_totals_balance(doc: &Value) -> Option<bool> {
    let cents = |field: &str| doc.get(field).and_then(Value::as_f64).map(to_cents);

    let mut items = 0;
    for item in doc.get("items")?.as_array()? {
        let quantity = item.get("quantity")?.as_i64()?;
        items += quantity * to_cents(item.get("price")?.as_f64()?);
    }

    let subtotal = cents("subtotal")?;
    Some(subtotal == items && cents("total")? == subtotal + cents("tax")? + cents("shipping")?)
}

pub fn import_json_file(db: &AppDbState, collection: &str, path: &Path) -> Result<usize> {
    let json = fs::read_to_string(path)?;
    import_json_str(db, collection, &json)
}

/// Imports the bundled `orders` and `reviews` datasets.
pub fn import_bundled_ecommerce(db: &AppDbState) -> Result<usize> {
    Ok(import_json_str(db, "orders", BUNDLED_ORDERS)?
        + import_json_str(db, "reviews", BUNDLED_REVIEWS)?)
}

/// The bundled dataset for `collection`, if one ships with the crate.
pub fn bundled_dataset(collection: &str) -> Option<&'static str> {
    match collection {
        "orders" => Some(BUNDLED_ORDERS),
        "reviews" => Some(BUNDLED_REVIEWS),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =====================================
// Reference verification
// =====================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DanglingReference {
    pub collection: String,
    pub id: Value,
    pub field: String,
    pub target: String,
    pub value: Value,
}

struct Reference {
    collection: &'static str,
    field: &'static str,
    target: &'static str,
}

const REFERENCES: &[Reference] = &[
    Reference { collection: "employees", field: "department_id", target: "departments" },
    Reference { collection: "employees", field: "manager_id", target: "employees" },
    Reference { collection: "departments", field: "manager_id", target: "employees" },
    Reference { collection: "salaries", field: "employee_id", target: "employees" },
    Reference { collection: "orders", field: "customer_id", target: "customers" },
    Reference { collection: "orders", field: "items.product_id", target: "products" },
    Reference { collection: "reviews", field: "product_id", target: "products" },
    Reference { collection: "reviews", field: "customer_id", target: "customers" },
];

/// Every non-null reference that does not resolve to a document in its
/// target collection. Collections that were never loaded are skipped.
pub fn verify_references(db: &AppDbState) -> Result<Vec<DanglingReference>> {
    let mut dangling = Vec::new();
    for reference in REFERENCES {
        let documents = db.documents(reference.collection)?;
        if documents.is_empty() {
            continue;
        }
        let known: HashSet<String> = db
            .documents(reference.target)?
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD))
            .map(display_id)
            .collect();

        for doc in &documents {
            for value in path_values(doc, reference.field) {
                if value.is_null() || known.contains(&display_id(value)) {
                    continue;
                }
                dangling.push(DanglingReference {
                    collection: reference.collection.to_string(),
                    id: doc.get(ID_FIELD).cloned().unwrap_or(Value::Null),
                    field: reference.field.to_string(),
                    target: reference.target.to_string(),
                    value: value.clone(),
                });
            }
        }
    }

    if dangling.is_empty() {
        info!("All references resolve");
    } else {
        warn!("{} dangling references found", dangling.len());
    }
    Ok(dangling)
}

// =====================================
// HR records
// =====================================

fn department(id: i64, name: &str, manager_id: i64, location_id: i64) -> Department {
    Department {
        id,
        department_name: name.to_string(),
        manager_id: Some(manager_id),
        location_id,
    }
}

pub fn departments() -> Vec<Department> {
    vec![
        department(10, "Administration", 200, 1700),
        department(20, "Marketing", 201, 1800),
        department(30, "Purchasing", 114, 1700),
        department(40, "Human Resources", 203, 2400),
        department(50, "Shipping", 121, 1500),
        department(60, "IT", 103, 1400),
        department(70, "Public Relations", 204, 2700),
        department(80, "Sales", 145, 2500),
        department(90, "Executive", 100, 1700),
        department(100, "Finance", 108, 1700),
        department(110, "Accounting", 205, 1700),
    ]
}

struct Hire<'a> {
    id: i64,
    name: (&'a str, &'a str),
    email: &'a str,
    phone: &'a str,
    hire_date: &'a str,
    job_id: &'a str,
    salary: f64,
    commission_pct: Option<f64>,
    manager_id: Option<i64>,
    department_id: i64,
}

impl From<Hire<'_>> for Employee {
    fn from(hire: Hire<'_>) -> Employee {
        Employee {
            id: hire.id,
            first_name: hire.name.0.to_string(),
            last_name: hire.name.1.to_string(),
            email: hire.email.to_string(),
            phone_number: hire.phone.to_string(),
            hire_date: hire.hire_date.to_string(),
            job_id: hire.job_id.to_string(),
            salary: hire.salary,
            commission_pct: hire.commission_pct,
            manager_id: hire.manager_id,
            department_id: hire.department_id,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn employee(
    id: i64,
    name: (&str, &str),
    email: &str,
    phone: &str,
    hire_date: &str,
    job_id: &str,
    salary: f64,
    manager_id: Option<i64>,
    department_id: i64,
) -> Employee {
    Hire {
        id,
        name,
        email,
        phone,
        hire_date,
        job_id,
        salary,
        commission_pct: None,
        manager_id,
        department_id,
    }
    .into()
}

pub fn employees() -> Vec<Employee> {
    let sales = |id, name, email, phone, hire_date, salary, commission_pct| -> Employee {
        Hire {
            id,
            name,
            email,
            phone,
            hire_date,
            job_id: "SA_MAN",
            salary,
            commission_pct: Some(commission_pct),
            manager_id: Some(100),
            department_id: 80,
        }
        .into()
    };
    let russell = sales(145, ("John", "Russell"), "JRUSSEL", "011.44.1344.429268", "2004-10-01", 14000.0, 0.4);
    let partners = sales(146, ("Karen", "Partners"), "KPARTNER", "011.44.1344.467268", "2005-01-05", 13500.0, 0.3);

    vec![
        employee(100, ("Steven", "King"), "SKING", "515.123.4567", "2003-06-17", "AD_PRES", 24000.0, None, 90),
        employee(101, ("Neena", "Kochhar"), "NKOCHHAR", "515.123.4568", "2005-09-21", "AD_VP", 17000.0, Some(100), 90),
        employee(102, ("Lex", "De Haan"), "LDEHAAN", "515.123.4569", "2001-01-13", "AD_VP", 17000.0, Some(100), 90),
        employee(103, ("Alexander", "Hunold"), "AHUNOLD", "590.423.4567", "2006-01-03", "IT_PROG", 9000.0, Some(102), 60),
        employee(104, ("Bruce", "Ernst"), "BERNST", "590.423.4568", "2007-05-21", "IT_PROG", 6000.0, Some(103), 60),
        employee(105, ("David", "Austin"), "DAUSTIN", "590.423.4569", "2005-06-25", "IT_PROG", 4800.0, Some(103), 60),
        employee(106, ("Valli", "Pataballa"), "VPATABAL", "590.423.4560", "2006-02-05", "IT_PROG", 4800.0, Some(103), 60),
        employee(107, ("Diana", "Lorentz"), "DLORENTZ", "590.423.5567", "2007-02-07", "IT_PROG", 4200.0, Some(103), 60),
        employee(108, ("Nancy", "Greenberg"), "NGREENBE", "515.124.4569", "2002-08-17", "FI_MGR", 12008.0, Some(101), 100),
        employee(109, ("Daniel", "Faviet"), "DFAVIET", "515.124.4169", "2002-08-16", "FI_ACCOUNT", 9000.0, Some(108), 100),
        employee(110, ("John", "Chen"), "JCHEN", "515.124.4269", "2005-09-28", "FI_ACCOUNT", 8200.0, Some(108), 100),
        employee(111, ("Ismael", "Sciarra"), "ISCIARRA", "515.124.4369", "2005-09-30", "FI_ACCOUNT", 7700.0, Some(108), 100),
        employee(112, ("Jose Manuel", "Urman"), "JMURMAN", "515.124.4469", "2006-03-07", "FI_ACCOUNT", 7800.0, Some(108), 100),
        employee(113, ("Luis", "Popp"), "LPOPP", "515.124.4567", "2007-12-07", "FI_ACCOUNT", 6900.0, Some(108), 100),
        employee(114, ("Den", "Raphaely"), "DRAPHEAL", "515.127.4561", "2002-12-07", "PU_MAN", 11000.0, Some(100), 30),
        employee(115, ("Alexander", "Khoo"), "AKHOO", "515.127.4562", "2003-05-18", "PU_CLERK", 3100.0, Some(114), 30),
        employee(116, ("Shelli", "Baida"), "SBAIDA", "515.127.4563", "2005-12-24", "PU_CLERK", 2900.0, Some(114), 30),
        employee(121, ("Adam", "Fripp"), "AFRIPP", "650.123.2234", "2005-04-10", "ST_MAN", 8200.0, Some(100), 50),
        russell,
        partners,
        employee(200, ("Jennifer", "Whalen"), "JWHALEN", "515.123.4444", "2003-09-17", "AD_ASST", 4400.0, Some(101), 10),
        employee(201, ("Michael", "Hartstein"), "MHARTSTE", "515.123.5555", "2004-02-17", "MK_MAN", 13000.0, Some(100), 20),
        employee(203, ("Susan", "Mavris"), "SMAVRIS", "515.123.7777", "2002-06-07", "HR_REP", 6500.0, Some(101), 40),
        employee(204, ("Hermann", "Baer"), "HBAER", "515.123.8888", "2002-06-07", "PR_REP", 10000.0, Some(101), 70),
        employee(205, ("Shelley", "Higgins"), "SHIGGINS", "515.123.8080", "2002-06-07", "AC_MGR", 12008.0, Some(101), 110),
    ]
}

pub fn salaries() -> Vec<SalaryRecord> {
    let history: [(i64, i64, &str, i64); 19] = [
        (1, 100, "2003-06-17", 24000),
        (2, 101, "2005-09-21", 17000),
        (3, 102, "2001-01-13", 17000),
        (4, 103, "2006-01-03", 9000),
        (5, 103, "2020-01-01", 9500),
        (6, 104, "2007-05-21", 6000),
        (7, 105, "2005-06-25", 4800),
        (8, 108, "2002-08-17", 12008),
        (9, 108, "2018-08-17", 12500),
        (10, 109, "2002-08-16", 9000),
        (11, 110, "2005-09-28", 8200),
        (12, 114, "2002-12-07", 11000),
        (13, 145, "2004-10-01", 14000),
        (14, 145, "2019-10-01", 15000),
        (15, 200, "2003-09-17", 4400),
        (16, 201, "2004-02-17", 13000),
        (17, 203, "2002-06-07", 6500),
        (18, 204, "2002-06-07", 10000),
        (19, 205, "2002-06-07", 12008),
    ];
    history
        .iter()
        .map(|&(id, employee_id, effective_date, salary)| SalaryRecord {
            id,
            employee_id,
            effective_date: effective_date.to_string(),
            salary,
            salary_type: "annual".to_string(),
        })
        .collect()
}

// =====================================
// E-commerce records
// =====================================

fn s(value: &str) -> String {
    value.to_string()
}

#[allow(clippy::too_many_arguments)]
fn product(
    id: i64,
    name: &str,
    category: &str,
    price: f64,
    stock: i64,
    description: &str,
    specifications: Specifications,
    tags: [&str; 3],
) -> Product {
    Product {
        id,
        name: s(name),
        category: s(category),
        price,
        stock,
        description: s(description),
        specifications,
        tags: tags.iter().map(|tag| s(tag)).collect(),
    }
}

pub fn products() -> Vec<Product> {
    vec![
        product(
            1, "Laptop Pro 15", "Electronics", 1299.99, 45,
            "High-performance laptop with 15-inch display",
            Specifications::Computer { cpu: s("Intel i7"), ram: s("16GB"), storage: s("512GB SSD") },
            ["laptop", "computer", "electronics"],
        ),
        product(
            2, "Wireless Mouse", "Accessories", 29.99, 150,
            "Ergonomic wireless mouse with USB receiver",
            Specifications::Mouse { connectivity: s("Wireless 2.4GHz"), battery: s("2x AA"), dpi: s("1600") },
            ["mouse", "wireless", "accessories"],
        ),
        product(
            3, "USB-C Hub", "Accessories", 49.99, 89,
            "7-in-1 USB-C hub with HDMI and card reader",
            Specifications::Hub {
                ports: ["HDMI", "USB 3.0 x3", "SD", "MicroSD", "USB-C"].iter().map(|p| s(p)).collect(),
                power_delivery: s("100W"),
            },
            ["hub", "usb-c", "adapter"],
        ),
        product(
            4, "Mechanical Keyboard", "Accessories", 89.99, 67,
            "RGB mechanical keyboard with blue switches",
            Specifications::Keyboard { switch_type: s("Blue"), backlight: s("RGB"), connectivity: s("USB Wired") },
            ["keyboard", "mechanical", "gaming"],
        ),
        product(
            5, "27-inch Monitor", "Electronics", 349.99, 32,
            "4K UHD monitor with HDR support",
            Specifications::Display { resolution: s("3840x2160"), refresh_rate: s("60Hz"), panel: s("IPS") },
            ["monitor", "4k", "display"],
        ),
        product(
            6, "Webcam HD", "Accessories", 79.99, 120,
            "1080p HD webcam with built-in microphone",
            Specifications::Camera { resolution: s("1920x1080"), fps: s("30"), microphone: s("Built-in") },
            ["webcam", "camera", "video"],
        ),
        product(
            7, "Bluetooth Headphones", "Audio", 159.99, 78,
            "Noise-cancelling over-ear headphones",
            Specifications::Headphones { connectivity: s("Bluetooth 5.0"), battery: s("30 hours"), noise_cancelling: true },
            ["headphones", "audio", "bluetooth"],
        ),
        product(
            8, "Portable SSD 1TB", "Storage", 129.99, 95,
            "Fast portable SSD with USB-C",
            Specifications::Storage { capacity: s("1TB"), interface: s("USB 3.2 Gen 2"), read_speed: s("1050 MB/s") },
            ["ssd", "storage", "portable"],
        ),
        product(
            9, "Laptop Stand", "Accessories", 39.99, 134,
            "Adjustable aluminum laptop stand",
            Specifications::Stand { material: s("Aluminum"), adjustable: true, max_weight: s("5kg") },
            ["stand", "laptop", "desk"],
        ),
        product(
            10, "USB Cable 3-Pack", "Accessories", 15.99, 200,
            "USB-C to USB-A cables, 6ft each",
            Specifications::Cable { length: s("6ft"), kind: s("USB-C to USB-A"), count: 3 },
            ["cable", "usb", "charging"],
        ),
    ]
}

fn address(street: &str, city: &str, state: &str, zip: &str) -> Address {
    Address {
        street: s(street),
        city: s(city),
        state: s(state),
        zip: s(zip),
        country: s("USA"),
    }
}

pub fn customers() -> Vec<Customer> {
    let rows = [
        (1001, "Emma", "Johnson", "0101", address("123 Main St", "New York", "NY", "10001"), "2023-01-15", 450),
        (1002, "Michael", "Smith", "0102", address("456 Oak Ave", "Los Angeles", "CA", "90001"), "2023-03-22", 720),
        (1003, "Sarah", "Williams", "0103", address("789 Pine Rd", "Chicago", "IL", "60601"), "2023-02-10", 1200),
        (1004, "James", "Brown", "0104", address("321 Elm St", "Houston", "TX", "77001"), "2023-04-05", 380),
        (1005, "Emily", "Davis", "0105", address("654 Maple Dr", "Phoenix", "AZ", "85001"), "2023-05-18", 890),
        (1006, "David", "Miller", "0106", address("987 Cedar Ln", "Philadelphia", "PA", "19101"), "2023-06-30", 560),
        (1007, "Olivia", "Garcia", "0107", address("147 Birch St", "San Antonio", "TX", "78201"), "2023-07-12", 1450),
        (1008, "Daniel", "Martinez", "0108", address("258 Spruce Ave", "San Diego", "CA", "92101"), "2023-08-25", 230),
    ];
    rows.into_iter()
        .map(|(id, first, last, line, address, registered, points)| Customer {
            id,
            first_name: s(first),
            last_name: s(last),
            email: format!("{}.{}@email.com", first.to_lowercase(), last.to_lowercase()),
            phone: format!("+1-555-{}", line),
            address,
            registration_date: s(registered),
            loyalty_points: points,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_records_match_their_documents() {
        let king = employees()[0].to_document().unwrap();
        assert_eq!(
            king,
            json!({
                "_id": 100, "first_name": "Steven", "last_name": "King", "email": "SKING",
                "phone_number": "515.123.4567", "hire_date": "2003-06-17", "job_id": "AD_PRES",
                "salary": 24000, "commission_pct": null, "manager_id": null, "department_id": 90
            })
        );

        let cable = products()[9].to_document().unwrap();
        assert_eq!(cable["specifications"], json!({"length": "6ft", "type": "USB-C to USB-A", "count": 3}));

        let emma = customers()[0].to_document().unwrap();
        assert_eq!(emma["email"], "emma.johnson@email.com");
        assert_eq!(emma["phone"], "+1-555-0101");
    }

    #[test]
    fn seed_sizes() {
        assert_eq!(departments().len(), 11);
        assert_eq!(employees().len(), 25);
        assert_eq!(salaries().len(), 19);
        assert_eq!(products().len(), 10);
        assert_eq!(customers().len(), 8);
    }

    #[test]
    fn only_sales_jobs_carry_commission() {
        for emp in employees() {
            assert_eq!(emp.commission_pct.is_some(), emp.is_commission_job(), "{}", emp.full_name());
        }
    }

    #[test]
    fn salary_history_is_monotonic_per_employee() {
        let history = salaries();
        for pair in history.windows(2) {
            if pair[0].employee_id == pair[1].employee_id {
                assert!(pair[0].effective_date < pair[1].effective_date);
            }
        }
    }

    #[test]
    fn bundled_orders_are_consistent() {
        let orders: Vec<Order> = serde_json::from_str(BUNDLED_ORDERS).unwrap();
        assert_eq!(orders.len(), 8);
        assert!(orders.iter().all(Order::is_consistent));
    }

    #[test]
    fn order_totals_are_checked_on_raw_documents() {
        let order = json!({
            "_id": 9001, "status": "returned",
            "items": [{"product_id": 2, "quantity": 2, "price": 29.99}],
            "subtotal": 59.98, "tax": 4.80, "shipping": 0.0, "total": 64.78
        });
        assert_eq!(order_totals_balance(&order), Some(true));

        let mut off = order.clone();
        off["total"] = json!(70.00);
        assert_eq!(order_totals_balance(&off), Some(false));

        assert_eq!(order_totals_balance(&json!({"_id": 9002, "status": "pending"})), None);
    }

    #[test]
    fn specifications_deserialize_to_their_kind() {
        let specs: Specifications =
            serde_json::from_value(json!({"connectivity": "Bluetooth 5.0", "battery": "30 hours", "noise_cancelling": true}))
                .unwrap();
        assert!(matches!(specs, Specifications::Headphones { .. }));
        let specs: Specifications = serde_json::from_value(json!({"material": "Mesh", "adjustable": true, "lumbar_support": true})).unwrap();
        assert!(matches!(specs, Specifications::Chair { .. }));
    }
}
