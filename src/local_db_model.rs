//! Typed models for the sample collections.
//!
//! Each model serializes to exactly the document shape stored in its
//! collection: the identifier is written as `_id` and absent optional
//! references are written as explicit `null`s. Conversion into a storable
//! document goes through [`ToDocument`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::app_response::{AppResponse, Result};

/// Anything that can be stored as a document.
pub trait ToDocument: Serialize {
    const COLLECTION: &'static str;

    fn to_document(&self) -> Result<JsonValue> {
        let value = serde_json::to_value(self)?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(AppResponse::SerializationError(format!(
                "{} model did not serialize to an object",
                Self::COLLECTION
            )))
        }
    }
}

// =====================================
// HR
// =====================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    #[serde(rename = "_id")]
    pub id: i64,
    pub department_name: String,
    /// Employee id of the department manager.
    pub manager_id: Option<i64>,
    pub location_id: i64,
}

impl ToDocument for Department {
    const COLLECTION: &'static str = "departments";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "_id")]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    /// ISO `YYYY-MM-DD`; string comparison orders it chronologically.
    pub hire_date: String,
    pub job_id: String,
    pub salary: f64,
    /// Only set for commission jobs.
    pub commission_pct: Option<f64>,
    /// Self reference into `employees`; `None` for the top of the hierarchy.
    pub manager_id: Option<i64>,
    pub department_id: i64,
}

impl ToDocument for Employee {
    const COLLECTION: &'static str = "employees";

    fn to_document(&self) -> Result<JsonValue> {
        // Whole-number salaries are stored as integers, as in the seed data.
        let mut value = serde_json::to_value(self)?;
        if self.salary.fract() == 0.0 {
            value["salary"] = JsonValue::from(self.salary as i64);
        }
        Ok(value)
    }
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Sales jobs are the only ones that carry a commission.
    pub fn is_commission_job(&self) -> bool {
        self.job_id.starts_with("SA_")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryRecord {
    #[serde(rename = "_id")]
    pub id: i64,
    pub employee_id: i64,
    pub effective_date: String,
    pub salary: i64,
    pub salary_type: String,
}

impl ToDocument for SalaryRecord {
    const COLLECTION: &'static str = "salaries";
}

// =====================================
// E-commerce
// =====================================

/// Product specifications differ by kind of product, so they are a variant
/// type. Serialization is untagged: a variant writes only its own keys.
///
/// Variants are tried in declaration order on deserialization; each has at
/// least one required key no earlier variant requires, and anything
/// unrecognised lands in [`Specifications::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Specifications {
    Computer {
        cpu: String,
        ram: String,
        storage: String,
    },
    Mouse {
        connectivity: String,
        battery: String,
        dpi: String,
    },
    Hub {
        ports: Vec<String>,
        power_delivery: String,
    },
    Keyboard {
        switch_type: String,
        backlight: String,
        connectivity: String,
    },
    Display {
        resolution: String,
        refresh_rate: String,
        panel: String,
    },
    Camera {
        resolution: String,
        fps: String,
        microphone: String,
    },
    Headphones {
        connectivity: String,
        battery: String,
        noise_cancelling: bool,
    },
    Storage {
        capacity: String,
        interface: String,
        read_speed: String,
    },
    Stand {
        material: String,
        adjustable: bool,
        max_weight: String,
    },
    Cable {
        length: String,
        #[serde(rename = "type")]
        kind: String,
        count: u32,
    },
    Chair {
        material: String,
        adjustable: bool,
        lumbar_support: bool,
    },
    Other(Map<String, JsonValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
    pub description: String,
    pub specifications: Specifications,
    pub tags: Vec<String>,
}

impl ToDocument for Product {
    const COLLECTION: &'static str = "products";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
    pub registration_date: String,
    /// Only ever changed through `$inc`.
    pub loyalty_points: u64,
}

impl ToDocument for Customer {
    const COLLECTION: &'static str = "customers";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at purchase time.
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: i64,
    pub customer_id: i64,
    pub order_date: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub total: f64,
    pub shipping_address: Address,
}

impl ToDocument for Order {
    const COLLECTION: &'static str = "orders";
}

impl Order {
    /// Subtotal recomputed from the line items, in cents.
    pub fn items_subtotal_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|item| item.quantity * to_cents(item.price))
            .sum()
    }

    /// `subtotal` matches the items and `total = subtotal + tax + shipping`.
    pub fn is_consistent(&self) -> bool {
        let subtotal = to_cents(self.subtotal);
        subtotal == self.items_subtotal_cents()
            && to_cents(self.total) == subtotal + to_cents(self.tax) + to_cents(self.shipping)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: i64,
    pub product_id: i64,
    pub customer_id: i64,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub review_date: String,
    pub helpful_count: u64,
}

impl ToDocument for Review {
    const COLLECTION: &'static str = "reviews";
}

pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
