use serde_json::json;

use super::{aggregate, all, find, find_with, CatalogEntry, Domain, Request, Theme};
use crate::collection::FindOptions;

fn entry(number: u32, title: &'static str, theme: Theme, request: Request) -> CatalogEntry {
    CatalogEntry::new(Domain::Hr, number, title, theme, request)
}

pub(super) fn entries() -> Vec<CatalogEntry> {
    vec![
        // Basic queries
        entry(1, "Find all employees", Theme::BasicQuery, find("employees", all())),
        entry(2, "Find all employees (pretty format)", Theme::BasicQuery, find("employees", all())),
        entry(
            3,
            "Find a specific employee by ID",
            Theme::BasicQuery,
            Request::FindOne {
                collection: "employees",
                filter: json!({"_id": 100}),
            },
        ),
        entry(4, "Find employees in the IT department", Theme::BasicQuery, find("employees", json!({"department_id": 60}))),
        entry(
            5,
            "Find employees with salary greater than 10000",
            Theme::BasicQuery,
            find("employees", json!({"salary": {"$gt": 10000}})),
        ),
        entry(
            6,
            "Find employees hired after 2005",
            Theme::BasicQuery,
            find("employees", json!({"hire_date": {"$gt": "2005-01-01"}})),
        ),
        entry(
            7,
            "Find employees with commission",
            Theme::BasicQuery,
            find("employees", json!({"commission_pct": {"$ne": null}})),
        ),
        entry(8, "Find IT programmers", Theme::BasicQuery, find("employees", json!({"job_id": "IT_PROG"}))),
        // Projection
        entry(
            9,
            "Get only names and salaries",
            Theme::Projection,
            find_with(
                "employees",
                all(),
                FindOptions::default().projection(json!({"first_name": 1, "last_name": 1, "salary": 1})),
            ),
        ),
        entry(
            10,
            "Get names and salaries, exclude _id",
            Theme::Projection,
            find_with(
                "employees",
                all(),
                FindOptions::default().projection(json!({"_id": 0, "first_name": 1, "last_name": 1, "salary": 1})),
            ),
        ),
        // Sorting and limiting
        entry(
            11,
            "Top 5 highest paid employees",
            Theme::SortLimit,
            find_with("employees", all(), FindOptions::default().sort(json!({"salary": -1})).limit(5)),
        ),
        entry(
            12,
            "Employees sorted by hire date (oldest first)",
            Theme::SortLimit,
            find_with("employees", all(), FindOptions::default().sort(json!({"hire_date": 1}))),
        ),
        entry(
            13,
            "Employees sorted by department, then by salary",
            Theme::SortLimit,
            find_with(
                "employees",
                all(),
                FindOptions::default().sort(json!({"department_id": 1, "salary": -1})),
            ),
        ),
        // Relationships
        entry(
            14,
            "Find employee with their department name (manual lookup)",
            Theme::Relationships,
            Request::Dereference {
                collection: "employees",
                id: json!(103),
                field: "department_id",
                target: "departments",
            },
        ),
        entry(
            15,
            "Find all employees in a specific department",
            Theme::Relationships,
            aggregate(
                "employees",
                json!([
                    {"$lookup": {"from": "departments", "localField": "department_id", "foreignField": "_id", "as": "department"}},
                    {"$unwind": "$department"},
                    {"$match": {"department.department_name": "IT"}},
                    {"$project": {
                        "first_name": 1,
                        "last_name": 1,
                        "salary": 1,
                        "department_name": "$department.department_name"
                    }}
                ]),
            ),
        ),
        entry(
            16,
            "Find employees with their salary history",
            Theme::Relationships,
            aggregate(
                "employees",
                json!([
                    {"$lookup": {"from": "salaries", "localField": "_id", "foreignField": "employee_id", "as": "salary_history"}},
                    {"$project": {"first_name": 1, "last_name": 1, "current_salary": "$salary", "salary_history": 1}}
                ]),
            ),
        ),
        // Aggregation pipeline
        entry(
            17,
            "Average salary by department",
            Theme::Aggregation,
            aggregate(
                "employees",
                json!([
                    {"$group": {"_id": "$department_id", "avg_salary": {"$avg": "$salary"}, "count": {"$sum": 1}}},
                    {"$sort": {"avg_salary": -1}}
                ]),
            ),
        ),
        entry(
            18,
            "Employee count by job type",
            Theme::Aggregation,
            aggregate(
                "employees",
                json!([
                    {"$group": {"_id": "$job_id", "count": {"$sum": 1}}},
                    {"$sort": {"count": -1}}
                ]),
            ),
        ),
        entry(
            19,
            "Total salary expenses by department with department names",
            Theme::Aggregation,
            aggregate(
                "employees",
                json!([
                    {"$group": {
                        "_id": "$department_id",
                        "total_salary": {"$sum": "$salary"},
                        "avg_salary": {"$avg": "$salary"},
                        "employee_count": {"$sum": 1}
                    }},
                    {"$lookup": {"from": "departments", "localField": "_id", "foreignField": "_id", "as": "dept_info"}},
                    {"$unwind": "$dept_info"},
                    {"$project": {
                        "department_name": "$dept_info.department_name",
                        "total_salary": 1,
                        "avg_salary": {"$round": ["$avg_salary", 2]},
                        "employee_count": 1
                    }},
                    {"$sort": {"total_salary": -1}}
                ]),
            ),
        ),
        entry(
            20,
            "Find managers and their direct reports count",
            Theme::Aggregation,
            aggregate(
                "employees",
                json!([
                    {"$group": {"_id": "$manager_id", "reports_count": {"$sum": 1}}},
                    {"$lookup": {"from": "employees", "localField": "_id", "foreignField": "_id", "as": "manager"}},
                    {"$unwind": "$manager"},
                    {"$project": {
                        "manager_name": {"$concat": ["$manager.first_name", " ", "$manager.last_name"]},
                        "reports_count": 1
                    }},
                    {"$sort": {"reports_count": -1}}
                ]),
            ),
        ),
        // Inserts
        entry(
            21,
            "Insert a new employee",
            Theme::Insert,
            Request::InsertOne {
                collection: "employees",
                document: json!({
                    "_id": 300,
                    "first_name": "John",
                    "last_name": "Doe",
                    "email": "JDOE",
                    "phone_number": "515.123.9999",
                    "hire_date": "2024-01-15",
                    "job_id": "IT_PROG",
                    "salary": 7500,
                    "commission_pct": null,
                    "manager_id": 103,
                    "department_id": 60
                }),
            },
        ),
        entry(
            22,
            "Insert multiple departments",
            Theme::Insert,
            Request::InsertMany {
                collection: "departments",
                documents: vec![
                    json!({"_id": 120, "department_name": "Data Science", "manager_id": null, "location_id": 1400}),
                    json!({"_id": 130, "department_name": "DevOps", "manager_id": null, "location_id": 1400}),
                ],
            },
        ),
        // Updates
        entry(
            23,
            "Give a raise to employee 300",
            Theme::Update,
            Request::UpdateOne {
                collection: "employees",
                filter: json!({"_id": 300}),
                update: json!({"$set": {"salary": 8000}}),
            },
        ),
        entry(
            24,
            "Give 10% raise to all IT programmers",
            Theme::Update,
            Request::UpdateMany {
                collection: "employees",
                filter: json!({"job_id": "IT_PROG"}),
                update: json!({"$mul": {"salary": 1.1}}),
            },
        ),
        entry(
            25,
            "Add a new field (email domain) to all employees",
            Theme::Update,
            Request::UpdateMany {
                collection: "employees",
                filter: all(),
                update: json!({"$set": {"email_domain": "@company.com"}}),
            },
        ),
        entry(
            26,
            "Update department manager",
            Theme::Update,
            Request::UpdateOne {
                collection: "departments",
                filter: json!({"_id": 120}),
                update: json!({"$set": {"manager_id": 103}}),
            },
        ),
        // Deletes
        entry(
            27,
            "Delete a specific employee",
            Theme::Delete,
            Request::DeleteOne {
                collection: "employees",
                filter: json!({"_id": 300}),
            },
        ),
        entry(
            28,
            "Delete all employees in a specific department",
            Theme::Delete,
            Request::DeleteMany {
                collection: "employees",
                filter: json!({"department_id": 120}),
            },
        )
        .inert(),
        entry(
            29,
            "Delete departments without managers",
            Theme::Delete,
            Request::DeleteMany {
                collection: "departments",
                filter: json!({"manager_id": null}),
            },
        )
        .inert(),
        // Complex queries
        entry(
            30,
            "Find employees earning more than their department's average",
            Theme::ComplexQueries,
            aggregate(
                "employees",
                json!([
                    {"$group": {
                        "_id": "$department_id",
                        "dept_avg_salary": {"$avg": "$salary"},
                        "employees": {"$push": "$$ROOT"}
                    }},
                    {"$unwind": "$employees"},
                    {"$match": {"$expr": {"$gt": ["$employees.salary", "$dept_avg_salary"]}}},
                    {"$project": {
                        "_id": "$employees._id",
                        "first_name": "$employees.first_name",
                        "last_name": "$employees.last_name",
                        "salary": "$employees.salary",
                        "dept_avg_salary": {"$round": ["$dept_avg_salary", 2]}
                    }}
                ]),
            ),
        ),
        entry(
            31,
            "Find salary increases for employees",
            Theme::ComplexQueries,
            aggregate(
                "salaries",
                json!([
                    {"$sort": {"employee_id": 1, "effective_date": 1}},
                    {"$group": {
                        "_id": "$employee_id",
                        "salary_records": {"$push": {"date": "$effective_date", "salary": "$salary"}},
                        "count": {"$sum": 1}
                    }},
                    {"$match": {"count": {"$gt": 1}}},
                    {"$lookup": {"from": "employees", "localField": "_id", "foreignField": "_id", "as": "employee"}},
                    {"$unwind": "$employee"},
                    {"$project": {
                        "name": {"$concat": ["$employee.first_name", " ", "$employee.last_name"]},
                        "salary_records": 1
                    }}
                ]),
            ),
        ),
        entry(
            32,
            "Find all employees reporting to a specific manager",
            Theme::ComplexQueries,
            aggregate(
                "employees",
                json!([
                    {"$match": {"manager_id": 100}},
                    {"$lookup": {"from": "employees", "localField": "_id", "foreignField": "manager_id", "as": "direct_reports"}},
                    {"$project": {
                        "_id": 1,
                        "first_name": 1,
                        "last_name": 1,
                        "job_id": 1,
                        "reports_count": {"$size": "$direct_reports"}
                    }}
                ]),
            ),
        ),
    ]
}
