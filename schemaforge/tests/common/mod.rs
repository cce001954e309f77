//! Shared fixtures for the integration tests

#![allow(dead_code)]

use schemaforge::introspect::SnapshotSource;
use schemaforge::{RawColumn, RawConstraint, RawSchema, RawTable, SchemaConnector, SchemaSource, SourceError, TableRef};
use std::cell::Cell;

/// customers ← orders ↔ products, with `order_products` as a pure join table
pub fn shop_schema() -> RawSchema {
    let customers = TableRef::public("customers");
    let mut customer_table = RawTable::new(customers.clone());
    customer_table.columns = vec![
        RawColumn::new("id", "integer", 1).with_default("nextval('customers_id_seq'::regclass)"),
        RawColumn {
            max_length: Some(255),
            ..RawColumn::new("email", "character varying", 2)
        },
        RawColumn::new("name", "text", 3).nullable(),
        RawColumn::new("created_at", "timestamp with time zone", 4).with_default("now()"),
    ];
    customer_table.constraints = vec![
        RawConstraint::primary_key(&customers, &["id"]),
        RawConstraint::unique(&customers, "customers_email_key", &["email"]),
    ];

    let products = TableRef::public("products");
    let mut product_table = RawTable::new(products.clone());
    product_table.columns = vec![
        RawColumn::new("id", "uuid", 1).with_default("gen_random_uuid()"),
        RawColumn::new("title", "text", 2),
        RawColumn {
            precision: Some(10),
            scale: Some(2),
            ..RawColumn::new("price", "numeric", 3)
        },
        RawColumn::new("footprint", "geometry", 4).nullable(),
    ];
    product_table.constraints = vec![RawConstraint::primary_key(&products, &["id"])];

    let orders = TableRef::public("orders");
    let mut order_table = RawTable::new(orders.clone());
    order_table.columns = vec![
        RawColumn {
            is_identity: true,
            ..RawColumn::new("id", "bigint", 1)
        },
        RawColumn::new("customer_id", "integer", 2),
        RawColumn::new("placed_at", "timestamp without time zone", 3),
        RawColumn::new("paid", "boolean", 4).with_default("false"),
    ];
    order_table.constraints = vec![
        RawConstraint::primary_key(&orders, &["id"]),
        RawConstraint::foreign_key(&orders, "orders_customer_id_fkey", &["customer_id"], &customers, &["id"]),
    ];

    let order_products = TableRef::public("order_products");
    let mut join_table = RawTable::new(order_products.clone());
    join_table.columns = vec![
        RawColumn::new("order_id", "bigint", 1),
        RawColumn::new("product_id", "uuid", 2),
    ];
    join_table.constraints = vec![
        RawConstraint::primary_key(&order_products, &["order_id", "product_id"]),
        RawConstraint::foreign_key(&order_products, "order_products_order_id_fkey", &["order_id"], &orders, &["id"]),
        RawConstraint::foreign_key(
            &order_products,
            "order_products_product_id_fkey",
            &["product_id"],
            &products,
            &["id"],
        ),
    ];

    RawSchema {
        tables: vec![customer_table, order_table, join_table, product_table],
    }
}

/// regions keyed on (country, code), referenced by stores through a two-column foreign key
pub fn region_schema() -> RawSchema {
    let regions = TableRef::public("regions");
    let mut region_table = RawTable::new(regions.clone());
    region_table.columns = vec![
        RawColumn::new("country", "character varying", 1),
        RawColumn::new("code", "character varying", 2),
        RawColumn::new("label", "text", 3),
    ];
    region_table.constraints = vec![RawConstraint::primary_key(&regions, &["country", "code"])];

    let stores = TableRef::public("stores");
    let mut store_table = RawTable::new(stores.clone());
    store_table.columns = vec![
        RawColumn::new("id", "integer", 1).with_default("nextval('stores_id_seq'::regclass)"),
        RawColumn::new("country", "character varying", 2),
        RawColumn::new("code", "character varying", 3),
    ];
    store_table.constraints = vec![
        RawConstraint::primary_key(&stores, &["id"]),
        RawConstraint::foreign_key(&stores, "stores_region_fkey", &["country", "code"], &regions, &["country", "code"]),
    ];

    RawSchema {
        tables: vec![region_table, store_table],
    }
}

/// authors and books referencing each other
pub fn author_schema() -> RawSchema {
    let authors = TableRef::public("authors");
    let books = TableRef::public("books");

    let mut author_table = RawTable::new(authors.clone());
    author_table.columns = vec![
        RawColumn::new("id", "integer", 1).with_default("nextval('authors_id_seq'::regclass)"),
        RawColumn::new("favorite_book_id", "integer", 2).nullable(),
    ];
    author_table.constraints = vec![
        RawConstraint::primary_key(&authors, &["id"]),
        RawConstraint::foreign_key(&authors, "authors_favorite_book_fkey", &["favorite_book_id"], &books, &["id"]),
    ];

    let mut book_table = RawTable::new(books.clone());
    book_table.columns = vec![
        RawColumn::new("id", "integer", 1).with_default("nextval('books_id_seq'::regclass)"),
        RawColumn::new("author_id", "integer", 2),
    ];
    book_table.constraints = vec![
        RawConstraint::primary_key(&books, &["id"]),
        RawConstraint::foreign_key(&books, "books_author_fkey", &["author_id"], &authors, &["id"]),
    ];

    RawSchema {
        tables: vec![author_table, book_table],
    }
}

/// Connector that records how often it was opened and whether the source was released
pub struct TrackingConnector {
    pub schema: RawSchema,
    pub connects: Cell<usize>,
    pub released: Cell<bool>,
    /// Fail with a connection error when columns of this table are read
    pub fail_on: Option<String>,
}

impl TrackingConnector {
    pub fn new(schema: RawSchema) -> Self {
        Self {
            schema,
            connects: Cell::new(0),
            released: Cell::new(false),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, table: &str) -> Self {
        self.fail_on = Some(table.to_string());
        self
    }
}

struct TrackingSource<'a> {
    inner: SnapshotSource<'a>,
    released: &'a Cell<bool>,
    fail_on: Option<&'a str>,
}

impl SchemaSource for TrackingSource<'_> {
    fn tables(&mut self) -> Result<Vec<TableRef>, SourceError> {
        self.inner.tables()
    }

    fn columns(&mut self, table: &TableRef) -> Result<Vec<RawColumn>, SourceError> {
        if self.fail_on == Some(table.name.as_str()) {
            return Err(SourceError::Connection("connection reset by peer".to_string()));
        }
        self.inner.columns(table)
    }

    fn constraints(&mut self, table: &TableRef) -> Result<Vec<RawConstraint>, SourceError> {
        self.inner.constraints(table)
    }
}

impl Drop for TrackingSource<'_> {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

impl SchemaConnector for TrackingConnector {
    fn connect(&self) -> Result<Box<dyn SchemaSource + '_>, SourceError> {
        self.connects.set(self.connects.get() + 1);
        Ok(Box::new(TrackingSource {
            inner: SnapshotSource::new(&self.schema),
            released: &self.released,
            fail_on: self.fail_on.as_deref(),
        }))
    }
}
