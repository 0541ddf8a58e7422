use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Address, Category, CategoryId, Money, Order, OrderDraft, OrderId, OrderItem, OrderStatus,
    PaymentMethod, PaymentStatus, Product, ProductId, StockShortage, Totals, UserId,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{PaymentClaim, Store, plan_placement},
};

const PRODUCT_COLUMNS: &str = "id, name, price_cents, stock, in_stock, category_id, image";

const ORDER_COLUMNS: &str = "id, user_id, subtotal_cents, shipping_cents, tax_cents, total_cents, \
     payment_method, shipping_address, billing_address, status, payment_status, \
     payment_reference, payment_receipt, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Placement and release lock the affected product rows with
/// `SELECT … FOR UPDATE` in id order, so concurrent transactions on the same
/// products serialize without deadlocking each other.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` with a pool of up to `max_connections`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let stock: i32 = row.try_get("stock")?;
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: u32::try_from(stock)
                .map_err(|_| StoreError::CorruptRow(format!("negative stock {stock}")))?,
            in_stock: row.try_get("in_stock")?,
            category_id: row
                .try_get::<Option<String>, _>("category_id")?
                .map(CategoryId::new),
            image: row.try_get("image")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<(Uuid, OrderItem)> {
        let quantity: i32 = row.try_get("quantity")?;
        let item = OrderItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::CorruptRow(format!("negative quantity {quantity}")))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            name: row.try_get("name")?,
            image: row.try_get("image")?,
        };
        Ok((row.try_get("order_id")?, item))
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let payment_method: String = row.try_get("payment_method")?;
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let shipping: serde_json::Value = row.try_get("shipping_address")?;
        let billing: serde_json::Value = row.try_get("billing_address")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            items,
            totals: Totals {
                subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
                shipping: Money::from_cents(row.try_get("shipping_cents")?),
                tax: Money::from_cents(row.try_get("tax_cents")?),
                total: Money::from_cents(row.try_get("total_cents")?),
            },
            payment_method: PaymentMethod::parse(&payment_method).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown payment method {payment_method}"))
            })?,
            shipping_address: serde_json::from_value::<Address>(shipping)?,
            billing_address: serde_json::from_value::<Address>(billing)?,
            status: OrderStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown status {status}")))?,
            payment_status: PaymentStatus::parse(&payment_status).ok_or_else(|| {
                StoreError::CorruptRow(format!("unknown payment status {payment_status}"))
            })?,
            payment_reference: row.try_get("payment_reference")?,
            payment_receipt: row.try_get("payment_receipt")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Loads items for the given order rows and assembles full orders, preserving row order.
    async fn assemble_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents, name, image
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&mut *conn)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let (order_id, item) = Self::row_to_item(row)?;
            items_by_order.entry(order_id).or_default().push(item);
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let items = items_by_order.remove(&id).unwrap_or_default();
                Self::row_to_order(row, items)
            })
            .collect()
    }

    async fn load_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Self::assemble_orders(conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn require_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Order> {
        Self::load_order(conn, order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::CorruptRow(format!("{value} out of range")))
}

#[async_trait]
impl Store for PostgresStore {
    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, in_stock, category_id, image)
            VALUES ($1, $2, $3, $4, $4 > 0, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                in_stock = EXCLUDED.in_stock,
                category_id = EXCLUDED.category_id,
                image = EXCLUDED.image
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_i32(product.stock)?)
        .bind(product.category_id.as_ref().map(|c| c.as_str()))
        .bind(&product.image)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn upsert_category(&self, category: Category) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(category.id.as_str())
        .bind(&category.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Category> {
                Ok(Category {
                    id: CategoryId::new(row.try_get::<String, _>("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self, draft), fields(items = draft.items.len()))]
    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        let started = std::time::Instant::now();
        let mut tx = self.pool.begin().await?;

        let mut ids: Vec<String> = draft
            .items
            .iter()
            .map(|i| i.product_id.as_str().to_string())
            .collect();
        ids.sort();
        ids.dedup();

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids.as_slice())
        .fetch_all(&mut *tx)
        .await?;

        let products: HashMap<ProductId, Product> = rows
            .iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id.clone(), p)))
            .collect::<Result<_>>()?;

        // Dropping `tx` on an early return rolls the transaction back.
        let placement = plan_placement(&draft, &products)?;

        for (product_id, qty) in &placement.decrements {
            let updated = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2, in_stock = (stock - $2) > 0
                WHERE id = $1 AND stock >= $2
                "#,
            )
            .bind(product_id.as_str())
            .bind(to_i32(*qty)?)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() != 1 {
                let product = &products[product_id];
                return Err(StoreError::InsufficientStock(vec![StockShortage {
                    product_id: product_id.clone(),
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested: *qty,
                }]));
            }
        }

        let order_id = OrderId::new();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, subtotal_cents, shipping_cents, tax_cents, total_cents,
                payment_method, shipping_address, billing_address, status, payment_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(draft.user_id.as_uuid())
        .bind(placement.totals.subtotal.cents())
        .bind(placement.totals.shipping.cents())
        .bind(placement.totals.tax.cents())
        .bind(placement.totals.total.cents())
        .bind(draft.payment_method.as_str())
        .bind(serde_json::to_value(&draft.shipping_address)?)
        .bind(serde_json::to_value(&draft.billing_address)?)
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        for (position, item) in placement.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, unit_price_cents, name, image)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(to_i32(item.quantity)?)
            .bind(item.unit_price.cents())
            .bind(&item.name)
            .bind(&item.image)
            .execute(&mut *tx)
            .await?;
        }

        let order = Self::require_order(&mut *tx, order_id).await?;
        tx.commit().await?;

        metrics::histogram!("store_place_order_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn release_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let status = status.ok_or(StoreError::OrderNotFound(order_id))?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown status {status}")))?;

        if !status.can_cancel() {
            return Err(StoreError::InvalidStatus {
                order_id,
                status,
                action: "cancel",
            });
        }

        sqlx::query(
            r#"
            SELECT id FROM products
            WHERE id IN (SELECT product_id FROM order_items WHERE order_id = $1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        // Products deleted since placement are skipped by the join.
        sqlx::query(
            r#"
            UPDATE products p
            SET stock = p.stock + i.qty, in_stock = (p.stock + i.qty) > 0
            FROM (
                SELECT product_id, SUM(quantity)::INTEGER AS qty
                FROM order_items
                WHERE order_id = $1
                GROUP BY product_id
            ) i
            WHERE p.id = i.product_id
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(OrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        let order = Self::require_order(&mut *tx, order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_order(&mut *conn, order_id).await
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        Self::assemble_orders(&mut *conn, rows).await
    }

    async fn claim_payment(&self, order_id: OrderId) -> Result<PaymentClaim> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status, payment_status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let status = OrderStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown status {status}")))?;
        let payment_status = PaymentStatus::parse(&payment_status).ok_or_else(|| {
            StoreError::CorruptRow(format!("unknown payment status {payment_status}"))
        })?;

        if status == OrderStatus::Cancelled {
            return Err(StoreError::InvalidStatus {
                order_id,
                status,
                action: "initiate payment",
            });
        }
        if !payment_status.can_initiate() {
            return Err(StoreError::PaymentConflict {
                order_id,
                payment_status,
            });
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2, payment_reference = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(PaymentStatus::Initiated.as_str())
        .execute(&mut *tx)
        .await?;

        let order = Self::require_order(&mut *tx, order_id).await?;
        tx.commit().await?;
        Ok(PaymentClaim {
            order,
            previous: payment_status,
        })
    }

    async fn attach_payment_reference(&self, order_id: OrderId, reference: &str) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET payment_reference = $3, updated_at = NOW()
            WHERE id = $1 AND payment_status = $2 AND payment_reference IS NULL
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(PaymentStatus::Initiated.as_str())
        .bind(reference)
        .execute(&mut *conn)
        .await?;

        let order = Self::require_order(&mut *conn, order_id).await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::PaymentConflict {
                order_id,
                payment_status: order.payment_status,
            });
        }
        Ok(order)
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Self::assemble_orders(&mut *conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn transition_payment(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        receipt: Option<String>,
    ) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $3,
                payment_receipt = COALESCE($4, payment_receipt),
                updated_at = NOW()
            WHERE id = $1 AND payment_status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(receipt)
        .execute(&mut *conn)
        .await?;

        let order = Self::require_order(&mut *conn, order_id).await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(order))
    }

    async fn list_initiated_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_status = $1 AND updated_at < $2 ORDER BY updated_at"
        ))
        .bind(PaymentStatus::Initiated.as_str())
        .bind(cutoff)
        .fetch_all(&mut *conn)
        .await?;

        Self::assemble_orders(&mut *conn, rows).await
    }
}
