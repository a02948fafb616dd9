use crate::domain::payment::{
    Basket, Cart, CardSummary, ChargeStatus, CustomerRef, FraudStatus, Order, OrderNote,
    OrderPaymentStatus, OrderStatus, PaymentInstrument, PaymentMethod, VaultType, WalletCard,
};
use crate::repo::order_store::{order_from_basket, OrderStore, SweepCriteria};
use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const INSTRUMENT_COLUMNS: &str = "id, method, amount, currency, token, vault_token, vault_type, customer_id, \
    charge_id, charge_status, captured_amount, refunded_amount, fraud_id, fraud_status, three_ds_token, \
    charge_3ds_token, card, card_details, gateway_type, transaction_id, capture";

const ORDER_COLUMNS: &str = "order_no, token, customer, cart, status, confirmed, payment_status, created_at, \
    charge_id, fraud_id, captured, refunded, payment_method_name, cancel_code, cancel_description";

#[derive(Clone)]
pub struct PgOrderStore {
    pub pool: PgPool,
}

enum Owner<'a> {
    Basket(&'a str),
    Order(&'a str),
}

impl PgOrderStore {
    async fn upsert_instrument_tx(
        tx: &mut Transaction<'_, Postgres>,
        owner: Owner<'_>,
        position: i32,
        pi: &PaymentInstrument,
    ) -> Result<()> {
        let (basket_id, order_no) = match owner {
            Owner::Basket(id) => (Some(id), None),
            Owner::Order(no) => (None, Some(no)),
        };
        sqlx::query(
            r#"
            INSERT INTO payment_instruments (
                id, basket_id, order_no, position, method, amount, currency, token, vault_token,
                vault_type, customer_id, charge_id, charge_status, captured_amount, refunded_amount,
                fraud_id, fraud_status, three_ds_token, charge_3ds_token, card, card_details,
                gateway_type, transaction_id, capture
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21,
                $22, $23, $24
            )
            ON CONFLICT (id) DO UPDATE SET
                basket_id = EXCLUDED.basket_id, order_no = EXCLUDED.order_no,
                position = EXCLUDED.position, method = EXCLUDED.method, amount = EXCLUDED.amount,
                currency = EXCLUDED.currency, token = EXCLUDED.token, vault_token = EXCLUDED.vault_token,
                vault_type = EXCLUDED.vault_type, customer_id = EXCLUDED.customer_id,
                charge_id = EXCLUDED.charge_id, charge_status = EXCLUDED.charge_status,
                captured_amount = GREATEST(payment_instruments.captured_amount, EXCLUDED.captured_amount),
                refunded_amount = GREATEST(payment_instruments.refunded_amount, EXCLUDED.refunded_amount),
                fraud_id = EXCLUDED.fraud_id, fraud_status = EXCLUDED.fraud_status,
                three_ds_token = EXCLUDED.three_ds_token, charge_3ds_token = EXCLUDED.charge_3ds_token,
                card = EXCLUDED.card, card_details = EXCLUDED.card_details,
                gateway_type = EXCLUDED.gateway_type, transaction_id = EXCLUDED.transaction_id,
                capture = EXCLUDED.capture
            "#,
        )
        .bind(pi.id)
        .bind(basket_id)
        .bind(order_no)
        .bind(position)
        .bind(pi.method.code())
        .bind(pi.amount)
        .bind(&pi.currency)
        .bind(&pi.token)
        .bind(&pi.vault_token)
        .bind(pi.vault_type.map(|v| v.as_str()))
        .bind(&pi.customer_id)
        .bind(&pi.charge_id)
        .bind(pi.charge_status.map(|s| s.as_str()))
        .bind(pi.captured_amount)
        .bind(pi.refunded_amount)
        .bind(&pi.fraud_id)
        .bind(pi.fraud_status.map(|s| s.as_str()))
        .bind(&pi.three_ds_token)
        .bind(&pi.charge_3ds_token)
        .bind(pi.card.clone().map(Json))
        .bind(&pi.card_details)
        .bind(&pi.gateway_type)
        .bind(&pi.transaction_id)
        .bind(pi.capture)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }

    async fn instruments_for(&self, column: &str, key: &str) -> Result<Vec<PaymentInstrument>> {
        let sql = format!(
            "SELECT {INSTRUMENT_COLUMNS} FROM payment_instruments WHERE {column} = $1 ORDER BY position ASC"
        );
        let rows = sqlx::query(&sql).bind(key).fetch_all(&self.pool).await?;
        rows.iter().map(instrument_from_row).collect()
    }

    async fn hydrate_order(&self, row: PgRow) -> Result<Order> {
        let order_no: String = row.get("order_no");
        let instruments = self.instruments_for("order_no", &order_no).await?;
        let notes = sqlx::query(
            "SELECT id, subject, body, created_at FROM order_notes WHERE order_no = $1 ORDER BY seq ASC",
        )
        .bind(&order_no)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| OrderNote {
            id: r.get("id"),
            subject: r.get("subject"),
            text: r.get("body"),
            created_at: r.get("created_at"),
        })
        .collect();

        let customer: Json<CustomerRef> = row.try_get("customer")?;
        let cart: Json<Cart> = row.try_get("cart")?;
        let status: String = row.get("status");
        let payment_status: String = row.get("payment_status");

        Ok(Order {
            order_no,
            token: row.get("token"),
            customer: customer.0,
            cart: cart.0,
            status: OrderStatus::parse(&status),
            confirmed: row.get("confirmed"),
            payment_status: OrderPaymentStatus::parse(&payment_status),
            created_at: row.get("created_at"),
            charge_id: row.get("charge_id"),
            fraud_id: row.get("fraud_id"),
            captured: row.get("captured"),
            refunded: row.get("refunded"),
            payment_method_name: row.get("payment_method_name"),
            cancel_code: row.get("cancel_code"),
            cancel_description: row.get("cancel_description"),
            instruments,
            notes,
        })
    }

    async fn find_order_where(&self, column: &str, value: &str) -> Result<Option<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1 ORDER BY created_at DESC LIMIT 1"
        );
        match sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(self.hydrate_order(row).await?)),
            None => Ok(None),
        }
    }

    async fn insert_order_tx(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_no, token, customer, cart, status, confirmed, payment_status, created_at,
                charge_id, fraud_id, captured, refunded, payment_method_name, cancel_code, cancel_description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&order.order_no)
        .bind(&order.token)
        .bind(Json(&order.customer))
        .bind(Json(&order.cart))
        .bind(order.status.as_str())
        .bind(order.confirmed)
        .bind(order.payment_status.as_str())
        .bind(order.created_at)
        .bind(&order.charge_id)
        .bind(&order.fraud_id)
        .bind(order.captured)
        .bind(order.refunded)
        .bind(&order.payment_method_name)
        .bind(&order.cancel_code)
        .bind(&order.cancel_description)
        .execute(tx.as_mut())
        .await?;

        Ok(())
    }
}

fn instrument_from_row(row: &PgRow) -> Result<PaymentInstrument> {
    let method: String = row.get("method");
    let vault_type: Option<String> = row.get("vault_type");
    let charge_status: Option<String> = row.get("charge_status");
    let fraud_status: Option<String> = row.get("fraud_status");
    let card: Option<Json<CardSummary>> = row.try_get("card")?;

    Ok(PaymentInstrument {
        id: row.get("id"),
        method: method.parse::<PaymentMethod>().map_err(|e| anyhow!(e))?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        token: row.get("token"),
        vault_token: row.get("vault_token"),
        vault_type: vault_type.as_deref().and_then(VaultType::parse),
        customer_id: row.get("customer_id"),
        charge_id: row.get("charge_id"),
        charge_status: charge_status.as_deref().map(ChargeStatus::parse),
        captured_amount: row.get("captured_amount"),
        refunded_amount: row.get("refunded_amount"),
        fraud_id: row.get("fraud_id"),
        fraud_status: fraud_status.as_deref().map(FraudStatus::parse),
        three_ds_token: row.get("three_ds_token"),
        charge_3ds_token: row.get("charge_3ds_token"),
        card: card.map(|c| c.0),
        card_details: row.get("card_details"),
        gateway_type: row.get("gateway_type"),
        transaction_id: row.get("transaction_id"),
        capture: row.get("capture"),
    })
}

fn wallet_card_from_row(row: &PgRow) -> Result<WalletCard> {
    let card: Json<CardSummary> = row.try_get("card")?;
    Ok(WalletCard {
        id: row.get("id"),
        customer_no: row.get("customer_no"),
        vault_token: row.get("vault_token"),
        customer_id: row.get("customer_id"),
        card_details: row.get("card_details"),
        card: card.0,
    })
}

#[async_trait::async_trait]
impl OrderStore for PgOrderStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn save_basket(&self, basket: &Basket) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO baskets (id, customer, cart) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET customer = EXCLUDED.customer, cart = EXCLUDED.cart
            "#,
        )
        .bind(&basket.id)
        .bind(Json(&basket.customer))
        .bind(Json(&basket.cart))
        .execute(tx.as_mut())
        .await?;

        sqlx::query("DELETE FROM payment_instruments WHERE basket_id = $1")
            .bind(&basket.id)
            .execute(tx.as_mut())
            .await?;
        for (pos, pi) in basket.instruments.iter().enumerate() {
            Self::upsert_instrument_tx(&mut tx, Owner::Basket(&basket.id), pos as i32, pi).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_basket(&self, basket_id: &str) -> Result<Option<Basket>> {
        let row = sqlx::query("SELECT id, customer, cart FROM baskets WHERE id = $1")
            .bind(basket_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let customer: Json<CustomerRef> = row.try_get("customer")?;
        let cart: Json<Cart> = row.try_get("cart")?;
        Ok(Some(Basket {
            id: row.get("id"),
            customer: customer.0,
            cart: cart.0,
            instruments: self.instruments_for("basket_id", basket_id).await?,
        }))
    }

    async fn replace_gateway_instrument(&self, basket_id: &str, instrument: PaymentInstrument) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM baskets WHERE id = $1 FOR UPDATE")
            .bind(basket_id)
            .fetch_optional(tx.as_mut())
            .await?;
        if exists.is_none() {
            return Err(anyhow!("basket {basket_id} not found"));
        }
        sqlx::query("DELETE FROM payment_instruments WHERE basket_id = $1")
            .bind(basket_id)
            .execute(tx.as_mut())
            .await?;
        Self::upsert_instrument_tx(&mut tx, Owner::Basket(basket_id), 0, &instrument).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn place_order(&self, basket_id: &str, order_no: &str) -> Result<Order> {
        let basket = self
            .load_basket(basket_id)
            .await?
            .ok_or_else(|| anyhow!("basket {basket_id} not found"))?;
        let order = order_from_basket(&basket, order_no, chrono::Utc::now());

        let mut tx = self.pool.begin().await?;
        Self::insert_order_tx(&mut tx, &order).await?;
        for (pos, pi) in order.instruments.iter().enumerate() {
            sqlx::query("DELETE FROM payment_instruments WHERE id = $1")
                .bind(pi.id)
                .execute(tx.as_mut())
                .await?;
            Self::upsert_instrument_tx(&mut tx, Owner::Order(order_no), pos as i32, pi).await?;
        }
        sqlx::query("DELETE FROM baskets WHERE id = $1")
            .bind(basket_id)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn load_order(&self, order_no: &str) -> Result<Option<Order>> {
        self.find_order_where("order_no", order_no).await
    }

    async fn find_order_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>> {
        self.find_order_where("charge_id", charge_id).await
    }

    async fn find_order_by_fraud_id(&self, fraud_id: &str) -> Result<Option<Order>> {
        self.find_order_where("fraud_id", fraud_id).await
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query("SELECT 1 FROM orders WHERE order_no = $1 FOR UPDATE")
            .bind(&order.order_no)
            .fetch_optional(tx.as_mut())
            .await?;
        if locked.is_none() {
            return Err(anyhow!("order {} not found", order.order_no));
        }

        sqlx::query(
            r#"
            UPDATE orders SET
                status = $2, confirmed = $3, payment_status = $4, charge_id = $5, fraud_id = $6,
                captured = captured OR $7, refunded = refunded OR $8, payment_method_name = $9,
                cancel_code = $10, cancel_description = $11
            WHERE order_no = $1
            "#,
        )
        .bind(&order.order_no)
        .bind(order.status.as_str())
        .bind(order.confirmed)
        .bind(order.payment_status.as_str())
        .bind(&order.charge_id)
        .bind(&order.fraud_id)
        .bind(order.captured)
        .bind(order.refunded)
        .bind(&order.payment_method_name)
        .bind(&order.cancel_code)
        .bind(&order.cancel_description)
        .execute(tx.as_mut())
        .await?;

        let kept: Vec<Uuid> = order.instruments.iter().map(|pi| pi.id).collect();
        sqlx::query("DELETE FROM payment_instruments WHERE order_no = $1 AND NOT (id = ANY($2))")
            .bind(&order.order_no)
            .bind(&kept)
            .execute(tx.as_mut())
            .await?;
        for (pos, pi) in order.instruments.iter().enumerate() {
            Self::upsert_instrument_tx(&mut tx, Owner::Order(&order.order_no), pos as i32, pi).await?;
        }

        for note in &order.notes {
            sqlx::query(
                r#"
                INSERT INTO order_notes (id, order_no, subject, body, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(note.id)
            .bind(&order.order_no)
            .bind(&note.subject)
            .bind(&note.text)
            .bind(note.created_at)
            .execute(tx.as_mut())
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sweep_candidates(&self, criteria: &SweepCriteria) -> Result<Vec<String>> {
        let rows = match criteria {
            SweepCriteria::Capture { created_since } => {
                sqlx::query(
                    r#"
                    SELECT order_no FROM orders
                    WHERE status NOT IN ('CANCELLED', 'FAILED')
                      AND payment_status <> 'PAID'
                      AND confirmed = TRUE
                      AND created_at >= $1
                      AND captured = FALSE
                      AND refunded = FALSE
                    ORDER BY created_at ASC, order_no ASC
                    "#,
                )
                .bind(created_since)
                .fetch_all(&self.pool)
                .await?
            }
            SweepCriteria::Refund { created_since } => {
                sqlx::query(
                    r#"
                    SELECT order_no FROM orders
                    WHERE status IN ('CANCELLED', 'FAILED')
                      AND created_at >= $1
                      AND refunded = FALSE
                    ORDER BY created_at ASC, order_no ASC
                    "#,
                )
                .bind(created_since)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(|r| r.get("order_no")).collect())
    }

    async fn wallet_cards(&self, customer_no: &str) -> Result<Vec<WalletCard>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_no, vault_token, customer_id, card_details, card
            FROM wallet_cards WHERE customer_no = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(customer_no)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(wallet_card_from_row).collect()
    }

    async fn save_wallet_card(&self, card: WalletCard) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if card.card_details.is_some() {
            sqlx::query("DELETE FROM wallet_cards WHERE customer_no = $1 AND card_details = $2")
                .bind(&card.customer_no)
                .bind(&card.card_details)
                .execute(tx.as_mut())
                .await?;
        }
        sqlx::query(
            r#"
            INSERT INTO wallet_cards (id, customer_no, vault_token, customer_id, card_details, card)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(card.id)
        .bind(&card.customer_no)
        .bind(&card.vault_token)
        .bind(&card.customer_id)
        .bind(&card.card_details)
        .bind(Json(&card.card))
        .execute(tx.as_mut())
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn attach_customer_to_wallet_card(
        &self,
        customer_no: &str,
        vault_token: &str,
        customer_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE wallet_cards SET customer_id = $3 WHERE customer_no = $1 AND vault_token = $2",
        )
        .bind(customer_no)
        .bind(vault_token)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
