use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An entity addressed by a stable identifier.
///
/// Records are values: callers replace a record wholesale instead of mutating
/// it in place. `Draft` is the payload accepted by create/update calls.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Draft: Serialize + Clone + Send + Sync + 'static;

    /// Singular noun used in logs and notices ("product", "order", ...).
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Builds a fresh record from a draft, as the remote store would on create.
    fn from_draft(id: String, draft: &Self::Draft) -> Self;

    /// Returns a copy of this record with the draft applied.
    fn with_draft(&self, draft: &Self::Draft) -> Self;

    /// Case-insensitive match used by stores that search locally.
    fn matches_search(&self, term: &str) -> bool;
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Lenient decoding for amounts in cents. Older clients wrote `dollars * 100`
/// as a float, so values like `1998.9999999999998` are rounded to the nearest cent.
mod cents {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Whole(u64),
        Fractional(f64),
    }

    fn round(value: f64) -> Option<u64> {
        let rounded = value.round();
        (rounded.is_finite() && (0.0..=u64::MAX as f64).contains(&rounded)).then_some(rounded as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Amount::deserialize(deserializer)? {
            Amount::Whole(cents) => Ok(cents),
            Amount::Fractional(value) => round(value)
                .ok_or_else(|| de::Error::custom(format!("amount out of range: {value}"))),
        }
    }

    pub fn deserialize_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        match Option::<Amount>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Amount::Whole(cents)) => Ok(Some(cents)),
            Some(Amount::Fractional(value)) => round(value)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("amount out of range: {value}"))),
        }
    }
}

/// Formats an amount of cents as dollars, e.g. `1250` -> `$12.50`.
pub fn format_cents(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price in cents.
    #[serde(deserialize_with = "cents::deserialize")]
    pub price: u64,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stock_quantity: u32,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Create/update payload for products. The id and timestamps are owned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: u64,
    pub image_url: String,
    pub category: String,
    pub stock_quantity: u32,
    #[serde(default)]
    pub dimensions: Dimensions,
}

impl Record for Product {
    type Draft = ProductDraft;
    const KIND: &'static str = "product";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &ProductDraft) -> Self {
        Product {
            id,
            ..Product::default().with_draft(draft)
        }
    }

    fn with_draft(&self, draft: &ProductDraft) -> Self {
        Product {
            id: self.id.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            price: draft.price,
            image_url: draft.image_url.clone(),
            category: draft.category.clone(),
            stock_quantity: draft.stock_quantity,
            dimensions: draft.dimensions.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }

    fn matches_search(&self, term: &str) -> bool {
        contains_ci(&self.name, term) || contains_ci(&self.category, term)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub creation_time: String,
    #[serde(default)]
    pub last_sign_in_time: String,
    #[serde(default)]
    pub disabled: bool,
}

impl Customer {
    pub fn display_label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("No Name Provided")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl Record for Customer {
    type Draft = CustomerDraft;
    const KIND: &'static str = "customer";

    fn id(&self) -> &str {
        &self.uid
    }

    fn from_draft(id: String, draft: &CustomerDraft) -> Self {
        Customer {
            uid: id,
            ..Customer::default().with_draft(draft)
        }
    }

    fn with_draft(&self, draft: &CustomerDraft) -> Self {
        Customer {
            email: draft.email.clone(),
            display_name: draft.display_name.clone(),
            disabled: draft.disabled,
            ..self.clone()
        }
    }

    fn matches_search(&self, term: &str) -> bool {
        contains_ci(&self.email, term)
            || self
                .display_name
                .as_deref()
                .is_some_and(|name| contains_ci(name, term))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    #[serde(deserialize_with = "cents::deserialize")]
    pub price: u64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
}

/// Creation time as sent by the document store: either its native
/// `{ _seconds, _nanoseconds }` shape or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Native {
        #[serde(rename = "_seconds")]
        seconds: i64,
        #[serde(rename = "_nanoseconds", default)]
        nanoseconds: u32,
    },
    Text(String),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Native {
            seconds: 0,
            nanoseconds: 0,
        }
    }
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Native {
                seconds,
                nanoseconds,
            } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            Timestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub customer_details: CustomerDetails,
    #[serde(default, deserialize_with = "cents::deserialize")]
    pub subtotal: u64,
    #[serde(
        default,
        deserialize_with = "cents::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub shipping_cost: Option<u64>,
    #[serde(deserialize_with = "cents::deserialize")]
    pub total_amount: u64,
    pub order_status: OrderStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Order {
    /// Sum of `price * quantity` over the line items.
    pub fn items_subtotal(&self) -> u64 {
        self.items
            .iter()
            .map(|item| item.price.saturating_mul(u64::from(item.quantity)))
            .fold(0u64, u64::saturating_add)
    }

    /// Abbreviated id as shown in list rows and notices.
    pub fn short_id(&self) -> &str {
        short_id(&self.id, 4)
    }
}

/// First `len` characters of an identifier.
pub fn short_id(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Partial update accepted by the order endpoints. Only set fields change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            order_status: Some(status),
            payment_status: None,
        }
    }
}

impl Record for Order {
    type Draft = OrderUpdate;
    const KIND: &'static str = "order";

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(id: String, draft: &OrderUpdate) -> Self {
        Order {
            id,
            ..Order::default().with_draft(draft)
        }
    }

    fn with_draft(&self, draft: &OrderUpdate) -> Self {
        let mut next = self.clone();
        if let Some(status) = draft.order_status {
            next.order_status = status;
        }
        if let Some(payment) = draft.payment_status {
            next.payment_status = payment;
        }
        next
    }

    fn matches_search(&self, term: &str) -> bool {
        contains_ci(&self.customer_details.name, term)
            || contains_ci(&self.customer_details.email, term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_decodes_native_timestamp_and_status() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "order-7",
            "userId": "u1",
            "items": [{"productId": "p1", "name": "Indomie", "price": 250, "quantity": 3}],
            "customerDetails": {"name": "Ana", "email": "ana@example.com", "phone": "555"},
            "subtotal": 750,
            "totalAmount": 950,
            "orderStatus": "Processing",
            "paymentStatus": "Paid",
            "createdAt": {"_seconds": 1_700_000_000, "_nanoseconds": 0}
        }))
        .expect("order json");
        assert_eq!(order.order_status, OrderStatus::Processing);
        assert_eq!(order.items_subtotal(), 750);
        assert_eq!(
            order.created_at.to_datetime().map(|dt| dt.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn float_amounts_round_to_the_nearest_cent() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Teh",
            "price": 1998.9999999999998
        }))
        .expect("product json");
        assert_eq!(product.price, 1999);

        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "order-8",
            "userId": "u1",
            "items": [{"productId": "p1", "name": "Teh", "price": 1998.9999999999998, "quantity": 2}],
            "customerDetails": {"name": "Ana", "email": "ana@example.com"},
            "subtotal": 3998.0000000000005,
            "shippingCost": 500.0,
            "totalAmount": 4498,
            "orderStatus": "Pending"
        }))
        .expect("order json");
        assert_eq!(order.items[0].price, 1999);
        assert_eq!(order.subtotal, 3998);
        assert_eq!(order.shipping_cost, Some(500));
        assert_eq!(order.total_amount, 4498);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let result = serde_json::from_value::<Product>(serde_json::json!({
            "id": "p1",
            "name": "Teh",
            "price": -5.5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn subtotal_saturates_instead_of_overflowing() {
        let order = Order {
            items: vec![
                OrderItem {
                    price: u64::MAX / 2,
                    quantity: 3,
                    ..OrderItem::default()
                },
                OrderItem {
                    price: 10,
                    quantity: 1,
                    ..OrderItem::default()
                },
            ],
            ..Order::default()
        };
        assert_eq!(order.items_subtotal(), u64::MAX);
    }

    #[test]
    fn text_timestamps_parse_as_rfc3339() {
        let ts = Timestamp::Text("2024-05-01T10:00:00Z".into());
        assert_eq!(
            ts.to_datetime().map(|dt| dt.timestamp()),
            Some(1_714_557_600)
        );
        assert!(Timestamp::Text("yesterday".into()).to_datetime().is_none());
    }

    #[test]
    fn customer_uses_photo_url_wire_name() {
        let customer: Customer = serde_json::from_value(serde_json::json!({
            "uid": "c1",
            "email": "c@example.com",
            "photoURL": "https://img/c1.png",
            "creationTime": "2024-01-01",
            "lastSignInTime": "2024-02-01",
            "disabled": false
        }))
        .expect("customer json");
        assert_eq!(customer.photo_url.as_deref(), Some("https://img/c1.png"));
        assert_eq!(customer.display_label(), "No Name Provided");
    }

    #[test]
    fn order_update_only_touches_set_fields() {
        let order = Order {
            id: "o1".into(),
            payment_status: PaymentStatus::Paid,
            ..Order::default()
        };
        let next = order.with_draft(&OrderUpdate::status(OrderStatus::Shipped));
        assert_eq!(next.order_status, OrderStatus::Shipped);
        assert_eq!(next.payment_status, PaymentStatus::Paid);
        assert_eq!(order.order_status, OrderStatus::Pending);
    }

    #[test]
    fn short_ids_and_money_format() {
        assert_eq!(short_id("order-7", 4), "orde");
        assert_eq!(short_id("ab", 4), "ab");
        assert_eq!(format_cents(1250), "$12.50");
        assert_eq!(format_cents(5), "$0.05");
    }
}
