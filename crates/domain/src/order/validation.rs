//! Structural validation of checkout payloads.

use common::{Address, DraftItem, Money, PaymentMethod, ProductId, Totals};
use serde::{Deserialize, Serialize};

use super::request::{AddressRequest, CartItemRequest, PlaceOrderRequest};

/// Largest quantity accepted on a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `shippingAddress.phone`.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A payload that passed validation, ready to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub items: Vec<DraftItem>,
    pub client_totals: Totals,
    pub payment_method: PaymentMethod,
    pub shipping_address: Address,
    pub billing_address: Address,
}

/// Collects every violation instead of stopping at the first.
#[derive(Default)]
struct Errors(Vec<FieldError>);

impl Errors {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn required_str(&mut self, field: &str, value: Option<&String>) -> Option<String> {
        match value.map(|v| v.trim()) {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            Some(_) => {
                self.push(field, "must not be empty");
                None
            }
            None => {
                self.push(field, "is required");
                None
            }
        }
    }

    fn amount(&mut self, field: &str, value: Option<f64>, strictly_positive: bool) -> Option<Money> {
        let Some(value) = value else {
            self.push(field, "is required");
            return None;
        };
        if !value.is_finite() {
            self.push(field, "must be a number");
            return None;
        }
        if strictly_positive && value <= 0.0 {
            self.push(field, "must be positive");
            return None;
        }
        if value < 0.0 {
            self.push(field, "must not be negative");
            return None;
        }
        Some(Money::from_cents((value * 100.0).round() as i64))
    }
}

/// Returns true for `+` followed by 10–15 digits, ignoring spaces and dashes.
pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

fn validate_item(errors: &mut Errors, index: usize, item: &CartItemRequest) -> Option<DraftItem> {
    let prefix = format!("items[{index}]");

    let product_id = errors.required_str(&format!("{prefix}.productId"), item.product_id.as_ref());
    let name = errors.required_str(&format!("{prefix}.name"), item.name.as_ref());

    let quantity = match item.quantity {
        None => {
            errors.push(format!("{prefix}.quantity"), "is required");
            None
        }
        Some(q) if !q.is_finite() || q.fract() != 0.0 => {
            errors.push(format!("{prefix}.quantity"), "must be an integer");
            None
        }
        Some(q) if q < 1.0 => {
            errors.push(format!("{prefix}.quantity"), "must be at least 1");
            None
        }
        Some(q) if q > f64::from(MAX_LINE_QUANTITY) => {
            errors.push(
                format!("{prefix}.quantity"),
                format!("must be at most {MAX_LINE_QUANTITY}"),
            );
            None
        }
        Some(q) => Some(q as u32),
    };

    let price = errors.amount(&format!("{prefix}.price"), item.price, true);

    Some(DraftItem {
        product_id: ProductId::new(product_id?),
        quantity: quantity?,
        client_price: price?,
        name: name?,
        image: item
            .image
            .as_ref()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty()),
    })
}

fn validate_address(errors: &mut Errors, prefix: &str, address: Option<&AddressRequest>) -> Option<Address> {
    let Some(address) = address else {
        errors.push(prefix, "is required");
        return None;
    };

    let name = errors.required_str(&format!("{prefix}.name"), address.name.as_ref());
    let phone = errors.required_str(&format!("{prefix}.phone"), address.phone.as_ref());
    let phone = match phone {
        Some(p) if !is_valid_phone(&p) => {
            errors.push(format!("{prefix}.phone"), "must be a valid phone number");
            None
        }
        other => other,
    };
    let street = errors.required_str(&format!("{prefix}.address"), address.address.as_ref());
    let city = errors.required_str(&format!("{prefix}.city"), address.city.as_ref());
    let state = errors.required_str(&format!("{prefix}.state"), address.state.as_ref());
    let zip = errors.required_str(&format!("{prefix}.zip"), address.zip.as_ref());

    Some(Address {
        name: name?,
        phone: phone?,
        address: street?,
        city: city?,
        state: state?,
        zip: zip?,
    })
}

/// Validates a checkout payload, reporting every field-level violation.
pub fn validate(req: &PlaceOrderRequest) -> Result<ValidatedOrder, Vec<FieldError>> {
    let mut errors = Errors::default();

    let items: Vec<Option<DraftItem>> = match &req.items {
        None => {
            errors.push("items", "is required");
            Vec::new()
        }
        Some(items) if items.is_empty() => {
            errors.push("items", "must contain at least one item");
            Vec::new()
        }
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| validate_item(&mut errors, i, item))
            .collect(),
    };

    let subtotal = errors.amount("subtotal", req.subtotal, false);
    let shipping = errors.amount("shipping", req.shipping, false);
    let tax = errors.amount("tax", req.tax, false);
    let total = errors.amount("total", req.total, false);

    let payment_method = match req.payment_method.as_deref() {
        None => {
            errors.push("paymentMethod", "is required");
            None
        }
        Some(m) => {
            let parsed = PaymentMethod::parse(m);
            if parsed.is_none() {
                errors.push("paymentMethod", "must be one of card, mpesa, cod");
            }
            parsed
        }
    };

    let shipping_address = validate_address(&mut errors, "shippingAddress", req.shipping_address.as_ref());
    let billing_address = validate_address(&mut errors, "billingAddress", req.billing_address.as_ref());

    if !errors.0.is_empty() {
        return Err(errors.0);
    }

    // Every `None` above pushed an error, so these cannot fail here.
    let invalid = || vec![FieldError::new("", "invalid payload")];
    Ok(ValidatedOrder {
        items: items.into_iter().collect::<Option<Vec<_>>>().ok_or_else(invalid)?,
        client_totals: Totals {
            subtotal: subtotal.ok_or_else(invalid)?,
            shipping: shipping.ok_or_else(invalid)?,
            tax: tax.ok_or_else(invalid)?,
            total: total.ok_or_else(invalid)?,
        },
        payment_method: payment_method.ok_or_else(invalid)?,
        shipping_address: shipping_address.ok_or_else(invalid)?,
        billing_address: billing_address.ok_or_else(invalid)?,
    })
}
